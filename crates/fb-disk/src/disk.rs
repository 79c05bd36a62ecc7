//! The command orchestrator (spec §4.10): opens a device or archive file, loads the
//! header and catalog, sequences a single mutation, and writes them back. Mutating
//! commands follow `read_header` → mutate → `write_header`; read-only commands
//! (`info`, `cat`, `cat-menu`, `export`, `check`) skip the final write.

extern crate std;

use core::cell::{Cell, RefCell};

use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use fb_common::part::mbr::{Chs, MbrPartition, MbrPartitionTable};
use fb_common::types::number::U32;
use fb_part::FbMbr;

use crate::alloc_region::find_space;
use crate::boot_blob::BootBlob;
use crate::bpb::SectorCursor;
use crate::catalog::{Catalog, FileRecord, RecordFlags};
use crate::error::FbError;
use crate::header::{FB_AR_MAGIC_LONG, FbHeader};
use crate::menu;
use crate::region::Region;
use crate::syslinux;
use crate::transfer::{read_data, write_data};
use crate::{Reader, ReadWriteError, UtcTime, Writer, archive};

/// Ladder depth `format` writes by default (spec §4.2's `DEF_BASE_SIZE`).
pub const DEF_BASE_SIZE: u32 = fb_part::DEF_BASE_SIZE;
/// Smallest primary area `format`/`create` will accept.
pub const MIN_PRI_SIZE: u32 = 63 * 256;
/// Largest primary area `format`/`create` will accept — the legacy 16-bit BPB size
/// fields the primary area's synthesized boot sector mirrors can't address more.
pub const MAX_PRI_SIZE: u32 = 65535;
/// Upper bound on catalog size in sectors, the reserved address-space window for the
/// file list (`(0x80000 - 0x10000) >> 9`).
pub const MAX_LIST_SECTORS: u32 = (0x80000 - 0x10000) >> 9;
/// Default catalog size in bytes when `--list-size`/`create -l` is omitted.
pub const DEF_LIST_SIZE: u32 = MAX_LIST_SECTORS * 510;
/// Smallest `--nalign` value `format` accepts (the default flash erase-block size).
pub const MIN_NAND_ALIGN: u32 = 255;
/// Partition size threshold above which `format` defaults to FAT32 over FAT16.
pub const DEF_FAT32_SIZE: u32 = 512 * 2048;

/// Options for [`Disk::format`]/[`Disk::format_raw`]. Sector-count fields are already
/// resolved from the `k/K/m/M/g/G`-suffixed CLI strings by the caller.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub force: bool,
    pub zip: bool,
    pub part_size: u32,
    pub fat32: Option<bool>,
    pub align: bool,
    pub nand_align: u32,
    pub unit_size: u8,
    pub base: u32,
    pub pri_size: u32,
    pub ext_size: u32,
    pub list_size: u32,
    pub max_sectors: u8,
    pub chs_mode: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            force: false,
            zip: false,
            part_size: 0,
            fat32: None,
            align: false,
            nand_align: MIN_NAND_ALIGN,
            unit_size: 0,
            base: DEF_BASE_SIZE,
            pri_size: 0,
            ext_size: 0,
            list_size: 0,
            max_sectors: 0,
            chs_mode: false,
        }
    }
}

/// Options for [`Disk::sync`], mirroring `sync_disk`'s BPB-copy modes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub copy_bpb: Option<BpbMode>,
    pub bpb_size: u32,
    pub zip: bool,
    pub max_sectors: u8,
    pub chs_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpbMode {
    /// `--clear-bpb`: zero the jump-and-BPB region.
    Clear,
    /// `--reset-bpb`: zero it, then stamp a minimal generic BPB.
    Reset,
    /// `--copy-bpb`: copy the data partition's live BPB in, offsetting size fields by
    /// the partition's start LBA.
    Copy,
}

/// A line in [`DiskInfo::lines`] (`print_info`'s file listing: one row per gap or
/// file).
#[derive(Debug, Clone)]
pub enum InfoLine {
    Gap { extended: bool, start: u32, len: u32 },
    File(FileRecord),
}

/// Everything `info` reports; `fb-cli` formats it for stdout.
#[derive(Debug, Clone)]
pub struct DiskInfo {
    pub ver_major: u8,
    pub ver_minor: u8,
    pub archive_mode: bool,
    pub boot_base: Option<u32>,
    pub pri_size: u32,
    pub ext_size: u32,
    pub max_sectors: Option<u8>,
    pub chs_mode: bool,
    pub zip: bool,
    pub list_size: u16,
    pub list_used: u16,
    pub lines: Vec<InfoLine>,
    pub primary_free_bytes: u32,
    pub extended_free_bytes: u64,
}

/// The open fb container: a device/image handle plus the in-memory header and catalog
/// loaded by [`Disk::read_header`].
pub struct Disk<W: Writer> {
    io: W,
    archive_mode: bool,
    /// Highest ladder index (`boot_base`); meaningless in archive mode.
    boot_base: u32,
    /// Sector the header itself lives in (`boot_base + 1`, or `0` for an archive).
    header_lba: u32,
    /// LBA the data partition starts at; `0` in archive mode.
    part_offset: u32,
    header: FbHeader,
    catalog: Catalog,
}

/// Stamps sectors `[from, to)` with an empty, watermarked primary-area payload. Used to
/// blank the unused tail of the catalog's reserved sectors on `format`/`create`.
fn stamp_blank_primary<W: Writer>(io: &mut W, from: u32, to: u32) -> Result<(), FbError> {
    for lba in from..to {
        let mut buf = [0u8; 512];
        buf[510..512].copy_from_slice(&(lba as u16).to_le_bytes());
        io.write_sector(lba, &buf)?;
    }
    Ok(())
}

/// Sets `max_sec`/CHS-mode and, for `--zip`, the OEM-name/BPB-signature bytes
/// `config_mbr` stamps into the boot-code area ahead of the partition table.
fn config_mbr(mbr: &mut FbMbr, max_sectors: u8, chs_mode: bool, zip: bool) {
    let current = mbr.max_sec;
    let base = if max_sectors == 0 { current & 0x7f } else { max_sectors };
    mbr.max_sec = base | if chs_mode { 0x80 } else { 0 };
    if zip {
        // `boot_code` starts at absolute sector offset 0x002, so absolute offset `n`
        // is index `n - 2`.
        mbr.boot_code[0x26 - 2] = 0x29;
        mbr.boot_code[0x03 - 2..0x03 - 2 + 8].copy_from_slice(b"MSWIN4.1");
    }
}

fn set_partition0(mbr: &mut FbMbr, start: u32, size: u32, fat32: bool) {
    mbr.partitions_mut().partitions[0] = MbrPartition {
        boot_indicator: 0x80,
        part_type: if fat32 { 0x0c } else { 0x0e },
        start_head: Chs::new(start),
        end_head: Chs::new(start + size - 1),
        start_sector: U32::new(start),
        block_count: U32::new(size),
    };
}

/// Writes every ladder copy `0..=base` from `mbr` through `io`, collapsing the
/// closure-vs-owned-value borrow conflict [`fb_part::sync_mbr`]'s signature would
/// otherwise force on a caller that also needs `io` afterward.
fn sync_mbr_to<W: Writer>(io: &mut W, mbr: &mut FbMbr, base: u32, decrement_reserved: bool) -> Result<(), FbError> {
    let io_cell = RefCell::new(io);
    let err_cell: Cell<Option<ReadWriteError>> = Cell::new(None);
    let result = fb_part::sync_mbr(mbr, base, decrement_reserved, |i, copy| {
        io_cell.borrow_mut().write_sector(i, bytemuck::cast_ref(copy)).map_err(|e| {
            err_cell.set(Some(e));
            fb_part::LadderError::PartitionUnderflow(i as usize)
        })
    });
    if let Some(e) = err_cell.get() {
        return Err(FbError::Io(e));
    }
    result?;
    Ok(())
}

impl<W: Writer> Disk<W> {
    /// Opens `io` and loads its header and catalog (spec §4.10's `read_header`).
    /// Auto-detects archive vs. disk by magic; fails unless `allow_archive` when an
    /// archive is found.
    pub fn read_header(mut io: W, allow_archive: bool) -> Result<Self, FbError> {
        let sector0 = io.read_to_sector(0)?;

        if u32::from_le_bytes(sector0[0..4].try_into().unwrap()) == FB_AR_MAGIC_LONG {
            if !allow_archive {
                return Err(FbError::InvalidMbr("this command can't work with archives"));
            }
            let header = FbHeader::from_bytes(sector0[4..20].try_into().unwrap());
            let list_sectors = header.list_size();
            let catalog_bytes = read_data(&mut io, 1, list_sectors as u32 * 510, 1 + list_sectors as u32)?;
            return Ok(Self {
                io,
                archive_mode: true,
                boot_base: 0,
                header_lba: 0,
                part_offset: 0,
                header,
                catalog: Catalog::parse(&catalog_bytes),
            });
        }

        let template: FbMbr = *bytemuck::from_bytes(&sector0);
        if !template.is_fb_mbr(0) {
            return Err(FbError::InvalidMbr("fb mbr not initialized or corrupted"));
        }

        let boot_base = template.boot_base.get() as u32;
        let part_offset = fb_part::get_part_ofs(&template).unwrap_or(0);
        let header_lba = boot_base + 1;
        let header_sector = io.read_to_sector(header_lba)?;
        let header = FbHeader::from_bytes(header_sector[0..16].try_into().unwrap());
        let list_start = header.list_start(header_lba);
        let pri_size = header.pri_size();
        let catalog_bytes = read_data(&mut io, list_start, header.list_size() as u32 * 510, pri_size)?;

        Ok(Self {
            io,
            archive_mode: false,
            boot_base,
            header_lba,
            part_offset,
            header,
            catalog: Catalog::parse(&catalog_bytes),
        })
    }

    fn list_start(&self) -> u32 {
        self.header.list_start(self.header_lba)
    }

    fn pri_size(&self) -> u32 {
        if self.archive_mode { 1 + self.header.list_size() as u32 } else { self.header.pri_size() }
    }

    fn total_size(&self) -> u32 {
        if self.archive_mode { u32::MAX } else { self.header.total_size() }
    }

    /// Writes the catalog and header back to disk (spec §4.10's `write_header`).
    pub fn write_header(&mut self) -> Result<(), FbError> {
        self.header.set_list_used((self.catalog.tail_offset() / 510) as u16 + 1);
        let list_start = self.list_start();
        let pri_size = self.pri_size();
        let bytes = self.catalog.to_bytes()?;
        write_data(&mut self.io, list_start, &bytes, pri_size)?;

        if self.archive_mode {
            let mut sector0 = [0u8; 512];
            sector0[0..4].copy_from_slice(&FB_AR_MAGIC_LONG.to_le_bytes());
            sector0[4..20].copy_from_slice(&self.header.to_bytes());
            self.io.write_sector(0, &sector0)?;
            let end = self
                .catalog
                .records
                .last()
                .map_or(1 + self.header.list_size() as u32, |r| r.data_start + r.sector_count(pri_size));
            self.io.set_len_sectors(end)?;
        } else {
            let mut header_sector = self.io.read_to_sector(self.header_lba)?;
            header_sector[0..16].copy_from_slice(&self.header.to_bytes());
            self.io.write_sector(self.header_lba, &header_sector)?;
        }
        Ok(())
    }

    /// Lays a single partition and a FAT filesystem directly on `io`, with no fb header
    /// or catalog at all (`format --raw`). Destroys any existing partition layout, so
    /// it refuses without `force`.
    pub fn format_raw(mut io: W, opts: &FormatOptions) -> Result<(), FbError> {
        if !opts.force {
            return Err(FbError::InvalidArgument(String::from(
                "--raw would destroy the existing partition layout, use --force",
            )));
        }
        io.lock().map_err(|_| FbError::LockFailure)?;

        let max_size = io.size_in_sectors();
        if opts.base >= max_size {
            return Err(FbError::DiskTooSmall { needed: opts.base, have: max_size });
        }
        let available = max_size - opts.base;
        let part_size = if opts.part_size == 0 || opts.part_size > available { available } else { opts.part_size };
        let fat32 = opts.fat32.unwrap_or(part_size >= DEF_FAT32_SIZE);

        if opts.base > 0 {
            let mut sector0 = [0u8; 512];
            let mut table = MbrPartitionTable::default();
            table.partitions[0] = MbrPartition {
                boot_indicator: 0x80,
                part_type: if fat32 { 0x0c } else { 0x0e },
                start_head: Chs::new(opts.base),
                end_head: Chs::new(opts.base + part_size - 1),
                start_sector: U32::new(opts.base),
                block_count: U32::new(part_size),
            };
            sector0[0x1be..0x1fe].copy_from_slice(bytemuck::bytes_of(&table));
            sector0[0x1fe..0x200].copy_from_slice(&0xaa55u16.to_le_bytes());
            io.write_sector(0, &sector0)?;
            let zero = [0u8; 512];
            for lba in 1..opts.base {
                io.write_sector(lba, &zero)?;
            }
        }

        let part_offset = opts.base;
        let mut cursor = SectorCursor::new(&mut io, part_offset, part_size);
        if fat32 {
            fb_bpb::synth::format_fat32(
                &mut cursor,
                &fb_bpb::synth::Fat32Params {
                    total_sectors: part_size,
                    unit_size: opts.unit_size,
                    align: opts.align,
                    part_offset,
                },
            )?;
        } else {
            fb_bpb::synth::format_fat16(
                &mut cursor,
                &fb_bpb::synth::Fat16Params {
                    total_sectors: part_size,
                    unit_size: opts.unit_size,
                    align: opts.align,
                    part_offset,
                },
            )?;
        }
        Ok(())
    }

    /// Lays the full fb private area: MBR ladder, data header, empty catalog, and a
    /// fresh FAT filesystem on the data partition (`format_disk`). Reuses the existing
    /// partition table in place unless `force` or none is present.
    pub fn format(mut io: W, opts: &FormatOptions, boot_blob: BootBlob) -> Result<Self, FbError> {
        let mut pri_size = if opts.pri_size == 0 { MIN_PRI_SIZE } else { opts.pri_size };
        let mut ext_size = opts.ext_size;
        let list_size = if opts.list_size == 0 { DEF_LIST_SIZE } else { opts.list_size };
        let list_sectors = list_size.div_ceil(510);
        if list_sectors > MAX_LIST_SECTORS {
            return Err(FbError::InvalidArgument(String::from("list too large")));
        }

        io.lock().map_err(|_| FbError::LockFailure)?;
        let max_size = io.size_in_sectors();

        let mut force = opts.force;
        let mut existing_table: Option<FbMbr> = None;
        if !force {
            let sector0 = io.read_to_sector(0)?;
            let existing: FbMbr = *bytemuck::from_bytes(&sector0);
            match fb_part::get_part_ofs(&existing) {
                None => force = true,
                Some(min) => {
                    if min < pri_size + ext_size {
                        return Err(FbError::InvalidArgument(String::from(
                            "offset of data partition too small, use --force to recreate disk layout",
                        )));
                    }
                    if ext_size == 0 {
                        ext_size = min - pri_size;
                    }
                    existing_table = Some(existing);
                }
            }
        }

        // `nand_align` is a power-of-two-minus-one mask (e.g. 255 for 256-sector erase
        // blocks); rounding is a bitmask op, not a division, to match `fbinst.c` exactly.
        let nand_align = opts.nand_align;
        let total_size = (pri_size + ext_size + nand_align) & !nand_align;
        if total_size >= max_size {
            return Err(FbError::DiskTooSmall { needed: total_size, have: max_size });
        }
        pri_size = pri_size.min(MAX_PRI_SIZE);

        let available = max_size - total_size;
        let part_size = if opts.part_size == 0 || opts.part_size > available { available } else { opts.part_size };
        let fat32 = opts.fat32.unwrap_or(part_size >= DEF_FAT32_SIZE);

        let mut mbr: FbMbr = *bytemuck::from_bytes(&boot_blob.mbr);
        if let Some(existing) = existing_table {
            *mbr.partitions_mut() = *existing.partitions();
        } else {
            set_partition0(&mut mbr, total_size, part_size, fat32);
        }
        mbr.boot_base.set(opts.base as u16);
        config_mbr(&mut mbr, opts.max_sectors, opts.chs_mode, opts.zip);

        sync_mbr_to(&mut io, &mut mbr, opts.base, false)?;

        let mut tail = Vec::with_capacity(16 + boot_blob.tail.len());
        tail.resize(16, 0);
        tail.extend_from_slice(boot_blob.tail);
        let boot_size = Region::Primary.sector_count(tail.len() as u32) as u16;

        let header = FbHeader::new(pri_size, ext_size, list_sectors as u16, boot_size);
        tail[0..16].copy_from_slice(&header.to_bytes());
        write_data(&mut io, opts.base + 1, &tail, pri_size)?;

        let list_start = header.list_start(opts.base + 1);
        let catalog = Catalog::empty(list_sectors as usize * 510);
        write_data(&mut io, list_start, &catalog.to_bytes()?, pri_size)?;
        stamp_blank_primary(&mut io, list_start + list_sectors, pri_size)?;

        if force {
            let mut cursor = SectorCursor::new(&mut io, total_size, part_size);
            if fat32 {
                fb_bpb::synth::format_fat32(
                    &mut cursor,
                    &fb_bpb::synth::Fat32Params {
                        total_sectors: part_size,
                        unit_size: opts.unit_size,
                        align: opts.align,
                        part_offset: total_size,
                    },
                )?;
            } else {
                fb_bpb::synth::format_fat16(
                    &mut cursor,
                    &fb_bpb::synth::Fat16Params {
                        total_sectors: part_size,
                        unit_size: opts.unit_size,
                        align: opts.align,
                        part_offset: total_size,
                    },
                )?;
            }
        }

        Ok(Self {
            io,
            archive_mode: false,
            boot_base: opts.base,
            header_lba: opts.base + 1,
            part_offset: total_size,
            header,
            catalog,
        })
    }

    /// `format --archive FILE` (spec §4.9): parses the archive's size hints, formats the
    /// disk as [`format`](Self::format) would (taking the archive's `pri_size`/`ext_size`/
    /// `list_size` for any of `opts`'s corresponding fields left at `0`), then loads the
    /// archive's catalog and payloads onto the freshly formatted disk.
    pub fn format_from_archive<R: Reader>(
        io: W,
        opts: &FormatOptions,
        boot_blob: BootBlob,
        archive_src: &mut R,
    ) -> Result<Self, FbError> {
        let (ar_header, _ar_catalog) = archive::read_archive(archive_src)?;

        let mut opts = opts.clone();
        if opts.pri_size == 0 {
            opts.pri_size = ar_header.pri_size();
        }
        if opts.ext_size == 0 {
            opts.ext_size = ar_header.ext_size();
        }
        if opts.list_size == 0 {
            opts.list_size = ar_header.list_size() as u32 * 510;
        }

        let mut disk = Self::format(io, &opts, boot_blob)?;
        disk.load(archive_src)?;
        Ok(disk)
    }

    /// Scans for a surviving ladder copy and rebuilds sector 0 from it (spec §4.2
    /// "Restore"). Takes `io` directly rather than an already-opened [`Disk`], since a
    /// disk whose sector 0 is gone can't pass [`read_header`](Self::read_header).
    pub fn restore(io: W) -> Result<W, FbError> {
        let io_cell = RefCell::new(io);
        let err_cell: Cell<Option<ReadWriteError>> = Cell::new(None);
        let result = fb_part::restore(
            |i| {
                io_cell.borrow_mut().read_to_sector(i).map_err(|e| {
                    err_cell.set(Some(e));
                    fb_part::RestoreError::NotFound
                })
            },
            |i, mbr| {
                io_cell.borrow_mut().write_sector(i, bytemuck::cast_ref(mbr)).map_err(|e| {
                    err_cell.set(Some(e));
                    fb_part::RestoreError::NotFound
                })
            },
        );
        if let Some(e) = err_cell.get() {
            return Err(FbError::Io(e));
        }
        result.map_err(|_| FbError::InvalidMbr("can't find fb mbr"))?;
        Ok(io_cell.into_inner())
    }

    /// Rewrites the jump stub and boot code of every ladder copy and the boot-blob tail
    /// following the header sector, without touching the partition table or header data
    /// fields (`update_header`).
    pub fn update(&mut self, boot_blob: BootBlob) -> Result<(), FbError> {
        let boot_size = Region::Primary.sector_count((16 + boot_blob.tail.len()) as u32);
        if self.boot_base + 1 + boot_size > self.list_start() {
            return Err(FbError::InvalidArgument(String::from("not enough space, use format")));
        }

        for i in 0..=self.boot_base {
            let mut sector = self.io.read_to_sector(i)?;
            sector[0..0x1ad].copy_from_slice(&boot_blob.mbr[0..0x1ad]);
            self.io.write_sector(i, &sector)?;
        }

        let mut tail = vec![0u8; 16];
        tail.extend_from_slice(boot_blob.tail);
        let header_sector = self.io.read_to_sector(self.header_lba)?;
        tail[0..16].copy_from_slice(&header_sector[0..16]);
        write_data(&mut self.io, self.header_lba, &tail, self.pri_size())?;
        Ok(())
    }

    /// Rewrites the data partition's BPB copy embedded at the ladder's sector 0 and
    /// resyncs the ladder (`sync_disk`).
    pub fn sync(&mut self, opts: &SyncOptions) -> Result<(), FbError> {
        let sector0 = self.io.read_to_sector(0)?;
        let mut mbr: FbMbr = *bytemuck::from_bytes(&sector0);
        let part_start = fb_part::get_part_ofs(&mbr).unwrap_or(0);
        let live_bpb = self.io.read_to_sector(part_start)?;
        let jmp_ofs = mbr.jmp_ofs as usize;
        let mut zip = opts.zip;

        match opts.copy_bpb {
            Some(BpbMode::Copy) => {
                let mut buf: [u8; 512] = *bytemuck::cast_ref(&mbr);
                buf[2..2 + jmp_ofs].copy_from_slice(&live_bpb[2..2 + jmp_ofs]);
                let nrs = u16::from_le_bytes([buf[0x0e], buf[0x0f]]).wrapping_add(part_start as u16);
                buf[0x0e..0x10].copy_from_slice(&nrs.to_le_bytes());
                let mut ts = u16::from_le_bytes([live_bpb[0x13], live_bpb[0x14]]) as u32;
                if ts == 0 {
                    ts = u32::from_le_bytes(live_bpb[0x20..0x24].try_into().unwrap());
                }
                let ts = ts + part_start;
                buf[0x13..0x15].copy_from_slice(&0u16.to_le_bytes());
                buf[0x20..0x24].copy_from_slice(&0u32.to_le_bytes());
                if ts < 65536 {
                    buf[0x13..0x15].copy_from_slice(&(ts as u16).to_le_bytes());
                } else {
                    buf[0x20..0x24].copy_from_slice(&ts.to_le_bytes());
                }
                mbr = *bytemuck::from_bytes(&buf);
                zip = false;
            }
            Some(mode @ (BpbMode::Clear | BpbMode::Reset)) => {
                for b in &mut mbr.boot_code[0..jmp_ofs] {
                    *b = 0;
                }
                if mode == BpbMode::Reset {
                    mbr.boot_code[0x10 - 2] = 2;
                    mbr.boot_code[0x18 - 2] = 0x3f;
                    mbr.boot_code[0x1a - 2] = 0xff;
                    mbr.boot_code[0x24 - 2] = 0x80;
                }
            }
            None => {}
        }

        if opts.bpb_size != 0 && (opts.bpb_size as usize) < jmp_ofs + 2 {
            let from = (opts.bpb_size as usize).saturating_sub(2);
            let to = (jmp_ofs + 2).saturating_sub(2);
            for b in &mut mbr.boot_code[from..to] {
                *b = 0;
            }
        }

        config_mbr(&mut mbr, opts.max_sectors, opts.chs_mode, zip);
        let decrement_reserved = matches!(opts.copy_bpb, Some(BpbMode::Reset));
        sync_mbr_to(&mut self.io, &mut mbr, self.boot_base, decrement_reserved)
    }

    /// Builds the report `info` prints (`print_info`).
    pub fn info(&mut self) -> Result<DiskInfo, FbError> {
        let pri_size = self.pri_size();
        let mut lines = Vec::new();
        let mut cursor = self.list_start() + self.header.list_size() as u32;
        let mut primary_used = 0u32;
        let mut extended_used = 0u32;

        for record in &self.catalog.records {
            let n = record.sector_count(pri_size);
            if Region::of_lba(record.data_start, pri_size) == Region::Primary {
                primary_used += n;
            } else {
                extended_used += n;
            }

            if record.data_start != cursor {
                if cursor >= pri_size || record.data_start <= pri_size {
                    lines.push(InfoLine::Gap {
                        extended: cursor >= pri_size,
                        start: cursor,
                        len: record.data_start - cursor,
                    });
                } else {
                    lines.push(InfoLine::Gap { extended: false, start: cursor, len: pri_size - cursor });
                    lines.push(InfoLine::Gap {
                        extended: true,
                        start: pri_size,
                        len: record.data_start - pri_size,
                    });
                }
            }
            cursor = record.data_start + n;
            lines.push(InfoLine::File(record.clone()));
        }

        let total_size = self.total_size();
        if !self.archive_mode && cursor != total_size {
            lines.push(InfoLine::Gap { extended: true, start: cursor, len: total_size - cursor });
        }

        let (max_sectors, chs_mode, zip) = if self.archive_mode {
            (None, false, false)
        } else {
            let sector0 = self.io.read_to_sector(0)?;
            let mbr: FbMbr = *bytemuck::from_bytes(&sector0);
            let current = mbr.max_sec;
            (Some(current & 0x7f), current & 0x80 != 0, mbr.boot_code[0x26 - 2] == 0x29)
        };

        Ok(DiskInfo {
            ver_major: self.header.ver_major,
            ver_minor: self.header.ver_minor,
            archive_mode: self.archive_mode,
            boot_base: (!self.archive_mode).then_some(self.boot_base),
            pri_size: self.header.pri_size(),
            ext_size: self.header.ext_size(),
            max_sectors,
            chs_mode,
            zip,
            list_size: self.header.list_size(),
            list_used: self.header.list_used(),
            lines,
            primary_free_bytes: (pri_size - self.list_start() - self.header.list_size() as u32 - primary_used) * 510,
            extended_free_bytes: (self.header.ext_size().saturating_sub(extended_used)) as u64 * 512,
        })
    }

    /// Empties the catalog without touching the header's size fields (`clear_menu`).
    pub fn clear(&mut self) {
        self.catalog = Catalog::empty(self.catalog.capacity);
    }

    /// Adds (or replaces) a file. `is_syslinux` implies `is_ext`, matching the source
    /// (`add_file`).
    pub fn add(&mut self, name: &str, data: &[u8], is_ext: bool, is_syslinux: bool, time: UtcTime) -> Result<(), FbError> {
        let name = Catalog::canonicalize_name(name)?.to_string();
        let is_ext = is_ext || is_syslinux;
        self.catalog.delete(&name);

        let floor = self.list_start() + self.header.list_size() as u32;
        let start = find_space(&self.catalog, floor, self.total_size(), self.pri_size(), data.len() as u32, is_ext)?;

        let mut payload = data.to_vec();
        if is_syslinux {
            syslinux::patch(&mut payload, data.len() as u32, start, self.part_offset)?;
        }
        write_data(&mut self.io, start, &payload, self.pri_size())?;

        let mut flag = RecordFlags::empty();
        if is_ext {
            flag |= RecordFlags::EXTENDED;
        }
        if is_syslinux {
            flag |= RecordFlags::SYSLINUX;
        }
        self.catalog.insert_sorted(FileRecord {
            flag,
            data_start: start,
            data_size: data.len() as u32,
            data_time: timestamp(time),
            name,
        })
    }

    /// Compiles `source` (spec §4.8) and stores it as a file (`add_menu`).
    pub fn add_menu(&mut self, name: &str, source: &str, time: UtcTime) -> Result<(), FbError> {
        let compiled = menu::compile(source)?;
        self.add(name, &compiled, false, false, time)
    }

    fn alloc_and_write(
        &mut self,
        name: String,
        size: u32,
        old_start: u32,
        old_size: u32,
        is_ext_hint: bool,
        fill: u8,
        time: UtcTime,
    ) -> Result<(), FbError> {
        let floor = self.list_start() + self.header.list_size() as u32;
        let start = find_space(&self.catalog, floor, self.total_size(), self.pri_size(), size, is_ext_hint)?;

        let is_ext = Region::of_lba(start, self.pri_size()) == Region::Extended;

        let mut buf = vec![fill; size as usize];
        if old_size != 0 {
            let old = read_data(&mut self.io, old_start, old_size, self.pri_size())?;
            let n = old.len().min(buf.len());
            buf[..n].copy_from_slice(&old[..n]);
        }
        write_data(&mut self.io, start, &buf, self.pri_size())?;

        let mut flag = RecordFlags::empty();
        if is_ext {
            flag |= RecordFlags::EXTENDED;
        }
        self.catalog.insert_sorted(FileRecord { flag, data_start: start, data_size: size, data_time: timestamp(time), name })
    }

    /// Grows (or shrinks) a file's `data_size`, relocating and fill-padding it when it
    /// no longer fits in place (`resize_file`).
    pub fn resize(&mut self, name: &str, size: u32, is_ext: bool, fill: u8, time: UtcTime) -> Result<(), FbError> {
        if size == 0 {
            return Err(FbError::InvalidArgument(String::from("invalid size")));
        }
        let name = Catalog::canonicalize_name(name)?.to_string();

        if let Some(record) = self.catalog.find_mut(&name) {
            if record.data_size >= size {
                record.data_size = size;
                return Ok(());
            }
            let old_start = record.data_start;
            let old_size = record.data_size;
            self.catalog.delete(&name);
            self.alloc_and_write(name, size, old_start, old_size, is_ext, fill, time)
        } else {
            self.alloc_and_write(name, size, 0, 0, is_ext, fill, time)
        }
    }

    /// Duplicates `old`'s data under `new`, overwriting any existing `new` (`copy_file`).
    pub fn copy(&mut self, old: &str, new: &str, time: UtcTime) -> Result<(), FbError> {
        let new_name = Catalog::canonicalize_name(new)?.to_string();
        self.catalog.delete(&new_name);
        let record = self.catalog.find(old).ok_or_else(|| FbError::NotFound(old.to_string()))?.clone();
        let is_ext = Region::of_lba(record.data_start, self.pri_size()) == Region::Extended;
        self.alloc_and_write(new_name, record.data_size, record.data_start, record.data_size, is_ext, 0, time)
    }

    /// Renames `old` to `new` in place, without touching its data (`move_file`).
    pub fn move_file(&mut self, old: &str, new: &str) -> Result<(), FbError> {
        let new_name = Catalog::canonicalize_name(new)?.to_string();
        self.catalog.delete(&new_name);
        let mut record = self.catalog.delete(old).ok_or_else(|| FbError::NotFound(old.to_string()))?;
        record.name = new_name;
        self.catalog.insert_sorted(record)
    }

    /// Reads a file's data back out (`export_file`/`cat_file`).
    pub fn export(&mut self, name: &str) -> Result<Vec<u8>, FbError> {
        let record = self.catalog.find(name).ok_or_else(|| FbError::NotFound(name.to_string()))?;
        let (start, size) = (record.data_start, record.data_size);
        read_data(&mut self.io, start, size, self.pri_size())
    }

    /// Removes a file's catalog entry (`remove_file`). The vacated sectors need no
    /// zeroing: the watermark already marks them implicitly free.
    pub fn remove(&mut self, name: &str) -> Result<(), FbError> {
        self.catalog.delete(name).map(|_| ()).ok_or_else(|| FbError::NotFound(name.to_string()))
    }

    /// Reads a file and decodes it as a menu script (`cat_menu`).
    pub fn cat_menu(&mut self, name: &str) -> Result<Vec<String>, FbError> {
        let blob = self.export(name)?;
        menu::decode(&blob)
    }

    /// Defragments by walking records in `data_start` order and compacting each down to
    /// the first free slot, preserving the primary/extended split once a record has
    /// moved past it (`pack_disk`).
    pub fn pack(&mut self) -> Result<(), FbError> {
        let pri_size = self.pri_size();
        let mut cursor = self.list_start() + self.header.list_size() as u32;
        let mut records = core::mem::take(&mut self.catalog.records);
        for record in &mut records {
            let n = record.sector_count(pri_size);
            if cursor < pri_size && record.data_start >= pri_size {
                cursor = pri_size;
            }
            if record.data_start != cursor {
                let data = read_data(&mut self.io, record.data_start, record.data_size, pri_size)?;
                write_data(&mut self.io, cursor, &data, pri_size)?;
                record.data_start = cursor;
            }
            cursor = record.data_start + n;
        }
        self.catalog.records = records;
        Ok(())
    }

    /// Walks every primary sector and asserts the watermark law (plus the ladder-copy
    /// check for sectors within `boot_base`) (`check_disk`).
    pub fn check(&mut self) -> Result<(), FbError> {
        let pri_size = self.pri_size();
        for start in 0..pri_size {
            let sector = self.io.read_to_sector(start)?;
            let ok = if !self.archive_mode && start <= self.boot_base {
                let mbr: FbMbr = *bytemuck::from_bytes(&sector);
                mbr.is_fb_mbr(start as u16)
            } else {
                u16::from_le_bytes([sector[510], sector[511]]) == start as u16
            };
            if !ok {
                return Err(FbError::InvalidMbr("check failed at sector"));
            }
        }
        Ok(())
    }

    /// Writes the live catalog and payloads into a fresh archive (`save_archive`).
    pub fn save<D: Writer>(&mut self, dst: &mut D, list_size_bytes: u32) -> Result<(), FbError> {
        let list_size_bytes = if list_size_bytes == 0 { self.catalog.capacity as u32 } else { list_size_bytes };
        archive::save(dst, &mut self.io, &self.catalog, self.pri_size(), self.header.ext_size(), list_size_bytes)
    }

    /// Loads an archive's catalog and payloads onto this disk, re-allocating each
    /// record against free space here (`load_archive`).
    pub fn load<R: Reader>(&mut self, src: &mut R) -> Result<(), FbError> {
        let pri_size = self.pri_size();
        let total_size = self.total_size();
        let part_offset = self.part_offset;
        archive::load(&mut self.io, &mut self.catalog, pri_size, total_size, part_offset, src)
    }

    /// Creates a fresh, empty archive file (`create_archive`).
    pub fn create(mut io: W, pri_size: u32, ext_size: u32, list_size_bytes: u32) -> Result<Self, FbError> {
        let pri_size = if pri_size == 0 { MIN_PRI_SIZE } else { pri_size };
        if !(MIN_PRI_SIZE..=MAX_PRI_SIZE).contains(&pri_size) {
            return Err(FbError::InvalidArgument(String::from("primary data size out of range")));
        }
        let list_size_bytes = if list_size_bytes == 0 { DEF_LIST_SIZE } else { list_size_bytes };
        if list_size_bytes.div_ceil(510) > MAX_LIST_SECTORS {
            return Err(FbError::InvalidArgument(String::from("list too large")));
        }

        let (header, catalog) = archive::create(&mut io, pri_size, ext_size, list_size_bytes)?;
        Ok(Self { io, archive_mode: true, boot_base: 0, header_lba: 0, part_offset: 0, header, catalog })
    }

    /// Gives back the underlying handle, e.g. for `fb-cli` to close or re-stat it.
    pub fn into_inner(self) -> W {
        self.io
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

fn timestamp(time: UtcTime) -> u32 {
    time.timestamp().clamp(0, u32::MAX as i64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot_blob;

    fn blank_image(sectors: u32) -> Vec<u8> {
        vec![0u8; sectors as usize * 512]
    }

    fn now() -> UtcTime {
        chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn format_test_disk(image: &mut [u8]) -> Disk<&mut [u8]> {
        let opts = FormatOptions { pri_size: MIN_PRI_SIZE, base: 1, force: true, ..Default::default() };
        let io: &mut [u8] = image;
        Disk::format(io, &opts, boot_blob::RELEASE).unwrap()
    }

    #[test]
    fn format_then_add_then_export_round_trips() {
        let mut image = blank_image(40_000);
        let mut disk = format_test_disk(&mut image);
        disk.add("hello.txt", b"hello, world", false, false, now()).unwrap();
        let data = disk.export("hello.txt").unwrap();
        assert_eq!(data, b"hello, world");
        assert_eq!(disk.catalog().records.len(), 1);
        disk.check().unwrap();
    }

    #[test]
    fn remove_then_pack_compacts_gap() {
        let mut image = blank_image(40_000);
        let mut disk = format_test_disk(&mut image);
        disk.add("a.bin", &[1u8; 2000], false, false, now()).unwrap();
        disk.add("b.bin", &[2u8; 3000], false, false, now()).unwrap();
        disk.remove("a.bin").unwrap();
        disk.pack().unwrap();
        let start = disk.list_start() + disk.header.list_size() as u32;
        assert_eq!(disk.catalog().records[0].data_start, start);
    }

    #[test]
    fn clear_empties_catalog_without_touching_header() {
        let mut image = blank_image(40_000);
        let mut disk = format_test_disk(&mut image);
        disk.add("a.bin", b"data", false, false, now()).unwrap();
        disk.clear();
        assert!(disk.catalog().records.is_empty());
        assert_eq!(disk.header.pri_size(), MIN_PRI_SIZE);
    }

    #[test]
    fn resize_grows_and_relocates_when_needed() {
        let mut image = blank_image(40_000);
        let mut disk = format_test_disk(&mut image);
        disk.add("a.bin", &[7u8; 100], false, false, now()).unwrap();
        disk.resize("a.bin", 2000, false, 0, now()).unwrap();
        let data = disk.export("a.bin").unwrap();
        assert_eq!(data.len(), 2000);
        assert_eq!(&data[..100], &[7u8; 100][..]);
    }

    #[test]
    fn move_file_renames_without_touching_data() {
        let mut image = blank_image(40_000);
        let mut disk = format_test_disk(&mut image);
        disk.add("old.bin", b"payload", false, false, now()).unwrap();
        disk.move_file("old.bin", "new.bin").unwrap();
        assert!(disk.export("old.bin").is_err());
        assert_eq!(disk.export("new.bin").unwrap(), b"payload");
    }

    #[test]
    fn add_past_full_disk_errors_instead_of_overwriting_header() {
        let mut image = blank_image(40_000);
        let mut disk = format_test_disk(&mut image);

        let floor = disk.list_start() + disk.header.list_size() as u32;
        let available_sectors = disk.total_size() - floor;
        disk.add("a.bin", &vec![1u8; available_sectors as usize * 510], false, false, now()).unwrap();

        let err = disk.add("b.bin", b"x", false, false, now()).unwrap_err();
        assert!(matches!(err, FbError::NoSpace { .. }));
        // The reserved area (ladder + header + catalog) must be untouched.
        disk.check().unwrap();
        assert_eq!(disk.catalog().records.len(), 1);
    }

    #[test]
    fn save_then_load_round_trips_catalog_and_payload() {
        let mut image = blank_image(40_000);
        let mut disk = format_test_disk(&mut image);
        disk.add("a.bin", &[9u8; 500], false, false, now()).unwrap();

        let mut archive = blank_image(4096);
        {
            let mut dst: &mut [u8] = &mut archive;
            disk.save(&mut dst, 0).unwrap();
        }

        let mut target_image = blank_image(40_000);
        let mut target = format_test_disk(&mut target_image);
        {
            let mut src: &[u8] = &archive;
            target.load(&mut src).unwrap();
        }
        assert_eq!(target.export("a.bin").unwrap(), [9u8; 500]);
        target.check().unwrap();
    }

    #[test]
    fn format_from_archive_seeds_fresh_disk() {
        let mut image = blank_image(40_000);
        let mut disk = format_test_disk(&mut image);
        disk.add("a.bin", &[3u8; 2000], false, false, now()).unwrap();
        disk.add("b.bin", &[4u8; 3000], false, false, now()).unwrap();

        let mut archive = blank_image(4096);
        {
            let mut dst: &mut [u8] = &mut archive;
            disk.save(&mut dst, 0).unwrap();
        }

        let mut fresh_image = blank_image(40_000);
        let opts = FormatOptions { base: 1, force: true, ..Default::default() };
        let mut archive_src: &[u8] = &archive;
        let io: &mut [u8] = &mut fresh_image;
        let mut fresh = Disk::format_from_archive(io, &opts, boot_blob::RELEASE, &mut archive_src).unwrap();

        assert_eq!(fresh.export("a.bin").unwrap(), [3u8; 2000]);
        assert_eq!(fresh.export("b.bin").unwrap(), [4u8; 3000]);
        fresh.check().unwrap();
    }
}
