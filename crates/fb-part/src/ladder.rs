use fb_common::part::mbr::{Chs, MbrPartitionTable};
use fb_common::types::endian::LittleEndian;
use fb_common::types::endian::Endian;
use fb_common::types::number::{U16, U32};

/// `end_magic` value that every fb MBR sector, and every DOS MBR, carries at `0x1fe`.
pub const BOOT_SIGNATURE: u16 = 0xaa55;

/// `fb_magic` value stamped at `0x1b4` of every fb MBR sector.
///
/// The upstream header that defines this constant wasn't part of the retrieved source, so
/// this value is this crate's own choice; it only needs to be self-consistent between the
/// writer and the fb-ness test below.
pub const FB_MAGIC_LONG: u32 = 0x1EE7_FB01;

/// Errors that can occur while regenerating or inspecting the MBR ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LadderError {
    #[error("ladder base {0} exceeds the maximum of 63 sectors")]
    BaseTooLarge(u32),
    #[error("partition {0} would underflow while shifting down the ladder")]
    PartitionUnderflow(usize),
}

/// The 512-byte fb MBR sector.
///
/// Layout mirrors a normal DOS MBR (boot code, partition table at `0x1be`, `0xaa55` at
/// `0x1fe`) but repurposes a few bytes that DOS leaves alone:
/// - `0x1ad`: `max_sec`, the highest ladder index ever written (`boot_base`)
/// - `0x1ae`: `lba`, this copy's own ladder index
/// - `0x1b0`/`0x1b1`: `spt`/`heads`, the fixed CHS geometry (63/255)
/// - `0x1b2`: `boot_base`, the ladder depth minus one
/// - `0x1b4`: `fb_magic`
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct FbMbr {
    pub jmp_code: u8,
    pub jmp_ofs: u8,
    pub boot_code: [u8; 0x1ab],
    pub max_sec: u8,
    pub lba: U16<LittleEndian>,
    pub spt: u8,
    pub heads: u8,
    pub boot_base: U16<LittleEndian>,
    pub fb_magic: U32<LittleEndian>,
    /// `0x1b8..0x1fe`: 6 bytes of disk-signature/reserved space DOS leaves before the
    /// partition table, followed by the 4 16-byte partition entries at `0x1be`.
    mbr_table: [u8; 0x46],
    pub end_magic: U16<LittleEndian>,
}

const PARTITION_TABLE_OFFSET: usize = 0x1be - 0x1b8;

unsafe impl bytemuck::Zeroable for FbMbr {}
unsafe impl bytemuck::Pod for FbMbr {}

impl FbMbr {
    pub fn partitions(&self) -> &MbrPartitionTable {
        bytemuck::from_bytes(&self.mbr_table[PARTITION_TABLE_OFFSET..])
    }

    pub fn partitions_mut(&mut self) -> &mut MbrPartitionTable {
        bytemuck::from_bytes_mut(&mut self.mbr_table[PARTITION_TABLE_OFFSET..])
    }

    /// Returns `true` if this sector looks like a valid fb MBR sector for ladder index `lba`.
    pub fn is_fb_mbr(&self, expected_lba: u16) -> bool {
        self.end_magic.get() == BOOT_SIGNATURE
            && self.fb_magic.get() == FB_MAGIC_LONG
            && self.lba.get() == expected_lba
    }
}

static_assertions::assert_eq_size!(FbMbr, [u8; 512]);

/// Converts an LBA to a 3-byte CHS value using the fixed geometry `H=255, S=63`.
pub fn lba_to_chs(lba: u32) -> Chs {
    Chs::new(lba)
}

/// Finds the lowest nonzero partition start LBA in the table, or `None` if every partition
/// is empty.
///
/// Mirrors the C `get_part_ofs`: used to find where the data region begins relative to the
/// ladder base, before the ladder has been shifted.
pub fn get_part_ofs(mbr: &FbMbr) -> Option<u32> {
    mbr.partitions()
        .partitions
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| p.start_sector.get())
        .filter(|&lba| lba != 0)
        .min()
}

/// Regenerates the `base + 1` sectors of the MBR ladder and writes each one through `write`.
///
/// `mbr` holds the canonical copy (ladder index 0, i.e. as it will sit at the disk's real
/// LBA 0). For each descending copy `i` from `1` to `base`, every nonempty partition's start
/// LBA is shifted down by one (cumulatively, so copy `i` ends up `i` below the canonical
/// start) and its CHS fields are recomputed, before the sector is handed to `write`.
///
/// `decrement_reserved_sectors`, when set, also decrements the two bytes at BPB offset
/// `0x0e` (`nrs`, reserved sector count) on every iteration — used when the ladder sits on
/// top of a FAT boot sector whose reserved-sector count is expressed relative to the
/// ladder's own moving LBA 0.
pub fn sync_mbr<W>(
    mbr: &mut FbMbr,
    base: u32,
    decrement_reserved_sectors: bool,
    mut write: W,
) -> Result<(), LadderError>
where
    W: FnMut(u32, &FbMbr) -> Result<(), LadderError>,
{
    if base > 63 {
        return Err(LadderError::BaseTooLarge(base));
    }

    for i in 0..=base {
        mbr.lba.set(i as u16);
        if i > 0 {
            for (idx, partition) in mbr.partitions_mut().partitions.iter_mut().enumerate() {
                if partition.is_empty() {
                    continue;
                }
                let start = partition
                    .start_sector
                    .get()
                    .checked_sub(1)
                    .ok_or(LadderError::PartitionUnderflow(idx))?;
                let size = partition.block_count.get();
                partition.start_sector.set(start);
                partition.start_head = lba_to_chs(start);
                partition.end_head = lba_to_chs(start + size - 1);
            }

            if decrement_reserved_sectors {
                // Reinterpreting these first bytes as a FAT16 BPB, this is `BPB_ReservedSecCnt`
                // at absolute offset 0x0e (jb[3] + on[8] + bps[2] + spc[1] = 14).
                let nrs = u16::from_le_bytes([mbr.boot_code[0x0c], mbr.boot_code[0x0d]]);
                let nrs = nrs.wrapping_sub(1).to_le_bytes();
                mbr.boot_code[0x0c] = nrs[0];
                mbr.boot_code[0x0d] = nrs[1];
            }
        }

        write(i, mbr)?;
    }

    Ok(())
}

/// Default depth to scan for a surviving fb MBR copy when restoring a disk whose sector
/// 0 has been overwritten (spec §4.2 "Restore"): the maximum ladder depth `format`
/// ever writes.
pub const DEF_BASE_SIZE: u32 = 63;

/// Errors from [`restore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RestoreError {
    #[error("can't find fb mbr")]
    NotFound,
    #[error(transparent)]
    Ladder(#[from] LadderError),
}

/// Scans sectors `0..=DEF_BASE_SIZE` for the first surviving fb MBR copy and, if it
/// isn't already at ladder index 0, rebuilds the whole ladder from it.
///
/// Mirrors `restore_disk`: the struck sector `i` carries the canonical partition table
/// (shifted up by `i` relative to copy 0, the reverse of what [`sync_mbr`] shifts down),
/// so the scan reuses that copy's partition table, re-synced from ladder index `i - 1`
/// down to `0`. `read_sector`/`write_sector` report failures as [`RestoreError`]
/// directly, so callers map their backend's I/O error at the call site.
pub fn restore(
    mut read_sector: impl FnMut(u32) -> Result<[u8; 512], RestoreError>,
    mut write_sector: impl FnMut(u32, &FbMbr) -> Result<(), RestoreError>,
) -> Result<(), RestoreError> {
    let mut found: Option<(u32, FbMbr)> = None;
    for i in 0..=DEF_BASE_SIZE {
        let bytes = read_sector(i)?;
        let mbr: FbMbr = *bytemuck::from_bytes(&bytes);
        if mbr.is_fb_mbr(i as u16) {
            found = Some((i, mbr));
            break;
        }
    }

    let (i, mut mbr) = found.ok_or(RestoreError::NotFound)?;
    if i == 0 {
        return Ok(());
    }

    let mut write_err = None;
    let result = sync_mbr(&mut mbr, i - 1, false, |idx, copy| {
        if let Err(e) = write_sector(idx, copy) {
            write_err = Some(e);
            return Err(LadderError::PartitionUnderflow(idx as usize));
        }
        Ok(())
    });
    if let Some(e) = write_err {
        return Err(e);
    }
    result?;
    Ok(())
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use fb_common::part::mbr::MbrPartition;
    use std::vec::Vec;

    fn blank_mbr() -> FbMbr {
        bytemuck::Zeroable::zeroed()
    }

    #[test]
    fn lba_to_chs_matches_fixed_geometry() {
        assert_eq!(lba_to_chs(0).as_lba(), 0);
        assert_eq!(lba_to_chs(63 * 255).as_lba(), 63 * 255);
    }

    #[test]
    fn sync_mbr_shifts_partition_start_down_the_ladder() {
        let mut mbr = blank_mbr();
        mbr.end_magic.set(BOOT_SIGNATURE);
        mbr.fb_magic.set(FB_MAGIC_LONG);
        {
            let table = mbr.partitions_mut();
            table.partitions[0] = MbrPartition {
                boot_indicator: 0x80,
                part_type: 0x0c,
                start_sector: U32::new(100),
                block_count: U32::new(1000),
                ..Default::default()
            };
        }

        let mut written = Vec::new();
        sync_mbr(&mut mbr, 3, false, |i, copy| {
            written.push((i, copy.partitions().partitions[0].start_sector.get()));
            Ok(())
        })
        .unwrap();

        assert_eq!(written, vec![(0, 100), (1, 99), (2, 98), (3, 97)]);
    }

    #[test]
    fn get_part_ofs_ignores_empty_partitions() {
        let mut mbr = blank_mbr();
        {
            let table = mbr.partitions_mut();
            table.partitions[1] = MbrPartition {
                part_type: 0x0b,
                start_sector: U32::new(2048),
                ..Default::default()
            };
        }
        assert_eq!(get_part_ofs(&mbr), Some(2048));
    }
}
