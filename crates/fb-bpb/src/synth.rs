//! Byte-exact FAT16/FAT32 boot-sector and reserved-region synthesis.
//!
//! Mirrors `format_fat16`/`format_fat32` from the fb source: the boot sector, FSINFO
//! sector (FAT32 only), FAT tables and root-directory region are written exactly the way
//! DOS/Windows `format` writes them, so a disk formatted here mounts identically on any
//! OS. Cluster-size selection follows the Microsoft threshold tables; see [`Fat16Params`]
//! and [`Fat32Params`].

use std::io::{Seek, SeekFrom, Write};

/// Errors produced while synthesizing a FAT16/FAT32 reserved region.
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error("invalid size for fat16: {0} sectors")]
    InvalidFat16Size(u32),
    #[error("invalid size for fat32: {0} sectors")]
    InvalidFat32Size(u32),
    #[error("unit size {0} invalid for fat16")]
    InvalidFat16UnitSize(u8),
    #[error("unit size {0} invalid for fat32")]
    InvalidFat32UnitSize(u8),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Inputs to [`format_fat16`].
#[derive(Debug, Clone, Copy)]
pub struct Fat16Params {
    /// `ds`: total sectors in the partition this filesystem will occupy.
    pub total_sectors: u32,
    /// `unit_size`: forced sectors/cluster, or `0` to select from the size table.
    pub unit_size: u8,
    /// `is_align`: round `fz16` up so the data region starts on a cluster boundary
    /// relative to the containing disk.
    pub align: bool,
    /// `xd->ofs`: the partition's starting LBA on the containing disk (hidden sectors).
    pub part_offset: u32,
}

/// Inputs to [`format_fat32`]. Same shape as [`Fat16Params`]; FAT32 never forces the
/// root-entry-count/floppy special cases FAT16 does.
#[derive(Debug, Clone, Copy)]
pub struct Fat32Params {
    pub total_sectors: u32,
    pub unit_size: u8,
    pub align: bool,
    pub part_offset: u32,
}

/// The computed layout of a synthesized FAT16 region, for callers that need to reason
/// about where the data region begins without re-parsing the boot sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fat16Layout {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub sectors_per_fat: u16,
    pub root_entry_count: u16,
    pub root_dir_sectors: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fat32Layout {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub sectors_per_fat: u32,
    pub backup_boot_sector: u16,
}

const MIN_FAT16_SIZE: u32 = 8401;

fn fat16_spc_for_size(ds: u32) -> Result<u8, SynthError> {
    const TABLE: [(u32, u8); 7] = [
        (8400, 0),
        (32680, 2),
        (262144, 4),
        (524288, 8),
        (1048576, 16),
        (2097152, 32),
        (4194304, 64),
    ];
    for (limit, spc) in TABLE {
        if ds <= limit {
            if spc == 0 {
                return Err(SynthError::InvalidFat16Size(ds));
            }
            return Ok(spc);
        }
    }
    Ok(64)
}

fn fat32_spc_for_size(ds: u32) -> Result<u8, SynthError> {
    const TABLE: [(u32, u8); 5] = [
        (66600, 0),
        (532480, 1),
        (16777216, 8),
        (33554432, 16),
        (67108864, 32),
    ];
    for (limit, spc) in TABLE {
        if ds <= limit {
            if spc == 0 {
                return Err(SynthError::InvalidFat32Size(ds));
            }
            return Ok(spc);
        }
    }
    Ok(64)
}

/// Writes a byte-exact FAT16 boot sector, FAT tables, and root directory region to `w`
/// at its current position. Returns the computed layout.
pub fn format_fat16<W: Write + Seek>(
    w: &mut W,
    params: &Fat16Params,
) -> Result<Fat16Layout, SynthError> {
    let Fat16Params {
        total_sectors: ds,
        unit_size,
        align,
        part_offset: ofs,
    } = *params;

    let mut buf = [0u8; 512];
    buf[0x00] = 0xEB;
    buf[0x01] = 0x3C;
    buf[0x02] = 0x90;
    buf[0x03..0x0B].copy_from_slice(b"MSWIN4.1");
    buf[0x0B..0x0D].copy_from_slice(&512u16.to_le_bytes());

    let nrs: u16 = 1;
    let nf: u8 = 2;
    let small = ds < MIN_FAT16_SIZE;
    let nrd: u16 = if small {
        0xF0
    } else if ofs & 1 != 0 {
        0x200
    } else {
        0x1F0
    };
    let md: u8 = if small { 0xF0 } else { 0xF8 };

    buf[0x0D] = 0; // sectors_per_cluster filled below
    buf[0x0E..0x10].copy_from_slice(&nrs.to_le_bytes());
    buf[0x10] = nf;
    buf[0x11..0x13].copy_from_slice(&nrd.to_le_bytes());
    if ds < 65536 {
        buf[0x13..0x15].copy_from_slice(&(ds as u16).to_le_bytes());
    }
    buf[0x15] = md;
    // sectors_per_fat_16 filled below at 0x16..0x18
    buf[0x1C..0x20].copy_from_slice(&ofs.to_le_bytes());
    if ds >= 65536 {
        buf[0x20..0x24].copy_from_slice(&ds.to_le_bytes());
    }
    buf[0x24] = 0x80; // drive number
    buf[0x26] = 0x29; // extended boot signature
    buf[0x27..0x2B].copy_from_slice(&0u32.to_le_bytes()); // volume id
    buf[0x2B..0x36].copy_from_slice(b"NO NAME    ");
    buf[0x36..0x3E].copy_from_slice(if small { b"FAT12   " } else { b"FAT16   " });
    buf[0x1FE..0x200].copy_from_slice(&0xAA55u16.to_le_bytes());

    let (spc, fz16, spt, nh): (u8, u16, u16, u8) = if ds == 2880 {
        (1, 9, 18, 2)
    } else if ds == 5760 {
        (2, 9, 36, 2)
    } else {
        let spc = if unit_size != 0 {
            unit_size
        } else {
            fat16_spc_for_size(ds)?
        };

        let root_dir_sectors = (nrd as u32 * 32 + 511) / 512;
        let i = ds - (nrs as u32 + root_dir_sectors);
        let j = 256u32 * spc as u32 + nf as u32;
        let mut fz16 = ((i + j - 1) / j) as u16;

        if align {
            let b = ofs + nrs as u32 + fz16 as u32 * 2 + root_dir_sectors;
            let n = (b + spc as u32 - 1) / spc as u32;
            fz16 += ((n * spc as u32 - b) / 2) as u16;
        }

        let i = ds - (nrs as u32 + root_dir_sectors);
        let clusters = i / spc as u32;
        if clusters >= 65525 {
            return Err(SynthError::InvalidFat16UnitSize(spc));
        }

        (spc, fz16, 63, 255)
    };

    buf[0x0D] = spc;
    buf[0x16..0x18].copy_from_slice(&fz16.to_le_bytes());
    buf[0x18..0x1A].copy_from_slice(&spt.to_le_bytes());
    buf[0x1A..0x1C].copy_from_slice(&(nh as u16).to_le_bytes());

    w.write_all(&buf)?;
    write_zero_sectors(w, nrs as u32 - 1)?;

    let root_dir_sectors = (nrd as u32 * 32 + 511) / 512;
    let mut fat_sector = [0u8; 512];
    let media_marker: u32 = if small { 0x00FF_FFF8 } else { 0xFFFF_FFF8 };
    fat_sector[0..4].copy_from_slice(&media_marker.to_le_bytes());
    for _ in 0..nf {
        w.write_all(&fat_sector)?;
        write_zero_sectors(w, fz16 as u32 - 1)?;
    }
    write_zero_sectors(w, root_dir_sectors)?;

    Ok(Fat16Layout {
        bytes_per_sector: 512,
        sectors_per_cluster: spc,
        reserved_sectors: nrs,
        fat_count: nf,
        sectors_per_fat: fz16,
        root_entry_count: nrd,
        root_dir_sectors,
    })
}

/// Writes a byte-exact FAT32 boot record (boot sector + FSINFO + mirror), FAT tables,
/// and a zeroed first cluster for the root directory to `w` at its current position.
pub fn format_fat32<W: Write + Seek>(
    w: &mut W,
    params: &Fat32Params,
) -> Result<Fat32Layout, SynthError> {
    let Fat32Params {
        total_sectors: ds,
        unit_size,
        align,
        part_offset: ofs,
    } = *params;

    let nrs: u16 = 32 + (ofs & 1) as u16;
    let nf: u8 = 2;
    let bbs: u16 = 6;

    let spc = if unit_size != 0 {
        unit_size
    } else {
        fat32_spc_for_size(ds)?
    };

    let i = ds - nrs as u32;
    let j = (256u32 * spc as u32 + nf as u32) / 2;
    let mut fz32 = (i + j - 1) / j;

    if align {
        let b = ofs + nrs as u32 + fz32 * 2;
        let n = (b + spc as u32 - 1) / spc as u32;
        fz32 += (n * spc as u32 - b) / 2;
    }

    let clusters = (ds - nrs as u32) / spc as u32;
    if clusters < 65525 {
        return Err(SynthError::InvalidFat32UnitSize(spc));
    }

    let mut buf = [0u8; 512 * 3];
    buf[0x00] = 0xEB;
    buf[0x01] = 0x58;
    buf[0x02] = 0x90;
    buf[0x03..0x0B].copy_from_slice(b"MSWIN4.1");
    buf[0x0B..0x0D].copy_from_slice(&512u16.to_le_bytes());
    buf[0x0D] = spc;
    buf[0x0E..0x10].copy_from_slice(&nrs.to_le_bytes());
    buf[0x10] = nf;
    // root_entry_count, total_sectors_16 stay zero
    buf[0x15] = 0xF8; // media type
    // sectors_per_fat_16 stays zero
    buf[0x18..0x1A].copy_from_slice(&63u16.to_le_bytes());
    buf[0x1A..0x1C].copy_from_slice(&255u16.to_le_bytes());
    buf[0x1C..0x20].copy_from_slice(&ofs.to_le_bytes());
    buf[0x20..0x24].copy_from_slice(&ds.to_le_bytes());

    buf[0x24..0x28].copy_from_slice(&fz32.to_le_bytes());
    // ext_flags, fs version stay zero
    buf[0x2C..0x30].copy_from_slice(&2u32.to_le_bytes()); // root_cluster
    buf[0x30..0x32].copy_from_slice(&1u16.to_le_bytes()); // fs_info_sector
    buf[0x32..0x34].copy_from_slice(&bbs.to_le_bytes());
    buf[0x40] = 0x80; // drive number
    buf[0x42] = 0x29; // extended boot signature
    buf[0x43..0x47].copy_from_slice(&0u32.to_le_bytes()); // volume id
    buf[0x47..0x52].copy_from_slice(b"NO NAME    ");
    buf[0x52..0x5A].copy_from_slice(b"FAT32   ");
    buf[0x1FE..0x200].copy_from_slice(&0xAA55u16.to_le_bytes());

    // FSINFO sector (offset 0x200..0x400)
    buf[0x200..0x204].copy_from_slice(&0x4161_5252u32.to_le_bytes());
    buf[0x3E4..0x3E8].copy_from_slice(&0x6141_7272u32.to_le_bytes());
    buf[0x3E8..0x3EC].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    buf[0x3EC..0x3F0].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    buf[0x3FE..0x400].copy_from_slice(&0xAA55u16.to_le_bytes());
    // Third sector: all zero except its own end-of-sector signature.
    buf[0x5FE..0x600].copy_from_slice(&0xAA55u16.to_le_bytes());

    w.write_all(&buf)?;
    write_zero_sectors(w, bbs as u32 - 3)?;
    w.write_all(&buf)?;
    write_zero_sectors(w, nrs as u32 - bbs as u32 - 3)?;

    let mut fat_sector = [0u8; 512];
    fat_sector[0..4].copy_from_slice(&0x0FFF_FFF8u32.to_le_bytes());
    fat_sector[4..8].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
    fat_sector[8..12].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
    for _ in 0..nf {
        w.write_all(&fat_sector)?;
        write_zero_sectors(w, fz32 - 1)?;
    }
    write_zero_sectors(w, spc as u32)?;

    Ok(Fat32Layout {
        bytes_per_sector: 512,
        sectors_per_cluster: spc,
        reserved_sectors: nrs,
        fat_count: nf,
        sectors_per_fat: fz32,
        backup_boot_sector: bbs,
    })
}

fn write_zero_sectors<W: Write + Seek>(w: &mut W, count: u32) -> Result<(), std::io::Error> {
    if count == 0 {
        return Ok(());
    }
    // Sparse files zero-fill on seek-past-end; this matches the original's explicit
    // zero_disk() writes without materializing every zero byte when the backend
    // supports holes.
    w.seek(SeekFrom::Current(count as i64 * 512))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn fat16_golden_boot_sector() {
        let mut buf = vec![0u8; 2048 * 512];
        let mut cursor = Cursor::new(&mut buf[..]);
        let layout = format_fat16(
            &mut cursor,
            &Fat16Params {
                total_sectors: 2048,
                unit_size: 0,
                align: false,
                part_offset: 63,
            },
        )
        .unwrap();

        assert_eq!(&buf[0x00..0x03], &[0xEB, 0x3C, 0x90]);
        assert_eq!(&buf[0x03..0x0B], b"MSWIN4.1");
        assert_eq!(u16::from_le_bytes(buf[0x0B..0x0D].try_into().unwrap()), 512);
        assert_eq!(buf[0x10], 2); // fat_count
        assert_eq!(u16::from_le_bytes(buf[0x13..0x15].try_into().unwrap()), 2048);
        assert_eq!(&buf[0x1FE..0x200], &[0x55, 0xAA]);
        assert_eq!(layout.fat_count, 2);
        assert_eq!(layout.reserved_sectors, 1);
    }

    #[test]
    fn fat16_rejects_tiny_disk() {
        let mut buf = vec![0u8; 512 * 512];
        let mut cursor = Cursor::new(&mut buf[..]);
        let err = format_fat16(
            &mut cursor,
            &Fat16Params {
                total_sectors: 100,
                unit_size: 0,
                align: false,
                part_offset: 0,
            },
        )
        .unwrap_err();
        assert!(matches!(err, SynthError::InvalidFat16Size(100)));
    }

    #[test]
    fn fat32_golden_boot_sector() {
        let mut buf = vec![0u8; 262144 * 512];
        let mut cursor = Cursor::new(&mut buf[..]);
        let layout = format_fat32(
            &mut cursor,
            &Fat32Params {
                total_sectors: 262081,
                unit_size: 0,
                align: false,
                part_offset: 63,
            },
        )
        .unwrap();

        assert_eq!(&buf[0x00..0x03], &[0xEB, 0x58, 0x90]);
        assert_eq!(buf[0x10], 2);
        assert_eq!(u16::from_le_bytes(buf[0x0E..0x10].try_into().unwrap()), 32);
        assert_eq!(buf[0x0D], 1);
        assert_eq!(
            u32::from_le_bytes(buf[0x200..0x204].try_into().unwrap()),
            0x4161_5252
        );
        assert_eq!(layout.sectors_per_cluster, 1);
        assert_eq!(layout.reserved_sectors, 32);
    }

    #[test]
    fn fat32_rejects_tiny_disk() {
        let mut buf = vec![0u8; 512 * 512];
        let mut cursor = Cursor::new(&mut buf[..]);
        let err = format_fat32(
            &mut cursor,
            &Fat32Params {
                total_sectors: 100,
                unit_size: 0,
                align: false,
                part_offset: 0,
            },
        )
        .unwrap_err();
        assert!(matches!(err, SynthError::InvalidFat32Size(100)));
    }
}
