//! The self-contained archive format (spec §4.9): a disk's header, catalog, and file
//! payloads linearized into a standalone file that can be saved, shipped, and restored.

use alloc::vec;
use alloc::vec::Vec;

use crate::catalog::{Catalog, FileRecord};
use crate::error::FbError;
use crate::header::{FbHeader, FB_AR_MAGIC_LONG};
use crate::syslinux;
use crate::transfer::{read_data, write_data};
use crate::{Reader, Writer};

/// An archive's own "primary area" is just its catalog sectors — everything from the
/// first payload sector onward is raw 512-byte blocks, even though file bytes are still
/// addressed the same way a disk's extended area would be.
fn payload_boundary(list_sectors: u16) -> u32 {
    1 + list_sectors as u32
}

/// Reads and validates an archive's header (sector 0) and catalog, returning the parsed
/// [`FbHeader`] and [`Catalog`] with `data_start` fields relative to the archive file
/// itself.
pub fn read_archive<R: Reader>(src: &mut R) -> Result<(FbHeader, Catalog), FbError> {
    let sector0 = src.read_to_sector(0)?;
    let magic = u32::from_le_bytes(sector0[0..4].try_into().unwrap());
    if magic != FB_AR_MAGIC_LONG {
        return Err(FbError::InvalidArchive);
    }
    let header = FbHeader::from_bytes(sector0[4..20].try_into().unwrap());
    let list_sectors = header.list_size();
    let boundary = payload_boundary(list_sectors);

    let catalog_bytes = read_data(src, 1, list_sectors as u32 * 510, boundary)?;
    Ok((header, Catalog::parse(&catalog_bytes)))
}

/// Writes a fresh, empty archive (the `create` command): just the header sector, no
/// catalog sectors written yet beyond what a subsequent `load` will fill in.
pub fn create<W: Writer>(
    dst: &mut W,
    pri_size: u32,
    ext_size: u32,
    list_size_bytes: u32,
) -> Result<(FbHeader, Catalog), FbError> {
    let list_sectors = (list_size_bytes.div_ceil(510)) as u16;
    let header = FbHeader::new(pri_size, ext_size, list_sectors, 0);

    let mut sector0 = [0u8; 512];
    sector0[0..4].copy_from_slice(&FB_AR_MAGIC_LONG.to_le_bytes());
    sector0[4..20].copy_from_slice(&header.to_bytes());
    dst.write_sector(0, &sector0)?;

    let catalog = Catalog::empty(list_sectors as usize * 510);
    write_catalog(dst, &catalog, list_sectors)?;
    Ok((header, catalog))
}

fn write_catalog<W: Writer>(dst: &mut W, catalog: &Catalog, list_sectors: u16) -> Result<(), FbError> {
    let boundary = payload_boundary(list_sectors);
    let bytes = catalog.to_bytes()?;
    write_data(dst, 1, &bytes, boundary)?;
    Ok(())
}

/// Saves the live catalog and file payloads from `src` (a disk, read with its own
/// `src_pri_size`) into a fresh archive at `dst`. Mirrors `save_archive`: payloads are
/// relocated to start right after the catalog and each is padded up to a 512-byte
/// boundary; record order (and so relative `data_start` order) is preserved.
pub fn save<R: Reader, W: Writer>(
    dst: &mut W,
    src: &mut R,
    src_catalog: &Catalog,
    src_pri_size: u32,
    src_ext_size: u32,
    list_size_bytes: u32,
) -> Result<(), FbError> {
    let list_sectors = (list_size_bytes.div_ceil(510)) as u16;
    let boundary = payload_boundary(list_sectors);

    let mut archive_catalog = Catalog::empty(list_sectors as usize * 510);
    let mut cursor = boundary;
    let mut records_with_new_start = Vec::with_capacity(src_catalog.records.len());
    for record in &src_catalog.records {
        let new_start = cursor;
        cursor += record.data_size.div_ceil(512);
        let mut relocated = record.clone();
        relocated.data_start = new_start;
        records_with_new_start.push((record.clone(), relocated.clone()));
        archive_catalog.insert_sorted(relocated)?;
    }

    let header = FbHeader::new(src_pri_size, src_ext_size, list_sectors, 0);
    let mut sector0 = [0u8; 512];
    sector0[0..4].copy_from_slice(&FB_AR_MAGIC_LONG.to_le_bytes());
    sector0[4..20].copy_from_slice(&header.to_bytes());
    dst.write_sector(0, &sector0)?;
    write_catalog(dst, &archive_catalog, list_sectors)?;

    for (original, relocated) in &records_with_new_start {
        let data = read_data(src, original.data_start, original.data_size, src_pri_size)?;
        write_data(dst, relocated.data_start, &data, boundary)?;
    }

    Ok(())
}

/// Loads an archive's catalog and payloads onto `dst` (a disk or another archive,
/// already formatted/created with its own header). Each record is re-allocated against
/// the destination's free space rather than reusing the archive's own layout, and any
/// record with the syslinux flag set has the patcher re-run against its new location —
/// mirroring `load_archive`'s `alloc_file` + conditional `syslinux_patch`.
#[allow(clippy::too_many_arguments)]
pub fn load<R: Reader, W: Writer>(
    dst: &mut W,
    dst_catalog: &mut Catalog,
    dst_pri_size: u32,
    dst_total_size: u32,
    dst_part_offset: u32,
    src: &mut R,
) -> Result<(), FbError> {
    let (_header, src_catalog) = read_archive(src)?;
    let list_sectors = _header.list_size();
    let boundary = payload_boundary(list_sectors);

    for record in &src_catalog.records {
        let is_ext = record.flag.contains(crate::catalog::RecordFlags::EXTENDED);
        let start = crate::alloc_region::find_space(
            dst_catalog,
            dst_catalog
                .records
                .last()
                .map(|r| r.data_start + r.sector_count(dst_pri_size))
                .unwrap_or(0),
            dst_total_size,
            dst_pri_size,
            record.data_size,
            is_ext,
        )
        .or_else(|_| {
            crate::alloc_region::find_space(dst_catalog, 0, dst_total_size, dst_pri_size, record.data_size, is_ext)
        })?;

        let mut data = read_data(src, record.data_start, record.data_size, boundary)?;
        if record.flag.contains(crate::catalog::RecordFlags::SYSLINUX) {
            syslinux::patch(&mut data, record.data_size, start, dst_part_offset)?;
        }
        write_data(dst, start, &data, dst_pri_size)?;

        let mut new_record = record.clone();
        new_record.data_start = start;
        dst_catalog.delete(&new_record.name);
        dst_catalog.insert_sorted(new_record)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RecordFlags;
    use alloc::string::String;

    fn make_source_disk() -> (Vec<u8>, Catalog, u32) {
        let pri_size = 200u32;
        let mut disk = vec![0u8; 4096 * 512];
        let mut catalog = Catalog::empty(510 * 2);
        let record = FileRecord {
            flag: RecordFlags::empty(),
            data_start: 100,
            data_size: 5,
            data_time: 0,
            name: String::from("a.bin"),
        };
        {
            let mut slice: &mut [u8] = &mut disk;
            write_data(&mut slice, record.data_start, b"hello", pri_size).unwrap();
        }
        catalog.insert_sorted(record).unwrap();
        (disk, catalog, pri_size)
    }

    #[test]
    fn save_then_read_back_preserves_catalog_and_data() {
        let (mut disk, catalog, pri_size) = make_source_disk();
        let mut archive = vec![0u8; 8192 * 512];
        {
            let mut src: &mut [u8] = &mut disk;
            let mut dst: &mut [u8] = &mut archive;
            save(&mut dst, &mut src, &catalog, pri_size, 0, 4 * 510).unwrap();
        }
        let mut src: &[u8] = &archive;
        let (header, archive_catalog) = read_archive(&mut src).unwrap();
        assert_eq!(header.pri_size(), pri_size);
        assert_eq!(archive_catalog.records.len(), 1);
        assert_eq!(archive_catalog.records[0].name, "a.bin");

        let data = read_data(
            &mut src,
            archive_catalog.records[0].data_start,
            5,
            payload_boundary(header.list_size()),
        )
        .unwrap();
        assert_eq!(data, b"hello");
    }

    #[test]
    fn create_then_load_seeds_empty_target() {
        let mut archive_storage = vec![0u8; 8192 * 512];
        {
            let mut archive: &mut [u8] = &mut archive_storage;
            create(&mut archive, 200, 0, 4 * 510).unwrap();
        }

        let (disk, src_catalog, pri_size) = make_source_disk();
        let mut saved = vec![0u8; 8192 * 512];
        {
            let mut src_slice: &[u8] = &disk;
            let mut dst_slice: &mut [u8] = &mut saved;
            save(&mut dst_slice, &mut src_slice, &src_catalog, pri_size, 0, 4 * 510).unwrap();
        }

        let mut target = vec![0u8; 8192 * 512];
        let mut target_catalog = Catalog::empty(510 * 4);
        {
            let mut src: &[u8] = &saved;
            let mut dst: &mut [u8] = &mut target;
            load(&mut dst, &mut target_catalog, 1000, 8192, 63, &mut src).unwrap();
        }
        assert_eq!(target_catalog.records.len(), 1);
        assert_eq!(target_catalog.records[0].name, "a.bin");
    }
}
