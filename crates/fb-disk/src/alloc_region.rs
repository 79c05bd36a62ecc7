//! The first-fit space allocator (spec §4.5), searching the gaps between catalog records
//! sorted by `data_start`.

use crate::catalog::Catalog;
use crate::error::FbError;
use crate::region::Region;

/// Finds the first gap in `catalog` (searching sectors `[floor, total_size)`) that fits
/// `size` bytes, honoring the caller's primary/extended preference.
///
/// Mirrors the original's `find_space`/`check_space`: a gap straddling `pri_size` is
/// tried on its primary side first (unless the caller asked for extended storage), and
/// only falls back to the extended side — recomputing `count` in 512-byte units — when
/// the primary side doesn't fit. This means a request for extended storage that would
/// actually fit inside a primary-only sub-gap is rejected rather than redirected; that
/// quirk is preserved for compatibility (spec §9's Open Questions).
pub fn find_space(
    catalog: &Catalog,
    floor: u32,
    total_size: u32,
    pri_size: u32,
    size: u32,
    is_ext: bool,
) -> Result<u32, FbError> {
    let mut cursor = floor;
    for record in &catalog.records {
        if record.data_start > cursor {
            if let Some(start) = check_space(cursor, record.data_start, pri_size, size, is_ext) {
                return Ok(start);
            }
        }
        cursor = cursor.max(record.data_start + record.sector_count(pri_size));
    }
    if total_size > cursor {
        if let Some(start) = check_space(cursor, total_size, pri_size, size, is_ext) {
            return Ok(start);
        }
    }
    Err(FbError::NoSpace { size })
}

/// Tests whether the gap `[begin, end)` can hold `size` bytes under the caller's
/// primary/extended preference, returning the start LBA if so.
fn check_space(begin: u32, end: u32, pri_size: u32, size: u32, is_ext: bool) -> Option<u32> {
    if end <= pri_size {
        // Entirely primary.
        if is_ext {
            return None;
        }
        let count = Region::Primary.sector_count(size);
        if end - begin >= count {
            return Some(begin);
        }
        None
    } else if begin >= pri_size {
        // Entirely extended.
        let count = Region::Extended.sector_count(size);
        if end - begin >= count {
            return Some(begin);
        }
        None
    } else {
        // Straddles the boundary: try the primary sub-gap first.
        if !is_ext {
            let count = Region::Primary.sector_count(size);
            if pri_size - begin >= count {
                return Some(begin);
            }
        }
        let count = Region::Extended.sector_count(size);
        if end - pri_size >= count {
            return Some(pri_size);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FileRecord, RecordFlags};
    use alloc::string::String;

    fn record(name: &str, data_start: u32, data_size: u32) -> FileRecord {
        FileRecord {
            flag: RecordFlags::empty(),
            data_start,
            data_size,
            data_time: 0,
            name: String::from(name),
        }
    }

    #[test]
    fn finds_gap_at_floor_when_empty() {
        let catalog = Catalog::empty(510 * 4);
        let start = find_space(&catalog, 100, 1_000_000, 65536, 256, false).unwrap();
        assert_eq!(start, 100);
    }

    #[test]
    fn fits_between_two_records() {
        let mut catalog = Catalog::empty(510 * 4);
        catalog.insert_sorted(record("a", 100, 510)).unwrap();
        catalog.insert_sorted(record("c", 2000, 510)).unwrap();
        let start = find_space(&catalog, 100, 1_000_000, 65536, 510, false).unwrap();
        assert_eq!(start, 101);
    }

    #[test]
    fn straddling_gap_prefers_primary_side() {
        let catalog = Catalog::empty(510 * 4);
        // pri_size is small so the only gap straddles it.
        let start = find_space(&catalog, 0, 10, 2, 510, false).unwrap();
        assert_eq!(start, 0);
    }

    #[test]
    fn extended_request_rejects_primary_only_gap() {
        let catalog = Catalog::empty(510 * 4);
        let err = find_space(&catalog, 0, 2, 65536, 512, true).unwrap_err();
        assert!(matches!(err, FbError::NoSpace { .. }));
    }

    #[test]
    fn no_space_when_nothing_fits() {
        let mut catalog = Catalog::empty(510);
        catalog.insert_sorted(record("a", 0, 510)).unwrap();
        let err = find_space(&catalog, 0, 1, 65536, 1, false).unwrap_err();
        assert!(matches!(err, FbError::NoSpace { .. }));
    }
}
