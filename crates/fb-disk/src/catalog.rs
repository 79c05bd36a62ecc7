//! The file catalog (spec §4.4): an ordered, byte-addressed, variable-length record list
//! living in the reserved catalog sectors, terminated by a zero `size` byte.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::FbError;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RecordFlags: u8 {
        /// File data lives in the extended area rather than the primary area.
        const EXTENDED = 0x01;
        /// The stored payload has had the syslinux patcher run over it.
        const SYSLINUX = 0x02;
    }
}

/// Largest full on-disk record length (`size` byte + flag + fixed fields + name + NUL),
/// matching the original's `len > 255` check in `alloc_file`/`resize_file` — not to be
/// confused with the `size` byte's own value, which is this minus 2.
const MAX_SIZE: usize = 255;
/// Fixed-size fields preceding `name`: `size`(1) + `flag`(1) + `data_start`(4) +
/// `data_size`(4) + `data_time`(4).
const FIXED_FIELDS: usize = 14;

/// One entry in the catalog. `name` is NUL-terminated on disk; the in-memory copy holds
/// it without the terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub flag: RecordFlags,
    pub data_start: u32,
    pub data_size: u32,
    pub data_time: u32,
    pub name: String,
}

impl FileRecord {
    /// Bytes this record occupies on disk, including its `size` byte and NUL terminator.
    pub fn encoded_len(&self) -> usize {
        FIXED_FIELDS + self.name.len() + 1
    }

    fn size_byte(&self) -> Result<u8, FbError> {
        // size = total on-disk record length - 2 (the defining relation in the original:
        // `m->size = len - 2` where `len` is the full record including its own `size`
        // byte and the NUL terminator).
        let size = self
            .encoded_len()
            .checked_sub(2)
            .ok_or_else(|| FbError::ItemTooLong(self.name.clone()))?;
        u8::try_from(size).map_err(|_| FbError::ItemTooLong(self.name.clone()))
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), FbError> {
        out.push(self.size_byte()?);
        out.push(self.flag.bits());
        out.extend_from_slice(&self.data_start.to_le_bytes());
        out.extend_from_slice(&self.data_size.to_le_bytes());
        out.extend_from_slice(&self.data_time.to_le_bytes());
        out.extend_from_slice(self.name.as_bytes());
        out.push(0);
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Option<(Self, usize)> {
        let size = *bytes.first()? as usize;
        if size == 0 {
            return None;
        }
        // name_len here includes the NUL terminator: total_bytes = size + 2, and the
        // fixed fields occupy FIXED_FIELDS bytes, so name_len = size + 2 - FIXED_FIELDS.
        let name_len = (size + 2).checked_sub(FIXED_FIELDS)?;
        if name_len == 0 {
            return None;
        }
        let total = FIXED_FIELDS + name_len;
        if bytes.len() < total {
            return None;
        }
        let flag = RecordFlags::from_bits_truncate(bytes[1]);
        let data_start = u32::from_le_bytes(bytes[2..6].try_into().ok()?);
        let data_size = u32::from_le_bytes(bytes[6..10].try_into().ok()?);
        let data_time = u32::from_le_bytes(bytes[10..14].try_into().ok()?);
        let name_bytes = &bytes[14..14 + name_len];
        let nul = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_len);
        let name = String::from_utf8_lossy(&name_bytes[..nul]).into_owned();
        Some((
            FileRecord {
                flag,
                data_start,
                data_size,
                data_time,
                name,
            },
            total,
        ))
    }

    /// Number of region-native sectors this record's payload occupies.
    pub fn sector_count(&self, pri_size: u32) -> u32 {
        let region = crate::Region::of_lba(self.data_start, pri_size);
        region.sector_count(self.data_size)
    }
}

/// The parsed, in-memory catalog. `capacity` is `list_sectors * 510`, the logical byte
/// budget once the per-sector watermarks have been stripped.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub records: Vec<FileRecord>,
    pub capacity: usize,
}

impl Catalog {
    pub fn empty(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            capacity,
        }
    }

    /// Parses a catalog from its logical (watermark-stripped) byte stream.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut records = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            match FileRecord::decode(&bytes[offset..]) {
                Some((record, len)) => {
                    records.push(record);
                    offset += len;
                }
                None => break,
            }
        }
        Self {
            records,
            capacity: bytes.len(),
        }
    }

    /// Serializes the catalog back to its logical byte stream, zero-padding the
    /// remainder after the terminator.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FbError> {
        let mut out = Vec::with_capacity(self.capacity);
        for record in &self.records {
            record.encode(&mut out)?;
        }
        if out.len() >= self.capacity {
            return Err(FbError::ItemTooLong(alloc::string::String::from(
                "catalog",
            )));
        }
        out.resize(self.capacity, 0);
        Ok(out)
    }

    /// Bytes used so far, including the zero terminator byte (spec's `tail offset`).
    pub fn tail_offset(&self) -> usize {
        self.records.iter().map(FileRecord::encoded_len).sum::<usize>() + 1
    }

    /// Case-insensitive linear scan by name.
    pub fn find(&self, name: &str) -> Option<&FileRecord> {
        self.records
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut FileRecord> {
        self.records
            .iter_mut()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// Removes the record named `name`, if any, returning it.
    pub fn delete(&mut self, name: &str) -> Option<FileRecord> {
        let idx = self
            .records
            .iter()
            .position(|r| r.name.eq_ignore_ascii_case(name))?;
        Some(self.records.remove(idx))
    }

    /// Inserts `record`, keeping the list ascending by `data_start` (the allocator's
    /// invariant, spec §3/§8).
    pub fn insert_sorted(&mut self, record: FileRecord) -> Result<(), FbError> {
        if record.encoded_len() > MAX_SIZE {
            return Err(FbError::ItemTooLong(record.name.clone()));
        }
        let pos = self
            .records
            .iter()
            .position(|r| r.data_start > record.data_start)
            .unwrap_or(self.records.len());
        self.records.insert(pos, record);
        if self.tail_offset() > self.capacity {
            let removed = self.records.remove(pos);
            return Err(FbError::ItemTooLong(removed.name));
        }
        Ok(())
    }

    /// Canonicalizes a user-supplied name per spec §4.4: strip a single leading `/`,
    /// reject empty names.
    pub fn canonicalize_name(name: &str) -> Result<&str, FbError> {
        let stripped = name.strip_prefix('/').unwrap_or(name);
        if stripped.is_empty() {
            return Err(FbError::InvalidArgument(String::from("empty file name")));
        }
        Ok(stripped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, data_start: u32) -> FileRecord {
        FileRecord {
            flag: RecordFlags::empty(),
            data_start,
            data_size: 256,
            data_time: 0,
            name: String::from(name),
        }
    }

    #[test]
    fn round_trips_through_bytes() {
        let mut catalog = Catalog::empty(510 * 4);
        catalog.insert_sorted(sample("hello.txt", 100)).unwrap();
        catalog.insert_sorted(sample("a.bin", 50)).unwrap();

        let bytes = catalog.to_bytes().unwrap();
        let parsed = Catalog::parse(&bytes);

        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].name, "a.bin");
        assert_eq!(parsed.records[1].name, "hello.txt");
    }

    #[test]
    fn find_is_case_insensitive() {
        let mut catalog = Catalog::empty(510);
        catalog.insert_sorted(sample("Hello.TXT", 10)).unwrap();
        assert!(catalog.find("hello.txt").is_some());
    }

    #[test]
    fn delete_removes_and_round_trips() {
        let mut catalog = Catalog::empty(510 * 2);
        catalog.insert_sorted(sample("a.bin", 10)).unwrap();
        catalog.insert_sorted(sample("b.bin", 20)).unwrap();
        let removed = catalog.delete("a.bin").unwrap();
        assert_eq!(removed.name, "a.bin");
        assert_eq!(catalog.records.len(), 1);
    }

    #[test]
    fn insert_sorted_keeps_data_start_order() {
        let mut catalog = Catalog::empty(510 * 4);
        catalog.insert_sorted(sample("c", 300)).unwrap();
        catalog.insert_sorted(sample("a", 100)).unwrap();
        catalog.insert_sorted(sample("b", 200)).unwrap();
        let starts: Vec<u32> = catalog.records.iter().map(|r| r.data_start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn record_at_255_bytes_fits_but_256_is_rejected() {
        let mut catalog = Catalog::empty(510 * 4);
        // FIXED_FIELDS(14) + name.len() + 1(NUL) == 255 at name.len() == 240.
        let fits = sample(&"a".repeat(240), 10);
        assert_eq!(fits.encoded_len(), 255);
        catalog.insert_sorted(fits).unwrap();

        let mut catalog = Catalog::empty(510 * 4);
        let too_long = sample(&"a".repeat(241), 10);
        assert_eq!(too_long.encoded_len(), 256);
        assert!(matches!(catalog.insert_sorted(too_long), Err(FbError::ItemTooLong(_))));
    }

    #[test]
    fn canonicalize_strips_leading_slash() {
        assert_eq!(Catalog::canonicalize_name("/foo").unwrap(), "foo");
        assert_eq!(Catalog::canonicalize_name("foo").unwrap(), "foo");
        assert!(Catalog::canonicalize_name("/").is_err());
        assert!(Catalog::canonicalize_name("").is_err());
    }
}
