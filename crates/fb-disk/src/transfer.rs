//! File data transfer (spec §4.6): streams bytes into/out of 510- or 512-byte logical
//! blocks, stamping the primary-area watermark on every sector it writes there.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::FbError;
use crate::region::Region;
use crate::{Reader, Writer};

/// Writes `data` starting at sector `start`, returning the number of sectors used.
///
/// In the primary area each sector holds 510 payload bytes followed by its own LBA
/// (little-endian); the tail sector's unused payload bytes are zero-filled. In the
/// extended area sectors are written raw, 512 bytes each, with zero tail padding.
pub fn write_data<W: Writer>(
    dst: &mut W,
    start: u32,
    data: &[u8],
    pri_size: u32,
) -> Result<u32, FbError> {
    let region = Region::of_lba(start, pri_size);
    let unit = region.usable() as usize;
    let mut sector = 0u32;
    for chunk in data.chunks(unit) {
        let mut buf = [0u8; 512];
        buf[..chunk.len()].copy_from_slice(chunk);
        let lba = start + sector;
        if region == Region::Primary {
            buf[510..512].copy_from_slice(&(lba as u16).to_le_bytes());
        }
        dst.write_sector(lba, &buf)?;
        sector += 1;
    }
    if data.is_empty() {
        let lba = start;
        let mut buf = [0u8; 512];
        if region == Region::Primary {
            buf[510..512].copy_from_slice(&(lba as u16).to_le_bytes());
        }
        dst.write_sector(lba, &buf)?;
        sector = 1;
    }
    Ok(sector)
}

/// Reads `size` bytes starting at sector `start`, stripping the watermark from primary
/// sectors as it goes.
pub fn read_data<R: Reader>(src: &mut R, start: u32, size: u32, pri_size: u32) -> Result<Vec<u8>, FbError> {
    let region = Region::of_lba(start, pri_size);
    let unit = region.usable();
    let count = region.sector_count(size);
    let mut out = vec![0u8; size as usize];
    let mut remaining = size as usize;
    for i in 0..count {
        let buf = src.read_to_sector(start + i)?;
        let take = remaining.min(unit as usize);
        let begin = i as usize * unit as usize;
        out[begin..begin + take].copy_from_slice(&buf[..take]);
        remaining -= take;
    }
    Ok(out)
}

/// Copies `n` sectors worth of a file's data from `(src, src_start)` to `(dst,
/// dst_start)`, re-stamping the watermark if the destination is primary. Used by
/// `pack`'s defragmentation pass and by the archive engine.
pub fn copy_disk<R: Reader, W: Writer>(
    dst: &mut W,
    dst_start: u32,
    src: &mut R,
    src_start: u32,
    data_size: u32,
    pri_size: u32,
) -> Result<(), FbError> {
    let data = read_data(src, src_start, data_size, pri_size)?;
    write_data(dst, dst_start, &data, pri_size)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_write_stamps_watermark() {
        let mut disk = vec![0u8; 4096];
        {
            let mut slice: &mut [u8] = &mut disk;
            write_data(&mut slice, 2, b"hello", 1000).unwrap();
        }
        let sector = &disk[2 * 512..3 * 512];
        assert_eq!(&sector[..5], b"hello");
        assert_eq!(u16::from_le_bytes([sector[510], sector[511]]), 2);
    }

    #[test]
    fn extended_write_has_no_watermark() {
        let mut disk = vec![0xFFu8; 4096];
        {
            let mut slice: &mut [u8] = &mut disk;
            write_data(&mut slice, 2, b"hello", 1).unwrap();
        }
        let sector = &disk[2 * 512..3 * 512];
        assert_eq!(&sector[..5], b"hello");
        assert_eq!(sector[5], 0);
        assert_eq!(sector[511], 0);
    }

    #[test]
    fn read_after_write_round_trips() {
        let mut disk = vec![0u8; 4096];
        let payload: Vec<u8> = (0..600u16).map(|v| (v % 256) as u8).collect();
        {
            let mut slice: &mut [u8] = &mut disk;
            write_data(&mut slice, 0, &payload, 1000).unwrap();
        }
        let mut slice: &[u8] = &disk;
        let back = read_data(&mut slice, 0, payload.len() as u32, 1000).unwrap();
        assert_eq!(back, payload);
    }
}
