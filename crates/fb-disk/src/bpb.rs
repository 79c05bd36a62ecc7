//! Bridges [`fb_bpb::synth`]'s `std::io::{Write, Seek}` interface to this crate's
//! sector-oriented [`Writer`] trait, so `format` can hand a disk region straight to
//! `format_fat16`/`format_fat32` without an intermediate in-memory buffer.

extern crate std;

use std::io::{Seek, SeekFrom, Write};

use crate::{ReadWriteError, Writer};

/// A `Write + Seek` cursor over `[base_sector, base_sector + len_sectors)` of a
/// [`Writer`]. `format_fat16`/`format_fat32` only ever write whole 512-byte sectors
/// (an aligned boot/FAT/FSINFO sector) or seek forward by whole sectors to skip a
/// zero-filled run, so this cursor only has to support sector-aligned writes and
/// forward seeks; both are asserted.
pub struct SectorCursor<'a, W: Writer> {
    writer: &'a mut W,
    base_sector: u32,
    len_sectors: u32,
    pos: u64,
}

impl<'a, W: Writer> SectorCursor<'a, W> {
    pub fn new(writer: &'a mut W, base_sector: u32, len_sectors: u32) -> Self {
        Self {
            writer,
            base_sector,
            len_sectors,
            pos: 0,
        }
    }
}

fn to_io_err(e: ReadWriteError) -> std::io::Error {
    std::io::Error::other(e.to_string())
}

impl<W: Writer> Write for SectorCursor<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        assert_eq!(self.pos % 512, 0, "SectorCursor only supports sector-aligned writes");
        assert_eq!(buf.len(), 512, "SectorCursor only supports whole-sector writes");
        let sector = self.base_sector + (self.pos / 512) as u32;
        assert!(
            sector < self.base_sector + self.len_sectors,
            "write past the end of the reserved region"
        );
        let mut sector_buf = [0u8; 512];
        sector_buf.copy_from_slice(buf);
        self.writer.write_sector(sector, &sector_buf).map_err(to_io_err)?;
        self.pos += 512;
        Ok(512)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<W: Writer> Seek for SectorCursor<'_, W> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p,
            SeekFrom::Current(delta) => (self.pos as i64 + delta) as u64,
            SeekFrom::End(_) => {
                return Err(std::io::Error::other("SectorCursor has no fixed end"));
            }
        };
        assert!(target >= self.pos, "SectorCursor only supports forward seeks");
        assert_eq!(target % 512, 0, "SectorCursor only supports sector-aligned seeks");

        // `format_fat16`/`format_fat32` seek forward to skip zero-filled runs
        // (reserved sectors, the tail of each FAT). Stamp those sectors with zeros
        // explicitly rather than relying on the backing store already being blank.
        let mut sector = self.base_sector + (self.pos / 512) as u32;
        let end_sector = self.base_sector + (target / 512) as u32;
        let zero = [0u8; 512];
        while sector < end_sector {
            self.writer.write_sector(sector, &zero).map_err(to_io_err)?;
            sector += 1;
        }
        self.pos = target;
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fb_bpb::synth::{Fat16Params, format_fat16};

    #[test]
    fn synth_writes_through_the_cursor() {
        let mut disk = alloc::vec![0u8; 4096 * 512];
        {
            let mut writer: &mut [u8] = &mut disk;
            let mut cursor = SectorCursor::new(&mut writer, 63, 2048);
            format_fat16(
                &mut cursor,
                &Fat16Params {
                    total_sectors: 2048,
                    unit_size: 0,
                    align: false,
                    part_offset: 63,
                },
            )
            .unwrap();
        }
        // boot sector signature landed at the expected sector.
        let boot = &disk[63 * 512..64 * 512];
        assert_eq!(&boot[0x1FE..0x200], &[0x55, 0xAA]);
    }
}
