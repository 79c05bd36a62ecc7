//! [`Reader`]/[`Writer`] over a real file or block device (spec §4.1's default backend).

extern crate std;

use fb_io::{Read, Seek, SeekFrom, Write};
use std::fs::File;

use crate::{Reader, ReadWriteError, Writer};

/// Wraps an open [`File`] (an image file or a raw block device) as a [`Reader`]/[`Writer`].
pub struct FileBackend {
    file: File,
    size_in_sectors: u32,
}

impl FileBackend {
    /// Wraps `file`, caching its current length in sectors. Callers that grow the file
    /// (e.g. `format` on a sparse image) should call [`FileBackend::refresh_len`]
    /// afterwards.
    pub fn new(file: File) -> std::io::Result<Self> {
        let size_in_sectors = (file.metadata()?.len() / crate::SECTOR_SIZE as u64) as u32;
        Ok(Self { file, size_in_sectors })
    }

    pub fn refresh_len(&mut self) -> std::io::Result<()> {
        self.size_in_sectors = (self.file.metadata()?.len() / crate::SECTOR_SIZE as u64) as u32;
        Ok(())
    }

    pub fn into_inner(self) -> File {
        self.file
    }
}

fn map_io_err(_: std::io::Error) -> ReadWriteError {
    ReadWriteError::InvalidSector
}

impl Reader for FileBackend {
    fn read_sector(&mut self, sector: u32, buffer: &mut [u8; 512]) -> Result<(), ReadWriteError> {
        self.file
            .seek(SeekFrom::Start(sector as u64 * 512))
            .map_err(map_io_err)?;
        self.file.read_exact(buffer).map_err(map_io_err)
    }
}

impl Writer for FileBackend {
    fn write_sector(&mut self, sector: u32, buffer: &[u8; 512]) -> Result<(), ReadWriteError> {
        self.file
            .seek(SeekFrom::Start(sector as u64 * 512))
            .map_err(map_io_err)?;
        self.file.write_all(buffer).map_err(map_io_err)?;
        if sector + 1 > self.size_in_sectors {
            self.size_in_sectors = sector + 1;
        }
        Ok(())
    }

    fn size_in_sectors(&self) -> u32 {
        self.size_in_sectors
    }

    fn lock(&mut self) -> Result<(), ReadWriteError> {
        Ok(())
    }

    fn set_len_sectors(&mut self, sectors: u32) -> Result<(), ReadWriteError> {
        self.file
            .set_len(sectors as u64 * 512)
            .map_err(map_io_err)?;
        self.size_in_sectors = sectors;
        Ok(())
    }
}
