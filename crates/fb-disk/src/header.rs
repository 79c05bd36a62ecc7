//! The fb data header (spec §3): 16 bytes describing the boot blob, catalog, and the
//! primary/extended region sizes. Lives at sector `boot_base + 1` on a formatted disk, or
//! right after the archive magic at sector 0 of a `.fba`/`.save` file.

use fb_common::types::endian::{Endian, LittleEndian};
use fb_common::types::number::{U16, U32};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u16 {
        /// The FAT region was synthesized with `--align`.
        const ALIGNED = 0x01;
        /// Partition table copies carry CHS triples (`--chs`).
        const CHS = 0x02;
    }
}

unsafe impl bytemuck::Zeroable for HeaderFlags {}
unsafe impl bytemuck::Pod for HeaderFlags {}

/// The 16-byte header shared by both on-disk shapes (spec §3: "FB data header" /
/// "Archive header"). Field widths follow `struct fb_data` in `fbinst.c` exactly
/// (`flags`/`list_used`/`list_size`/`pri_size` are all 16-bit; only `ext_size` is 32-bit)
/// so a disk written by real fbinst parses identically here and vice versa.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct FbHeader {
    /// Sectors of boot blob immediately preceding this header.
    pub boot_size: U16<LittleEndian>,
    pub flags: HeaderFlags,
    pub ver_major: u8,
    pub ver_minor: u8,
    /// Nonzero once the catalog has been initialized by `format`/`create`.
    pub list_used: U16<LittleEndian>,
    /// Sectors reserved for the file catalog, starting right after this header's sector.
    pub list_size: U16<LittleEndian>,
    pub pri_size: U16<LittleEndian>,
    pub ext_size: U32<LittleEndian>,
}

unsafe impl bytemuck::Zeroable for FbHeader {}
unsafe impl bytemuck::Pod for FbHeader {}

static_assertions::assert_eq_size!(FbHeader, [u8; 16]);

/// Version this crate writes; bumped only on a breaking catalog/header layout change.
pub const FB_VER_MAJOR: u8 = 1;
pub const FB_VER_MINOR: u8 = 0;

/// Magic stamped at the start of an archive file in place of the MBR ladder (spec §3's
/// "Archive header"). Chosen to be self-consistent with `fb_part::FB_MAGIC_LONG` — the
/// upstream constant wasn't part of the retrieved source.
pub const FB_AR_MAGIC_LONG: u32 = 0x1EE7_FBA2;

impl FbHeader {
    /// `pri_size` is a 16-bit on-disk field (`MAX_PRI_SIZE` is `u16::MAX`); callers must
    /// have already clamped it before reaching here.
    pub fn new(pri_size: u32, ext_size: u32, list_size: u16, boot_size: u16) -> Self {
        Self {
            boot_size: U16::new(boot_size),
            flags: HeaderFlags::empty(),
            ver_major: FB_VER_MAJOR,
            ver_minor: FB_VER_MINOR,
            list_used: U16::new(1),
            list_size: U16::new(list_size),
            pri_size: U16::new(pri_size as u16),
            ext_size: U32::new(ext_size),
        }
    }

    pub fn from_bytes(bytes: &[u8; 16]) -> Self {
        *bytemuck::from_bytes(bytes)
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        *bytemuck::bytes_of(self).first_chunk::<16>().unwrap()
    }

    pub fn pri_size(&self) -> u32 {
        self.pri_size.get() as u32
    }

    pub fn ext_size(&self) -> u32 {
        self.ext_size.get()
    }

    pub fn total_size(&self) -> u32 {
        self.pri_size.get() as u32 + self.ext_size.get()
    }

    pub fn list_size(&self) -> u16 {
        self.list_size.get()
    }

    pub fn list_used(&self) -> u16 {
        self.list_used.get()
    }

    pub fn set_list_used(&mut self, list_used: u16) {
        self.list_used = U16::new(list_used);
    }

    /// First sector the catalog occupies, `boot_size` sectors after this header's own
    /// sector (the header's 16 bytes live in the first of those `boot_size` sectors; the
    /// rest, if any, hold additional boot code beyond the MBR ladder itself).
    pub fn list_start(&self, header_lba: u32) -> u32 {
        header_lba + self.boot_size.get() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let header = FbHeader::new(65535, 0, 63, 4);
        let bytes = header.to_bytes();
        let back = FbHeader::from_bytes(&bytes);
        assert_eq!(back.pri_size(), 65535);
        assert_eq!(back.list_size(), 63);
        assert_eq!(back.ver_major, FB_VER_MAJOR);
    }

    #[test]
    fn list_used_survives_values_above_u8_range() {
        let mut header = FbHeader::new(65535, 0, 900, 4);
        header.set_list_used(300);
        let bytes = header.to_bytes();
        let back = FbHeader::from_bytes(&bytes);
        assert_eq!(back.list_used(), 300);
    }
}
