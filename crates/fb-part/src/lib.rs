#![no_std]

#[cfg(feature = "std")]
extern crate std;

//! MBR partition tables and the fb "sector-shift ladder" used to make a single FAT image
//! bootable from any of its first `boot_base + 1` sectors.
//!
//! A plain MBR only works when it sits at LBA 0. The fb bootloader format instead keeps
//! `boot_base + 1` near-identical copies of the MBR sector, one per LBA from `0` to
//! `boot_base`, so that whichever sector the BIOS loads as "sector 0" still finds a
//! consistent partition table. Copy `i` differs from copy `0` only in:
//! - the `lba` field at offset `0x1ae`, set to `i`
//! - every partition's start CHS/LBA, shifted down by `i`
//!
//! See [`ladder`] for the sector generator and [`FbMbr`] for the sector layout.

pub mod ladder;

pub use ladder::{
    BOOT_SIGNATURE, DEF_BASE_SIZE, FB_MAGIC_LONG, FbMbr, LadderError, RestoreError, get_part_ofs, restore, sync_mbr,
};
