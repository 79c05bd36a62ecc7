//! Byte-identical FAT16/FAT32 BIOS Parameter Block synthesis.
//!
//! This crate builds the boot sector, reserved region, FAT tables and (for FAT16) the root
//! directory region exactly the way DOS/Windows `format` does, so a disk formatted by this
//! crate mounts identically on any OS. See [`synth`] for the entry points.
//!
//! ## Cargo Features
//!
//! - **alloc**: enables allocation of intermediate buffers
//! - **std**: required to actually write a filesystem out (needs `std::io::{Write, Seek}`)

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

// TODO: Add support for big endian, because we currently just reinterpret the bytes as little endian

#[cfg(not(target_endian = "little"))]
compile_error!("This crate only supports little endian systems");

pub mod structures;

#[cfg(feature = "std")]
pub mod synth;

#[cfg(feature = "std")]
pub use synth::{Fat16Params, Fat32Params, SynthError, format_fat16, format_fat32};

/// Which FAT variant a boot sector describes, per the Microsoft FAT specification's
/// cluster-count rule (not a stored field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}
