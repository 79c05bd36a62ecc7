//! The error kinds from spec §7, as a single `thiserror` enum shared by every command.

use crate::ReadWriteError;

#[derive(Debug, thiserror::Error)]
pub enum FbError {
    #[error("invalid argument: {0}")]
    InvalidArgument(alloc::string::String),
    #[error("disk too small: need at least {needed} sectors, have {have}")]
    DiskTooSmall { needed: u32, have: u32 },
    #[error("no space left for {size} bytes")]
    NoSpace { size: u32 },
    #[error("file not found: {0}")]
    NotFound(alloc::string::String),
    #[error("not a valid fb archive")]
    InvalidArchive,
    #[error("archive version mismatch: expected {expected}.{expected_minor}, found {found}.{found_minor}")]
    VersionMismatch {
        expected: u8,
        expected_minor: u8,
        found: u8,
        found_minor: u8,
    },
    #[error("invalid menu script: {0}")]
    InvalidMenu(alloc::string::String),
    #[error("invalid unit size for the requested partition size")]
    InvalidUnitSize,
    #[error("not an fb disk: {0}")]
    InvalidMbr(&'static str),
    #[error(transparent)]
    Bpb(#[from] fb_bpb::synth::SynthError),
    #[error(transparent)]
    Ladder(#[from] fb_part::LadderError),
    #[error("io error: {0}")]
    Io(#[from] ReadWriteError),
    #[error("could not lock device")]
    LockFailure,
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid syslinux boot record: {0}")]
    SyslinuxInvalid(&'static str),
    #[error("record for {0:?} would exceed the maximum record or catalog size")]
    ItemTooLong(alloc::string::String),
}
