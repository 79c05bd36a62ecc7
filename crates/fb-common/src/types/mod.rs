/// Runtime and type-level endianness
pub mod endian;
/// Endian-aware integer wrappers
pub mod number;
