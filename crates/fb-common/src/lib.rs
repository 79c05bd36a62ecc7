/// Partition table and geometry primitives (MBR, CHS)
pub mod part;
/// Endian-aware number wrappers
pub mod types;
