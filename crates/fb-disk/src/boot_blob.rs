//! Embedded MBR boot-sector payloads (spec §9 "Embedded boot blobs").
//!
//! The real `fb_mbr_rel`/`fb_mbr_dbg` byte arrays are compiled-in boot code the core
//! engine never interprets beyond the fields named in spec §3 — they're an external
//! collaborator's input, not something this crate computes. This module stands in for
//! that resource: [`RELEASE`] and [`DEBUG`] are structurally valid ladder-copy-0
//! templates (correct jump stub, `fb_magic`, `0xAA55` signature) carrying inert boot
//! code, so [`format`](crate::disk::Disk::format) has something byte-shaped to lay down
//! without this crate pretending to assemble real x86 bootstrap logic.

use fb_part::FB_MAGIC_LONG;

/// A boot blob ready to be stamped into the ladder: `mbr` is the 512-byte ladder-copy-0
/// template (jump stub, boot code, signature — partition table and `lba`/`boot_base`
/// fields are filled in by `format`), `tail` is additional boot code appended right
/// after the fb data header's own sector.
#[derive(Debug, Clone, Copy)]
pub struct BootBlob {
    pub mbr: [u8; 512],
    pub tail: &'static [u8],
}

/// Offset (into the logical, watermark-stripped boot-blob stream starting at the header
/// sector) of the one-byte "is this a debug build" flag `print_info` inspects.
pub const DEBUG_MARKER_OFFSET: usize = 0x1a8;

const fn base_template() -> [u8; 512] {
    let mut mbr = [0u8; 512];
    // `jmp short $+0x3e; nop` — a harmless two-byte short jump over the (empty) boot
    // code, the same shape a real boot sector's first three bytes take.
    mbr[0x000] = 0xEB;
    mbr[0x001] = 0x3E;
    mbr[0x002] = 0x90;
    let magic = FB_MAGIC_LONG.to_le_bytes();
    mbr[0x1b4] = magic[0];
    mbr[0x1b5] = magic[1];
    mbr[0x1b6] = magic[2];
    mbr[0x1b7] = magic[3];
    mbr[0x1fe] = 0x55;
    mbr[0x1ff] = 0xAA;
    mbr
}

/// The release boot blob: no extra boot code beyond the ladder template itself.
pub const RELEASE: BootBlob = BootBlob {
    mbr: base_template(),
    tail: &[],
};

/// The debug boot blob: carries one extra tail byte, the debug marker `print_info`
/// checks at [`DEBUG_MARKER_OFFSET`].
pub const DEBUG: BootBlob = BootBlob {
    mbr: base_template(),
    tail: &DEBUG_TAIL,
};

const DEBUG_TAIL: [u8; DEBUG_MARKER_OFFSET - 16 + 1] = {
    let mut tail = [0u8; DEBUG_MARKER_OFFSET - 16 + 1];
    tail[DEBUG_MARKER_OFFSET - 16] = 1;
    tail
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_and_debug_carry_valid_ladder_fields() {
        for blob in [RELEASE, DEBUG] {
            assert_eq!(&blob.mbr[0x1fe..0x200], &[0x55, 0xAA]);
            assert_eq!(
                u32::from_le_bytes(blob.mbr[0x1b4..0x1b8].try_into().unwrap()),
                FB_MAGIC_LONG
            );
        }
    }

    #[test]
    fn debug_blob_carries_the_marker_release_does_not() {
        assert_eq!(RELEASE.tail.len(), 0);
        assert_eq!(DEBUG.tail[DEBUG_MARKER_OFFSET - 16], 1);
    }
}
