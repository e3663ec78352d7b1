//! Pre-flash validation.
//!
//! A patched image is only allowed onto a boot partition if the aboot
//! currently on the device still matches what the image was built for:
//! the relocated ramdisk address, mapped back through the base-address
//! table, has to land on one of the known signature sequences in a live
//! dump of aboot. Anything else gets rejected before a single byte is
//! written.

use std::io::Write;

use crate::bootimg::{BootImgHdr, ImageKind, LokiHdr};
use crate::error::{Error, Result};
use crate::scanner::{AbootFamily, SIGNATURES, SIG_LEN};

/// How much of the live aboot the validator examines.
pub const FLASH_ABOOT_WINDOW: usize = 0x40000;

/// The relocated address is probed at four 4-byte-aligned offsets within
/// a 16-byte window. The tolerance is empirical: alignment slop observed
/// across devices, kept as-is rather than re-derived.
pub const RELOC_SEARCH_WINDOW: usize = 0x10;
pub const RELOC_SEARCH_STEP: usize = 0x4;

/// Check a previously produced image against a live aboot dump.
pub fn validate(image: &[u8], aboot: &[u8], expected: ImageKind) -> Result<()> {
    let loki = LokiHdr::parse(image)?;
    if loki.kind != expected {
        return Err(Error::InvalidImage("image kind does not match requested partition"));
    }

    let hdr = BootImgHdr::parse(image)?;
    let addr = hdr.ramdisk_addr;
    let family = AbootFamily::from_address(addr);
    let base_off = addr
        .checked_sub(family.base())
        .ok_or(Error::AddressOutOfRange { address: addr })? as usize;

    let window = &aboot[..aboot.len().min(FLASH_ABOOT_WINDOW)];

    for step in (0..RELOC_SEARCH_WINDOW).step_by(RELOC_SEARCH_STEP) {
        let off = base_off + step;
        let code = window
            .get(off..off + SIG_LEN)
            .ok_or(Error::AddressOutOfRange { address: addr })?;
        if SIGNATURES.iter().any(|sig| code == sig.bytes) {
            tracing::debug!(off, step, "relocated address matches a known signature");
            return Ok(());
        }
    }

    Err(Error::InvalidImage("aboot version does not match device"))
}

/// Write the validated image to the destination. The write covers exactly
/// the image's size; a short or failed write is an error, never silently
/// treated as success.
pub fn write_image<W: Write>(image: &[u8], dest: &mut W, dest_path: &str) -> Result<()> {
    dest.write_all(image).map_err(|e| Error::WriteFailed {
        path: dest_path.to_owned(),
        source: e,
    })?;
    dest.flush().map_err(|e| Error::WriteFailed {
        path: dest_path.to_owned(),
        source: e,
    })
}
