//! Fingerprinting the aboot dump.
//!
//! Each supported platform family loads aboot at a different base, and the
//! signature-check routine opens with a distinctive 8-byte instruction
//! sequence. Finding one of those sequences in a dump pins down both the
//! family and the absolute address of the routine, which is then resolved
//! against the target catalog.

use memchr::memmem;

use crate::error::{Error, Result};

// The three known aboot load bases. Kept as plain constants so the range
// table reads the same as the catalog addresses.
pub const BASE_SAMSUNG: u32 = 0x88dfffd8;
pub const BASE_LG: u32 = 0x88efffd8;
pub const BASE_G2: u32 = 0x0f7fffd8;

/// How much of the dump is worth scanning. The check routine always sits
/// in the first megabyte.
pub const ABOOT_SCAN_LIMIT: usize = 0x100000;
/// Matches this close to the scan limit are ignored.
const SCAN_TAIL_GUARD: usize = 0x1000;

pub const SIG_LEN: usize = 8;

/// Load-base family a signature implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbootFamily {
    Samsung,
    Lg,
    LgG2,
}

impl AbootFamily {
    pub fn base(self) -> u32 {
        match self {
            AbootFamily::Samsung => BASE_SAMSUNG,
            AbootFamily::Lg => BASE_LG,
            AbootFamily::LgG2 => BASE_G2,
        }
    }

    /// Decide which family an absolute address belongs to. Ordered range
    /// table: the first entry whose upper bound exceeds the address wins.
    pub fn from_address(addr: u32) -> AbootFamily {
        const RANGES: &[(u32, AbootFamily)] = &[
            (BASE_SAMSUNG, AbootFamily::LgG2),
            (BASE_LG, AbootFamily::Samsung),
            (u32::MAX, AbootFamily::Lg),
        ];
        for &(upper, family) in RANGES {
            if addr < upper {
                return family;
            }
        }
        AbootFamily::Lg
    }
}

/// One known opening sequence of the signature-check routine.
pub struct Signature {
    pub bytes: [u8; SIG_LEN],
    pub family: AbootFamily,
}

/// Signatures in scan-priority order. They are mutually exclusive per
/// binary; order only breaks ties at identical offsets.
pub const SIGNATURES: [Signature; 5] = [
    Signature { bytes: [0xf0, 0xb5, 0x8f, 0xb0, 0x06, 0x46, 0xf0, 0xf7], family: AbootFamily::Samsung },
    Signature { bytes: [0xf0, 0xb5, 0x8f, 0xb0, 0x07, 0x46, 0xf0, 0xf7], family: AbootFamily::Samsung },
    Signature { bytes: [0x2d, 0xe9, 0xf0, 0x41, 0x86, 0xb0, 0xf1, 0xf7], family: AbootFamily::Samsung },
    Signature { bytes: [0x2d, 0xe9, 0xf0, 0x4f, 0xad, 0xf5, 0xc6, 0x6d], family: AbootFamily::Lg },
    Signature { bytes: [0x2d, 0xe9, 0xf0, 0x4f, 0xad, 0xf5, 0x21, 0x7d], family: AbootFamily::LgG2 },
];

/// A successful scan: where the signature sat in the dump and what
/// absolute address that implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanHit {
    pub offset: usize,
    pub address: u32,
    pub family: AbootFamily,
}

/// Find the signature-check routine in an aboot dump.
///
/// Slides over at most the first `ABOOT_SCAN_LIMIT - SCAN_TAIL_GUARD`
/// bytes; the earliest match wins. Deterministic for a given dump.
pub fn scan(aboot: &[u8]) -> Result<ScanHit> {
    let end = aboot.len().min(ABOOT_SCAN_LIMIT - SCAN_TAIL_GUARD);
    let window = &aboot[..end];

    let mut best: Option<(usize, &Signature)> = None;
    for sig in &SIGNATURES {
        if let Some(pos) = memmem::find(window, &sig.bytes) {
            match best {
                Some((bpos, _)) if bpos <= pos => {}
                _ => best = Some((pos, sig)),
            }
        }
    }

    let (offset, sig) = best.ok_or(Error::PatternNotFound)?;
    let address = sig.family.base() + offset as u32;
    tracing::debug!(offset, address, family = ?sig.family, "matched aboot signature");
    Ok(ScanHit {
        offset,
        address,
        family: sig.family,
    })
}
