//! The three operations a caller drives: patch a partition's image into
//! an artifact, validate and flash an artifact to a partition, and check
//! what a partition currently holds. Plus the `auto` driver that chains
//! them for both boot and recovery.
//!
//! Everything here is synchronous and runs to completion or fails; the
//! caller is responsible for making sure only one operation is in flight
//! per partition.

use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::path::Path;

use crate::bootimg::{self, ImageKind, PartitionStatus};
use crate::error::{Error, Result};
use crate::flash;
use crate::patch;
use crate::report::Reporter;
use crate::scanner;
use crate::target::TargetCatalog;

/// Largest boot/recovery image we will read off a partition.
const MAX_IMAGE_SIZE: usize = 0x1800000 + 0x2000;

/// How much of a partition `check_partition` reads.
const CHECK_HEAD_SIZE: usize = 0x2000;

/// Read at most `limit` bytes from the start of a file or block device.
fn read_head(path: &Path, limit: usize) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| Error::io("open", path.display().to_string(), e))?;
    let mut buf = Vec::with_capacity(limit.min(0x10000));
    file.take(limit as u64)
        .read_to_end(&mut buf)
        .map_err(|e| Error::io("read", path.display().to_string(), e))?;
    Ok(buf)
}

/// Patch the image at `source` for the device whose aboot lives at
/// `aboot`, writing the result to `artifact`.
pub fn patch_partition(
    source: &Path,
    aboot: &Path,
    artifact: &Path,
    kind: ImageKind,
    catalog: &TargetCatalog,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    let dump = read_head(aboot, scanner::ABOOT_SCAN_LIMIT)?;
    let hit = scanner::scan(&dump)?;
    let target = catalog
        .lookup(hit.address)
        .ok_or(Error::UnsupportedTarget {
            address: hit.address,
        })?;
    reporter.status(&format!(
        "[+] Detected target {} {} build {}",
        target.vendor, target.device, target.build
    ));

    let image = read_head(source, MAX_IMAGE_SIZE)?;
    let out = patch::transform(&image, kind, target, hit.family, &dump, reporter)?;

    fs::write(artifact, &out)
        .map_err(|e| Error::io("write", artifact.display().to_string(), e))?;
    reporter.status(&format!(
        "[+] Wrote patched {} image to {}",
        kind,
        artifact.display()
    ));
    Ok(())
}

/// Validate the artifact against the device's current aboot and, only if
/// every check passes, write it to `dest`.
pub fn flash_partition(
    artifact: &Path,
    aboot: &Path,
    dest: &Path,
    kind: ImageKind,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    let image = read_head(artifact, MAX_IMAGE_SIZE)?;
    let dump = read_head(aboot, flash::FLASH_ABOOT_WINDOW)?;

    flash::validate(&image, &dump, kind)?;
    reporter.status("[+] Loki validation passed, flashing image.");

    let mut out = OpenOptions::new()
        .write(true)
        .open(dest)
        .map_err(|e| Error::io("open", dest.display().to_string(), e))?;
    flash::write_image(&image, &mut out, &dest.display().to_string())?;

    reporter.status(&format!(
        "[+] Loki flashing complete, wrote {} bytes to {}.",
        image.len(),
        dest.display()
    ));
    Ok(())
}

/// Report what the partition currently holds.
pub fn check_partition(partition: &Path) -> Result<PartitionStatus> {
    let head = read_head(partition, CHECK_HEAD_SIZE)?;
    Ok(bootimg::inspect(&head))
}

/// Patch and flash whichever of the two partitions needs it.
pub fn auto(
    boot: &Path,
    recovery: &Path,
    aboot: &Path,
    artifact: &Path,
    catalog: &TargetCatalog,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    let partitions = [(ImageKind::Boot, boot), (ImageKind::Recovery, recovery)];
    for (kind, path) in partitions {
        let status = check_partition(path)?;
        reporter.status(&format!("[+] {}: {}", path.display(), status));
        if status == PartitionStatus::NeedsPatch {
            patch_partition(path, aboot, artifact, kind, catalog, reporter)?;
            flash_partition(artifact, aboot, path, kind, reporter)?;
        }
    }
    Ok(())
}
