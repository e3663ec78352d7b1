//! The Android boot image header and the Loki overlay that gets stamped
//! into it at offset 0x400.
//!
//! Both structures live inside the first page of the image. All multi-byte
//! fields are little-endian; every accessor here is a bounds-checked read
//! or write into an owned byte buffer, never a raw cast.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub const BOOT_MAGIC: [u8; 8] = *b"ANDROID!";
pub const BOOT_MAGIC_SIZE: usize = 8;
pub const BOOT_NAME_SIZE: usize = 16;
pub const BOOT_ARGS_SIZE: usize = 512;
/// Total serialized size of `BootImgHdr`.
pub const BOOT_HDR_SIZE: usize = 608;
/// Upper bound on any single size field in the header. Real kernels and
/// ramdisks top out at a few MiB; a larger value is a corrupt or hostile
/// header, and rejecting it at parse time keeps the alignment and layout
/// arithmetic in `u32` range.
pub const COMPONENT_MAX_SIZE: u32 = 64 * 1024 * 1024;

pub const LOKI_MAGIC: [u8; 4] = *b"LOKI";
/// Fixed byte offset of the Loki overlay inside the image.
pub const LOKI_HDR_OFFSET: usize = 0x400;
pub const LOKI_BUILD_SIZE: usize = 128;
/// Total serialized size of `LokiHdr`.
pub const LOKI_HDR_SIZE: usize = 148;

/// Which partition an image is meant for. Stored in the Loki header so the
/// flash path can refuse to put a recovery image on the boot partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Boot,
    Recovery,
}

impl ImageKind {
    pub fn as_flag(self) -> u32 {
        match self {
            ImageKind::Boot => 0,
            ImageKind::Recovery => 1,
        }
    }

    pub fn from_flag(flag: u32) -> Option<Self> {
        match flag {
            0 => Some(ImageKind::Boot),
            1 => Some(ImageKind::Recovery),
            _ => None,
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKind::Boot => f.write_str("boot"),
            ImageKind::Recovery => f.write_str("recovery"),
        }
    }
}

impl FromStr for ImageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "boot" => Ok(ImageKind::Boot),
            "recovery" => Ok(ImageKind::Recovery),
            other => Err(format!("partition must be \"boot\" or \"recovery\", got {other:?}")),
        }
    }
}

/// Round `size` up to the next page boundary. `page_mask` is `page_size - 1`.
///
/// `size` must come from a parsed header, where it is capped at
/// [`COMPONENT_MAX_SIZE`]; the sum cannot wrap under that cap.
pub fn page_align(size: u32, page_mask: u32) -> u32 {
    (size + page_mask) & !page_mask
}

fn u32_at(buf: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    u32::from_le_bytes(b)
}

fn put_u32(buf: &mut [u8], off: usize, val: u32) {
    buf[off..off + 4].copy_from_slice(&val.to_le_bytes());
}

/// Fixed-layout Android boot image header.
///
/// Size fields are byte counts; `*_addr` fields are absolute load addresses
/// in the device's physical address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootImgHdr {
    pub kernel_size: u32,
    pub kernel_addr: u32,
    pub ramdisk_size: u32,
    pub ramdisk_addr: u32,
    pub second_size: u32,
    pub second_addr: u32,
    pub tags_addr: u32,
    pub page_size: u32,
    pub dt_size: u32,
    pub unused: u32,
    pub name: [u8; BOOT_NAME_SIZE],
    pub cmdline: [u8; BOOT_ARGS_SIZE],
    pub id: [u32; 8],
}

impl BootImgHdr {
    /// Parse the header out of the start of an image buffer.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < BOOT_HDR_SIZE {
            return Err(Error::InvalidImage("image is smaller than the boot header"));
        }
        if buf[..BOOT_MAGIC_SIZE] != BOOT_MAGIC {
            return Err(Error::InvalidImage("missing ANDROID! magic"));
        }

        let page_size = u32_at(buf, 36);
        if page_size == 0 || !page_size.is_power_of_two() {
            return Err(Error::InvalidImage("page size is not a power of two"));
        }

        let kernel_size = u32_at(buf, 8);
        let ramdisk_size = u32_at(buf, 16);
        let second_size = u32_at(buf, 24);
        let dt_size = u32_at(buf, 40);
        if kernel_size > COMPONENT_MAX_SIZE
            || ramdisk_size > COMPONENT_MAX_SIZE
            || second_size > COMPONENT_MAX_SIZE
            || dt_size > COMPONENT_MAX_SIZE
        {
            return Err(Error::InvalidImage("size field exceeds the component limit"));
        }

        let mut name = [0u8; BOOT_NAME_SIZE];
        name.copy_from_slice(&buf[48..48 + BOOT_NAME_SIZE]);
        let mut cmdline = [0u8; BOOT_ARGS_SIZE];
        cmdline.copy_from_slice(&buf[64..64 + BOOT_ARGS_SIZE]);
        let mut id = [0u32; 8];
        for (i, word) in id.iter_mut().enumerate() {
            *word = u32_at(buf, 576 + i * 4);
        }

        Ok(BootImgHdr {
            kernel_size,
            kernel_addr: u32_at(buf, 12),
            ramdisk_size,
            ramdisk_addr: u32_at(buf, 20),
            second_size,
            second_addr: u32_at(buf, 28),
            tags_addr: u32_at(buf, 32),
            page_size,
            dt_size,
            unused: u32_at(buf, 44),
            name,
            cmdline,
            id,
        })
    }

    /// Serialize into the start of `buf`, which must hold at least
    /// `BOOT_HDR_SIZE` bytes.
    pub fn write_to(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < BOOT_HDR_SIZE {
            return Err(Error::InvalidImage("header destination is too small"));
        }
        buf[..BOOT_MAGIC_SIZE].copy_from_slice(&BOOT_MAGIC);
        put_u32(buf, 8, self.kernel_size);
        put_u32(buf, 12, self.kernel_addr);
        put_u32(buf, 16, self.ramdisk_size);
        put_u32(buf, 20, self.ramdisk_addr);
        put_u32(buf, 24, self.second_size);
        put_u32(buf, 28, self.second_addr);
        put_u32(buf, 32, self.tags_addr);
        put_u32(buf, 36, self.page_size);
        put_u32(buf, 40, self.dt_size);
        put_u32(buf, 44, self.unused);
        buf[48..48 + BOOT_NAME_SIZE].copy_from_slice(&self.name);
        buf[64..64 + BOOT_ARGS_SIZE].copy_from_slice(&self.cmdline);
        for (i, word) in self.id.iter().enumerate() {
            put_u32(buf, 576 + i * 4, *word);
        }
        Ok(())
    }
}

/// Loki overlay: marker plus scratch area preserving the pre-patch header
/// values that the shellcode needs at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LokiHdr {
    pub kind: ImageKind,
    pub build: [u8; LOKI_BUILD_SIZE],
    pub orig_kernel_size: u32,
    pub orig_ramdisk_size: u32,
    pub ramdisk_addr: u32,
}

impl LokiHdr {
    pub fn new(
        kind: ImageKind,
        build: &str,
        orig_kernel_size: u32,
        orig_ramdisk_size: u32,
        ramdisk_addr: u32,
    ) -> Self {
        let mut buf = [0u8; LOKI_BUILD_SIZE];
        // strncpy semantics: truncate, keep the trailing NUL
        let n = build.len().min(LOKI_BUILD_SIZE - 1);
        buf[..n].copy_from_slice(&build.as_bytes()[..n]);
        LokiHdr {
            kind,
            build: buf,
            orig_kernel_size,
            orig_ramdisk_size,
            ramdisk_addr,
        }
    }

    /// Parse the overlay from a full image buffer.
    pub fn parse(image: &[u8]) -> Result<Self> {
        let buf = image
            .get(LOKI_HDR_OFFSET..LOKI_HDR_OFFSET + LOKI_HDR_SIZE)
            .ok_or(Error::InvalidImage("image is too small to hold a Loki header"))?;
        if buf[..4] != LOKI_MAGIC {
            return Err(Error::InvalidImage("not a Loki image"));
        }
        let kind = ImageKind::from_flag(u32_at(buf, 4))
            .ok_or(Error::InvalidImage("unknown image-kind flag"))?;
        let mut build = [0u8; LOKI_BUILD_SIZE];
        build.copy_from_slice(&buf[8..8 + LOKI_BUILD_SIZE]);
        Ok(LokiHdr {
            kind,
            build,
            orig_kernel_size: u32_at(buf, 136),
            orig_ramdisk_size: u32_at(buf, 140),
            ramdisk_addr: u32_at(buf, 144),
        })
    }

    /// Serialize into a full image buffer at the fixed overlay offset.
    pub fn write_to(&self, image: &mut [u8]) -> Result<()> {
        let buf = image
            .get_mut(LOKI_HDR_OFFSET..LOKI_HDR_OFFSET + LOKI_HDR_SIZE)
            .ok_or(Error::InvalidImage("image is too small to hold a Loki header"))?;
        buf[..4].copy_from_slice(&LOKI_MAGIC);
        put_u32(buf, 4, self.kind.as_flag());
        buf[8..8 + LOKI_BUILD_SIZE].copy_from_slice(&self.build);
        put_u32(buf, 136, self.orig_kernel_size);
        put_u32(buf, 140, self.orig_ramdisk_size);
        put_u32(buf, 144, self.ramdisk_addr);
        Ok(())
    }
}

/// True if the Loki magic is already stamped into the image. Presence of
/// the magic means the image must not be transformed again.
pub fn has_loki_magic(image: &[u8]) -> bool {
    image
        .get(LOKI_HDR_OFFSET..LOKI_HDR_OFFSET + 4)
        .map(|m| m == LOKI_MAGIC)
        .unwrap_or(false)
}

/// How far `inspect` looks when deciding whether a partition is blank.
const BLANK_SCAN_LEN: usize = 0x1000;

/// What a partition's current contents look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStatus {
    /// Already carries the Loki magic; nothing to do.
    Patched,
    /// A plain Android boot image that can be patched.
    NeedsPatch,
    /// Entirely zeroed / uninitialized; skip it, this is not an error.
    Blank,
    /// Nonblank but neither magic matches; leave it alone.
    Unrecognized,
}

impl fmt::Display for PartitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PartitionStatus::Patched => "already a Loki image",
            PartitionStatus::NeedsPatch => "needs patching",
            PartitionStatus::Blank => "blank, skipping",
            PartitionStatus::Unrecognized => "not a recognized boot image",
        };
        f.write_str(s)
    }
}

/// Classify the head of a partition.
pub fn inspect(head: &[u8]) -> PartitionStatus {
    if has_loki_magic(head) {
        return PartitionStatus::Patched;
    }
    if head.len() >= BOOT_MAGIC_SIZE && head[..BOOT_MAGIC_SIZE] == BOOT_MAGIC {
        return PartitionStatus::NeedsPatch;
    }
    let scan = &head[..head.len().min(BLANK_SCAN_LEN)];
    if scan.iter().all(|&b| b == 0) {
        PartitionStatus::Blank
    } else {
        PartitionStatus::Unrecognized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hdr() -> BootImgHdr {
        BootImgHdr {
            kernel_size: 5_000_000,
            kernel_addr: 0x80208000,
            ramdisk_size: 200_000,
            ramdisk_addr: 0x82008000,
            second_size: 0,
            second_addr: 0x81100000,
            tags_addr: 0x80200100,
            page_size: 2048,
            dt_size: 0,
            unused: 0,
            name: [0; BOOT_NAME_SIZE],
            cmdline: [0; BOOT_ARGS_SIZE],
            id: [0; 8],
        }
    }

    #[test]
    fn header_roundtrip() {
        let hdr = sample_hdr();
        let mut buf = vec![0u8; 2048];
        hdr.write_to(&mut buf).unwrap();
        assert_eq!(BootImgHdr::parse(&buf).unwrap(), hdr);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let buf = vec![0u8; 2048];
        assert!(matches!(
            BootImgHdr::parse(&buf),
            Err(crate::Error::InvalidImage(_))
        ));
    }

    #[test]
    fn header_rejects_bad_page_size() {
        let hdr = sample_hdr();
        let mut buf = vec![0u8; 2048];
        hdr.write_to(&mut buf).unwrap();
        buf[36..40].copy_from_slice(&100u32.to_le_bytes());
        assert!(BootImgHdr::parse(&buf).is_err());
    }

    #[test]
    fn header_rejects_oversized_size_fields() {
        let mut buf = vec![0u8; 2048];
        sample_hdr().write_to(&mut buf).unwrap();
        // kernel_size that would wrap the page-align sum
        buf[8..12].copy_from_slice(&0xffff_f801u32.to_le_bytes());
        assert!(matches!(
            BootImgHdr::parse(&buf),
            Err(crate::Error::InvalidImage(_))
        ));

        let mut buf = vec![0u8; 2048];
        sample_hdr().write_to(&mut buf).unwrap();
        buf[40..44].copy_from_slice(&(COMPONENT_MAX_SIZE + 1).to_le_bytes());
        assert!(BootImgHdr::parse(&buf).is_err());
    }

    #[test]
    fn loki_hdr_roundtrip() {
        let loki = LokiHdr::new(ImageKind::Recovery, "JDQ39.I337UCUAMDB", 123, 456, 0x80a08000);
        let mut image = vec![0u8; 2048];
        loki.write_to(&mut image).unwrap();
        assert!(has_loki_magic(&image));
        let parsed = LokiHdr::parse(&image).unwrap();
        assert_eq!(parsed, loki);
        assert!(parsed.build.starts_with(b"JDQ39.I337UCUAMDB\0"));
    }

    #[test]
    fn build_string_is_truncated() {
        let long = "x".repeat(400);
        let loki = LokiHdr::new(ImageKind::Boot, &long, 0, 0, 0);
        assert_eq!(loki.build[LOKI_BUILD_SIZE - 1], 0);
        assert!(loki.build[..LOKI_BUILD_SIZE - 1].iter().all(|&b| b == b'x'));
    }

    #[test]
    fn page_align_rounds_up() {
        assert_eq!(page_align(0, 2047), 0);
        assert_eq!(page_align(1, 2047), 2048);
        assert_eq!(page_align(2048, 2047), 2048);
        assert_eq!(page_align(2049, 2047), 4096);
        assert_eq!(page_align(5_000_000, 2047), 5_001_216);
    }

    #[test]
    fn inspect_classifies_partitions() {
        let mut android = vec![0u8; 4096];
        android[..8].copy_from_slice(&BOOT_MAGIC);
        assert_eq!(inspect(&android), PartitionStatus::NeedsPatch);

        let mut loki = android.clone();
        loki[LOKI_HDR_OFFSET..LOKI_HDR_OFFSET + 4].copy_from_slice(&LOKI_MAGIC);
        assert_eq!(inspect(&loki), PartitionStatus::Patched);

        let blank = vec![0u8; 4096];
        assert_eq!(inspect(&blank), PartitionStatus::Blank);

        let mut junk = vec![0u8; 4096];
        junk[100] = 0xab;
        assert_eq!(inspect(&junk), PartitionStatus::Unrecognized);
    }
}
