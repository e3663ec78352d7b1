//! loki-patcher-rs: patch and flash Loki'd boot/recovery images for a
//! fixed catalog of locked Samsung and LG bootloaders.
//!
//! The pipeline: [`scanner`] fingerprints a dump of the device's aboot
//! and derives the absolute address of its signature-check routine;
//! [`target`] resolves that address to a cataloged device; [`patch`]
//! rebuilds the boot image around the [`shellcode`] payload; [`flash`]
//! re-validates a patched image against the live aboot right before it is
//! written to a partition. [`ops`] ties the pieces to files and block
//! devices; everything below it works on in-memory byte buffers.

pub mod bootimg;
pub mod error;
pub mod flash;
pub mod ops;
pub mod patch;
pub mod report;
pub mod scanner;
pub mod shellcode;
pub mod target;

pub use error::{Error, Result};
