use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can terminate a patch, flash, or check operation.
/// There is no retry logic anywhere; every variant is a terminal outcome
/// for the operation that produced it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to {op} {path}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("no known signature-check pattern found in aboot")]
    PatternNotFound,

    #[error("aboot matched a known pattern at {address:#010x}, but no catalog entry covers it")]
    UnsupportedTarget { address: u32 },

    #[error("invalid image: {0}")]
    InvalidImage(&'static str),

    #[error("relocated address {address:#010x} maps outside the aboot window")]
    AddressOutOfRange { address: u32 },

    #[error("short write to {path}")]
    WriteFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("shellcode template is corrupt: placeholder marker missing")]
    ShellcodeGeneration,

    #[error("malformed target catalog")]
    Catalog(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn io(op: &'static str, path: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            op,
            path: path.into(),
            source,
        }
    }
}
