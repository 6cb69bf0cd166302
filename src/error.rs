//! Error types.
//!
//! Every stage of a load fails fast and surfaces one of these variants verbatim to the
//! caller of [`crate::loader::Loader::load`].

use thiserror::Error;

/// Builds an [`Error::MalformedTable`] tagged with the source location that detected it.
macro_rules! malformed_error {
    ($msg:expr) => {
        crate::error::Error::MalformedTable {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::error::Error::MalformedTable {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

pub(crate) use malformed_error;

/// Errors produced while parsing or loading an image.
#[derive(Error, Debug)]
pub enum Error {
    /// The image is not a 32-bit PE, or the workspace is not a 32-bit address space.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The workspace could not satisfy a mapping request (overlap, misalignment, exhaustion).
    #[error("cannot map 0x{length:x} bytes at 0x{address:x}: {reason}")]
    MemoryMap {
        address: u64,
        length: u64,
        reason: String,
    },

    /// A read or write touched memory that is neither mapped nor file backed.
    #[error("invalid memory access: 0x{length:x} bytes at 0x{address:x}")]
    MemoryAccess { address: u64, length: u64 },

    /// A bounded scan found no terminator.
    #[error("no terminator within {limit} bytes")]
    DecodeTruncated { limit: usize },

    /// A directory or thunk table is inconsistent with its declared extent.
    #[error("malformed table - {file}:{line}: {message}")]
    MalformedTable {
        message: String,
        file: &'static str,
        line: u32,
    },

    /// A module's address range collides with an already registered module.
    #[error("module {name} at 0x{base:x} overlaps a registered module")]
    ModuleOverlap { name: String, base: u64 },

    /// The header parser rejected the file.
    #[error("{0}")]
    Object(#[from] object::read::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
