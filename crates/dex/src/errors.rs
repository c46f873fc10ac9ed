//! Errors returned by this crate.

use thiserror::Error;

/// Errors that may occur while parsing a DEX file or its code items.
#[derive(Error, Debug)]
pub enum DexError {
    #[error("unexpected end of data at offset {0:#x}")]
    Truncated(usize),

    #[error("bad encoding at offset {offset:#x}: {reason}")]
    BadEncoding { offset: usize, reason: &'static str },

    #[error("invalid header")]
    InvalidHeader,

    #[error("big-endian dex files are not supported")]
    BigEndian,

    #[error("section {name} lies outside the file (offset {offset:#x}, {count} entries)")]
    SectionBounds {
        name: &'static str,
        offset: u32,
        count: u32,
    },

    #[error("got error while parsing {0}")]
    SectionError(&'static str),

    #[error("index {index} out of range for {pool} pool")]
    BadIndex { pool: &'static str, index: u32 },

    #[error("unknown opcode {opcode:#06x} at code unit {offset:#x}")]
    UnknownOpcode { opcode: u16, offset: usize },

    #[error("truncated instruction stream at code unit {offset:#x}")]
    TruncatedCode { offset: usize },

    #[error("invalid switch or array payload at code unit {offset:#x}")]
    BadPayload { offset: usize },

    #[error("malformed operand at code unit {offset:#x}")]
    BadOperand { offset: usize },
}
