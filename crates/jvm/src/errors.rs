//! Errors returned by this crate.

use thiserror::Error;

/// Errors that may occur while parsing a `.class` file.
#[derive(Error, Debug)]
pub enum ClassError {
    #[error("not a class file (bad magic)")]
    InvalidMagic,

    #[error("unsupported class file version {0}")]
    Version(u16),

    #[error("got error while parsing {0}")]
    SectionError(&'static str),

    #[error("invalid constant pool entry: tag {tag} at index {index}")]
    BadConstant { tag: u8, index: u16 },

    #[error("constant pool index {0} out of range or of the wrong kind")]
    BadPoolIndex(u16),

    #[error("invalid modified UTF-8 in constant pool entry {0}")]
    BadUtf8(u16),

    #[error("unsupported or unknown bytecode {opcode:#04x} at offset {offset}")]
    UnsupportedOpcode { opcode: u8, offset: usize },

    #[error("truncated bytecode at offset {0}")]
    TruncatedCode(usize),
}
