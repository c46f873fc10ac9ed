use std::io;

use thiserror::Error;

/// Process-fatal input problems: the path itself or its leading magic.
#[derive(Error, Debug)]
pub enum InputError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("unrecognized input format (magic {0:02x?})")]
    UnknownMagic([u8; 4]),

    #[error("input file is too short to identify")]
    TooShort,
}

/// A lifting failure local to one method; the method is emitted as a
/// commented stub and the class continues.
#[derive(Error, Debug)]
#[error("can't lift {method} at code unit {offset:#x}: {reason}")]
pub struct LiftError {
    pub method: String,
    pub offset: usize,
    pub reason: String,
}

impl LiftError {
    pub fn new(method: impl Into<String>, offset: usize, reason: impl Into<String>) -> LiftError {
        LiftError {
            method: method.into(),
            offset,
            reason: reason.into(),
        }
    }
}

/// Failures local to one task or archive entry.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Dex(#[from] declass_dex::DexError),

    #[error(transparent)]
    Class(#[from] declass_jvm::ClassError),

    #[error(transparent)]
    Zip(#[from] declass_zip::ZipError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
