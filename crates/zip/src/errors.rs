use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZipError {
    /// Basic sanity check
    #[error("provided file is not a zip archive")]
    InvalidHeader,

    /// Got error while decompressing entry
    #[error("got error while decompressing entry {0:?}")]
    DecompressionError(String),

    /// Got EOF while reading data
    #[error("got EOF while parsing zip")]
    EOF,

    /// Requested entry not present in the central directory
    #[error("entry not found in archive")]
    EntryNotFound,

    /// Can't operate without EOCD
    #[error("can't find EOCD in zip")]
    NotFoundEOCD,

    /// Compression method we don't handle (only stored and deflate)
    #[error("unsupported compression method {0}")]
    UnsupportedMethod(u16),

    /// Generic parsing error
    #[error("got error while parsing zip archive")]
    ParseError,
}
