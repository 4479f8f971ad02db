//! Error type shared by the archive reader, writer and codec adapter.

use std::io;
use thiserror::Error;

/// Result alias used throughout the [`zip`](super) module.
pub type Result<T> = std::result::Result<T, ZipError>;

/// Errors produced while reading or writing a ZIP stream.
///
/// Reaching the end of an archive is not an error: [`ZipReader::next_entry`]
/// returns `Ok(None)` for that. Every variant here is fatal for the operation
/// that produced it and nothing is retried internally.
///
/// [`ZipReader::next_entry`]: super::ZipReader::next_entry
#[derive(Debug, Error)]
pub enum ZipError {
    /// The reader or writer has already been closed.
    #[error("stream closed")]
    StreamClosed,

    /// The call is not valid in the current entry state.
    #[error("invalid entry state: {0}")]
    InvalidEntryState(&'static str),

    /// Malformed or truncated archive data.
    #[error("corrupt archive: {0}")]
    CorruptArchive(&'static str),

    /// Compression method other than STORED (0) or DEFLATED (8).
    #[error("unsupported compression method: {0}")]
    UnsupportedMethod(u16),

    /// The DEFLATE engine reported a failure.
    #[error("compression engine error: {0}")]
    CompressionEngine(String),

    /// CRC-32 of the entry data does not match the recorded value.
    #[error("CRC mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    CrcMismatch { expected: u32, computed: u32 },

    /// Byte count of the entry data does not match the recorded value.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Compression level outside `-1..=9`.
    #[error("invalid compression level: {0}")]
    InvalidLevel(i32),

    /// A field would overflow its 16- or 32-bit slot (ZIP64 is not supported).
    #[error("data too large for zip32: {0}")]
    DataTooLarge(&'static str),

    /// I/O error from the underlying source or sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ZipError {
    /// Map a read failure inside a fixed-size record to [`ZipError::CorruptArchive`]
    /// when it was caused by the stream ending early.
    pub(crate) fn truncated(what: &'static str) -> impl FnOnce(io::Error) -> ZipError {
        move |err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                ZipError::CorruptArchive(what)
            } else {
                ZipError::Io(err)
            }
        }
    }
}

impl From<ZipError> for io::Error {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(err) => err,
            ZipError::CorruptArchive(_)
            | ZipError::CrcMismatch { .. }
            | ZipError::SizeMismatch { .. } => io::Error::new(io::ErrorKind::InvalidData, err),
            other => io::Error::other(other),
        }
    }
}
