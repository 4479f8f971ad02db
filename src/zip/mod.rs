//! Streaming ZIP reading and writing.
//!
//! Both directions work on plain byte streams and never seek, so archives
//! can be produced into a pipe and consumed straight off a socket.
//!
//! ## Architecture
//!
//! - [`structures`]: on-disk records (local headers, data descriptors,
//!   central directory, end record) and the [`ZipEntry`] metadata type
//! - [`codec`]: raw DEFLATE engine adapter over `flate2`
//! - [`reader`]: [`ZipReader`], which walks local headers front to back
//! - [`writer`]: [`ZipWriter`], which appends entries and emits the central
//!   directory when finished
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. A local file header and the data for each entry, optionally followed
//!    by a data descriptor
//! 2. Central Directory with metadata for all entries
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The reader stops at the first record that is not a local file header and
//! never looks at the central directory. The writer always produces one.
//!
//! ## Supported Features
//!
//! - STORED (no compression) method
//! - DEFLATE compression method, levels 0 to 9
//! - Data descriptors, with or without their signature on read
//! - UTF-8 entry names (general purpose flag bit 11)
//!
//! ## Limitations
//!
//! - No ZIP64: entries and archives are limited to 4 GiB and 65535 entries
//! - No encryption support
//! - No multi-disk archive support

mod codec;
mod error;
mod reader;
mod structures;
mod writer;

pub use codec::{compression_level, CodecStep, Decoder, Encoder, FlushMode};
pub use error::{Result, ZipError};
pub use reader::ZipReader;
pub use structures::*;
pub use writer::ZipWriter;
