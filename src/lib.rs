//! # zipstream
//!
//! Forward-only ZIP archive reading and writing.
//!
//! This library reads ZIP archives entry by entry from any [`std::io::Read`]
//! source and writes them to any [`std::io::Write`] sink without seeking.
//! Data is compressed with raw DEFLATE or stored as is, and every entry is
//! checked against its CRC-32 and sizes as it is read.
//!
//! ## Features
//!
//! - Read archives from files, pipes or HTTP responses as they arrive
//! - Entries with deferred sizes (data descriptors), signed or not
//! - STORED and DEFLATE compression methods
//! - Write archives with a complete central directory
//!
//! ## Example
//!
//! ```no_run
//! use std::fs::File;
//! use zipstream::{ZipEntry, ZipReader, ZipWriter};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut writer = ZipWriter::new(File::create("hello.zip")?);
//!     writer.put_next_entry(ZipEntry::new("hello.txt"))?;
//!     writer.write_data(b"Hello, World!")?;
//!     writer.close()?;
//!
//!     let mut reader = ZipReader::new(File::open("hello.zip")?);
//!     while let Some(entry) = reader.next_entry()? {
//!         let data = reader.read_all()?;
//!         println!("{}: {} bytes", entry.name, data.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use io::{open_source, Source};
pub use zip::{CompressionMethod, ZipEntry, ZipError, ZipReader, ZipWriter};
