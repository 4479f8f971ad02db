//! Byte-stream plumbing around the archive codec.
//!
//! The codec itself only needs [`std::io::Read`] and [`std::io::Write`]; this
//! module holds the adapters it is built on ([`PushbackReader`],
//! [`CountingWriter`]) and the sources the command line tool can stream from.

mod counting;
mod http;
mod pushback;

pub use counting::CountingWriter;
pub use http::HttpSource;
pub use pushback::PushbackReader;

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// An opened archive source.
pub struct Source {
    pub reader: Box<dyn Read>,
    /// Network byte counter, present for HTTP sources.
    pub transferred_bytes: Option<Arc<AtomicU64>>,
}

/// Check if the location is an HTTP(S) URL.
pub fn is_http_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Open a local path, `-` (stdin) or an HTTP(S) URL as a forward-only source.
pub fn open_source(location: &str) -> Result<Source> {
    if is_http_url(location) {
        let source = HttpSource::open(location)?;
        let transferred_bytes = Some(source.transferred_bytes());
        return Ok(Source {
            reader: Box::new(source),
            transferred_bytes,
        });
    }

    let reader: Box<dyn Read> = if location == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(Path::new(location))
            .with_context(|| format!("cannot open {}", location))?;
        Box::new(BufReader::new(file))
    };

    Ok(Source {
        reader,
        transferred_bytes: None,
    })
}
