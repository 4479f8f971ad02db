//! Streaming archive reader.
//!
//! Entries are read front to back from any [`Read`] source by walking the
//! local file headers; the central directory is never consulted, so the
//! source does not need to be seekable or even have a known length.
//!
//! ## Read-ahead and pushback
//!
//! DEFLATE data is fed to the decoder from a fixed-size read-ahead buffer that
//! is refilled in whole chunks. When the decoder reports the end of the
//! stream, whatever is left in that chunk belongs to the data descriptor or
//! the next local header. Those bytes are handed back to the
//! [`PushbackReader`] wrapping the source, and every later read (header
//! fields included) drains the pushback queue first.

use crc32fast::Hasher;
use std::io::{self, Read};

use crate::io::PushbackReader;

use super::codec::Decoder;
use super::error::{Result, ZipError};
use super::structures::*;

/// Size of the DEFLATE read-ahead buffer.
const READ_AHEAD_SIZE: usize = 4096;

/// Scratch buffer used to skip unread entry data.
const SKIP_BUFFER_SIZE: usize = 4096;

/// Upper bound on the window examined per call while scanning a STORED entry
/// for its data descriptor.
const SCAN_CHUNK: usize = 8192;

/// How the data of the current entry is being delivered.
enum EntryData {
    /// Length known from the local header.
    Stored { remaining: u64 },
    /// Length deferred to a data descriptor that has to be found by scanning.
    StoredDeferred { delivered: u64 },
    Deflated {
        decoder: Decoder,
        read_ahead: Box<[u8]>,
        pos: usize,
        len: usize,
    },
    /// Data ended; the decoder (if any) has been released.
    Done,
}

/// Per-entry read state; exists from `next_entry` until the next entry.
struct OpenEntry {
    entry: ZipEntry,
    deferred: bool,
    data: EntryData,
    hasher: Hasher,
    bytes_out: u64,
    eof: bool,
}

impl OpenEntry {
    fn read<R: Read>(&mut self, source: &mut PushbackReader<R>, buf: &mut [u8]) -> Result<usize> {
        if self.eof || buf.is_empty() {
            return Ok(0);
        }

        let (n, data_end) = match &mut self.data {
            EntryData::Stored { remaining } => {
                if *remaining == 0 {
                    (0, true)
                } else {
                    let want = (*remaining).min(buf.len() as u64) as usize;
                    let n = read_retrying(source, &mut buf[..want])?;
                    if n == 0 {
                        return Err(ZipError::CorruptArchive("truncated stored entry data"));
                    }
                    *remaining -= n as u64;
                    (n, *remaining == 0)
                }
            }
            EntryData::StoredDeferred { delivered } => {
                let (n, end) = scan_stored(source, *delivered, &self.hasher, buf)?;
                *delivered += n as u64;
                (n, end)
            }
            EntryData::Deflated {
                decoder,
                read_ahead,
                pos,
                len,
            } => inflate(source, decoder, read_ahead, pos, len, buf)?,
            EntryData::Done => (0, true),
        };

        self.hasher.update(&buf[..n]);
        self.bytes_out += n as u64;

        if data_end {
            self.finish(source)?;
        }
        Ok(n)
    }

    /// Release the decoder, pick up a deferred descriptor and check the data
    /// against the recorded CRC and size.
    fn finish<R: Read>(&mut self, source: &mut PushbackReader<R>) -> Result<()> {
        self.eof = true;
        self.data = EntryData::Done;

        if self.deferred {
            let descriptor = DataDescriptor::read_from(source)?;
            self.entry.crc = Some(descriptor.crc32);
            self.entry.compressed_size = Some(u64::from(descriptor.compressed_size));
            self.entry.size = Some(u64::from(descriptor.uncompressed_size));
        }

        if let Some(expected) = self.entry.size
            && expected != self.bytes_out
        {
            return Err(ZipError::SizeMismatch {
                expected,
                actual: self.bytes_out,
            });
        }
        let computed = self.hasher.clone().finalize();
        if let Some(expected) = self.entry.crc
            && expected != computed
        {
            return Err(ZipError::CrcMismatch { expected, computed });
        }

        log::debug!(
            "entry {} done: {} bytes, crc {:#010x}",
            self.entry.name,
            self.bytes_out,
            computed
        );
        Ok(())
    }
}

/// Decode into `buf`, refilling the read-ahead buffer as needed.
///
/// Returns the bytes produced and whether the DEFLATE stream has ended.
fn inflate<R: Read>(
    source: &mut PushbackReader<R>,
    decoder: &mut Decoder,
    read_ahead: &mut [u8],
    pos: &mut usize,
    len: &mut usize,
    buf: &mut [u8],
) -> Result<(usize, bool)> {
    loop {
        let step = decoder.decode(&read_ahead[*pos..*len], buf)?;
        *pos += step.consumed;

        if step.stream_end {
            // Whatever follows the stream is not ours.
            source.unread(&read_ahead[*pos..*len]);
            *pos = *len;
            return Ok((step.produced, true));
        }
        if step.produced > 0 {
            return Ok((step.produced, false));
        }
        if step.consumed > 0 && *pos < *len {
            continue;
        }

        read_ahead.copy_within(*pos..*len, 0);
        *len -= *pos;
        *pos = 0;
        if *len == read_ahead.len() {
            return Err(ZipError::CorruptArchive("deflate stream made no progress"));
        }

        let n = read_retrying(source, &mut read_ahead[*len..])?;
        if n == 0 {
            return Err(ZipError::CorruptArchive("truncated deflate stream"));
        }
        log::trace!("read-ahead refill: {} bytes", n);
        *len += n;
    }
}

/// Deliver STORED data of unknown length, stopping in front of the data
/// descriptor.
///
/// A candidate descriptor is accepted only when it carries the signature, both
/// sizes equal the bytes delivered so far and its CRC matches the running CRC.
/// Descriptors without a signature cannot be located this way.
fn scan_stored<R: Read>(
    source: &mut PushbackReader<R>,
    delivered: u64,
    hasher: &Hasher,
    buf: &mut [u8],
) -> Result<(usize, bool)> {
    let limit = buf.len().min(SCAN_CHUNK);
    let window = source.peek(limit + DATA_DESCRIPTOR_SIZE - 1)?;
    if window.is_empty() {
        return Err(ZipError::CorruptArchive(
            "stored entry ended without a data descriptor",
        ));
    }

    let limit = limit.min(window.len());
    let signature = DATA_DESCRIPTOR_SIGNATURE.to_le_bytes();
    let found = (0..limit).find(|&i| {
        if !window[i..].starts_with(&signature) {
            return false;
        }
        let Some(descriptor) = DataDescriptor::from_signed_bytes(&window[i..]) else {
            return false;
        };
        let size = delivered + i as u64;
        if u64::from(descriptor.compressed_size) != size
            || u64::from(descriptor.uncompressed_size) != size
        {
            return false;
        }
        let mut crc = hasher.clone();
        crc.update(&window[..i]);
        crc.finalize() == descriptor.crc32
    });

    let n = found.unwrap_or(limit);
    buf[..n].copy_from_slice(&window[..n]);
    source.consume(n);
    Ok((n, found.is_some()))
}

/// A single `read`, repeated while it reports `Interrupted`.
fn read_retrying<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match source.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}

/// Read exactly four signature bytes, or `None` if the source ends first.
fn read_signature<R: Read>(source: &mut R) -> io::Result<Option<u32>> {
    let mut sig = [0u8; 4];
    let mut filled = 0;
    while filled < sig.len() {
        match source.read(&mut sig[filled..]) {
            Ok(0) => return Ok(None),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(Some(u32::from_le_bytes(sig)))
}

/// Pull-based reader over a ZIP byte stream.
///
/// ## Usage
///
/// ```ignore
/// let mut reader = ZipReader::new(file);
/// while let Some(entry) = reader.next_entry()? {
///     let data = reader.read_all()?;
///     println!("{}: {} bytes", entry.name, data.len());
/// }
/// reader.close();
/// ```
///
/// Only one entry is open at a time. Moving to the next entry skips whatever
/// the caller left unread, so the source always lands on the next header.
pub struct ZipReader<R: Read> {
    /// `None` once the reader has been closed
    source: Option<PushbackReader<R>>,
    current: Option<OpenEntry>,
    /// A non-header signature has been seen
    exhausted: bool,
}

impl<R: Read> ZipReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source: Some(PushbackReader::new(source)),
            current: None,
            exhausted: false,
        }
    }

    /// Advance to the next entry and return its metadata.
    ///
    /// Any open entry is closed first. Returns `Ok(None)` at the end of the
    /// archive: when the source ends or the next four bytes are not a local
    /// file header signature (typically the start of the central directory).
    ///
    /// # Errors
    ///
    /// [`ZipError::CorruptArchive`] for a truncated header and
    /// [`ZipError::UnsupportedMethod`] for methods other than STORED/DEFLATED.
    pub fn next_entry(&mut self) -> Result<Option<ZipEntry>> {
        self.close_entry()?;
        self.current = None;
        if self.exhausted {
            return Ok(None);
        }

        let source = self.source.as_mut().ok_or(ZipError::StreamClosed)?;
        match read_signature(source)? {
            Some(LFH_SIGNATURE) => {}
            other => {
                log::debug!("end of archive (next signature: {:x?})", other);
                self.exhausted = true;
                return Ok(None);
            }
        }

        let header = LocalFileHeader::read_from(source)?;
        let deferred = header.has_data_descriptor();
        let method = CompressionMethod::from_u16(header.compression_method);

        let data = match method {
            CompressionMethod::Stored if deferred => EntryData::StoredDeferred { delivered: 0 },
            CompressionMethod::Stored => {
                if header.compressed_size != header.uncompressed_size {
                    return Err(ZipError::CorruptArchive(
                        "stored entry with differing sizes",
                    ));
                }
                EntryData::Stored {
                    remaining: u64::from(header.compressed_size),
                }
            }
            CompressionMethod::Deflated => EntryData::Deflated {
                decoder: Decoder::new(),
                read_ahead: vec![0u8; READ_AHEAD_SIZE].into_boxed_slice(),
                pos: 0,
                len: 0,
            },
            CompressionMethod::Unknown(v) => return Err(ZipError::UnsupportedMethod(v)),
        };

        // Use lossy conversion to handle non-UTF8 filenames gracefully
        let name = String::from_utf8_lossy(&header.file_name).into_owned();
        let known = |value: u32| (!deferred).then_some(value);
        let entry = ZipEntry {
            name,
            size: known(header.uncompressed_size).map(u64::from),
            compressed_size: known(header.compressed_size).map(u64::from),
            crc: known(header.crc32),
            method: Some(method),
            time: Some((u32::from(header.last_mod_date) << 16) | u32::from(header.last_mod_time)),
            comment: None,
            extra: (!header.extra.is_empty()).then_some(header.extra),
        };

        log::debug!(
            "entry {}: method {:?}, data descriptor {}",
            entry.name,
            method,
            deferred
        );

        self.current = Some(OpenEntry {
            entry: entry.clone(),
            deferred,
            data,
            hasher: Hasher::new(),
            bytes_out: 0,
            eof: false,
        });
        Ok(Some(entry))
    }

    /// Metadata of the current entry.
    ///
    /// Unlike the copy returned by [`next_entry`](Self::next_entry), this one
    /// is updated with the CRC and sizes from a data descriptor once the entry
    /// data has been read or skipped.
    pub fn entry(&self) -> Option<&ZipEntry> {
        self.current.as_ref().map(|open| &open.entry)
    }

    /// Read decompressed data of the current entry.
    ///
    /// Returns `Ok(0)` at the end of the entry, or when no entry is open.
    pub fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        let source = self.source.as_mut().ok_or(ZipError::StreamClosed)?;
        match self.current.as_mut() {
            Some(open) => open.read(source, buf),
            None => Ok(0),
        }
    }

    /// Read the rest of the current entry into memory.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = self.read_data(&mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    /// Skip the remainder of the current entry, including its data descriptor.
    ///
    /// A no-op when no entry is open or the entry is already exhausted.
    pub fn close_entry(&mut self) -> Result<()> {
        let source = self.source.as_mut().ok_or(ZipError::StreamClosed)?;
        let Some(open) = self.current.as_mut() else {
            return Ok(());
        };

        let mut skip = [0u8; SKIP_BUFFER_SIZE];
        while !open.eof {
            open.read(source, &mut skip)?;
        }
        Ok(())
    }

    /// `1` while an entry is open and has data left, `0` otherwise.
    ///
    /// This is a flag, not a byte count.
    pub fn available(&self) -> u32 {
        match (&self.source, &self.current) {
            (Some(_), Some(open)) if !open.eof => 1,
            _ => 0,
        }
    }

    /// Release the decoder and drop the source. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.source.is_some() {
            log::debug!("closing archive reader");
        }
        self.current = None;
        self.source = None;
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }
}

impl<R: Read> Read for ZipReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_data(buf).map_err(io::Error::from)
    }
}
