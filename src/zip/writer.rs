//! Streaming archive writer.
//!
//! The writer only ever appends to its sink. Local headers are written as
//! soon as an entry is opened; DEFLATED entries get zero placeholders there
//! and their real CRC and sizes follow the data in a data descriptor. The
//! central directory and end record are emitted by [`ZipWriter::finish`].

use crc32fast::Hasher;
use flate2::Compression;
use std::io::{self, Write};

use crate::io::CountingWriter;

use super::codec::{self, Encoder, FlushMode};
use super::error::{Result, ZipError};
use super::structures::*;

/// Output chunk size for the encoder.
const DEFLATE_BUFFER_SIZE: usize = 8192;

/// State of the entry currently being written.
struct WriteEntry {
    entry: ZipEntry,
    method: CompressionMethod,
    flags: u16,
    offset: u64,
    hasher: Hasher,
    uncompressed_size: u64,
    compressed_size: u64,
    encoder: Option<Encoder>,
}

/// What the central directory needs to know about a closed entry.
struct EntryRecord {
    entry: ZipEntry,
    method: CompressionMethod,
    flags: u16,
    offset: u32,
    crc: u32,
    compressed_size: u32,
    uncompressed_size: u32,
}

fn zip32(value: u64, what: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| ZipError::DataTooLarge(what))
}

fn field16(len: usize, what: &'static str) -> Result<u16> {
    u16::try_from(len).map_err(|_| ZipError::DataTooLarge(what))
}

/// Push-based writer producing a ZIP byte stream.
///
/// ## Usage
///
/// ```ignore
/// let mut writer = ZipWriter::new(file);
/// writer.put_next_entry(ZipEntry::new("hello.txt"))?;
/// writer.write_data(b"Hello, World!")?;
/// writer.close_entry()?;
/// writer.close()?;
/// ```
///
/// Opening an entry while another is open closes the previous one first.
/// Closing the writer finishes the archive if that has not happened yet.
pub struct ZipWriter<W: Write> {
    /// `None` once the writer has been closed
    sink: Option<CountingWriter<W>>,
    default_method: CompressionMethod,
    level: Compression,
    comment: Option<String>,
    records: Vec<EntryRecord>,
    current: Option<WriteEntry>,
    finished: bool,
    /// An entry failed after bytes reached the sink; the archive cannot be completed
    failed: bool,
    deflate_buf: Box<[u8]>,
}

impl<W: Write> ZipWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink: Some(CountingWriter::new(sink)),
            default_method: CompressionMethod::Deflated,
            level: Compression::default(),
            comment: None,
            records: Vec::new(),
            current: None,
            finished: false,
            failed: false,
            deflate_buf: vec![0u8; DEFLATE_BUFFER_SIZE].into_boxed_slice(),
        }
    }

    /// Method used for entries that do not set one.
    pub fn set_method(&mut self, method: CompressionMethod) -> Result<()> {
        self.ensure_open()?;
        self.default_method = method.supported()?;
        Ok(())
    }

    /// Compression level for entries opened from now on, `-1..=9`.
    ///
    /// `-1` selects the engine default.
    pub fn set_level(&mut self, level: i32) -> Result<()> {
        self.ensure_open()?;
        self.level = codec::compression_level(level)?;
        Ok(())
    }

    /// Archive comment written into the end of central directory record.
    pub fn set_comment(&mut self, comment: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        self.comment = Some(comment.into());
        Ok(())
    }

    /// Reject use after `close()` or after an entry failed midway.
    ///
    /// A failed entry leaves bytes in the sink that no central directory entry
    /// describes.
    fn ensure_open(&self) -> Result<()> {
        if self.sink.is_none() {
            return Err(ZipError::StreamClosed);
        }
        if self.failed {
            return Err(ZipError::InvalidEntryState(
                "an earlier entry failed; the archive cannot be completed",
            ));
        }
        Ok(())
    }

    /// Mark the writer unusable when `result` is an error.
    fn poison_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            log::warn!("archive writer failed: {}", e);
            self.failed = true;
        }
        result
    }

    /// Bytes emitted to the sink so far.
    pub fn bytes_written(&self) -> u64 {
        self.sink.as_ref().map_or(0, |sink| sink.bytes_written())
    }

    /// Begin a new entry and write its local file header.
    ///
    /// # Errors
    ///
    /// [`ZipError::InvalidEntryState`] for an empty name, after
    /// [`finish`](Self::finish), or for a STORED entry without size and CRC.
    pub fn put_next_entry(&mut self, mut entry: ZipEntry) -> Result<()> {
        self.ensure_open()?;
        if self.finished {
            return Err(ZipError::InvalidEntryState("archive already finished"));
        }
        self.close_entry()?;

        if entry.name.is_empty() {
            return Err(ZipError::InvalidEntryState("entry name is empty"));
        }
        let method = entry.method.unwrap_or(self.default_method);
        let name = entry.name.as_bytes().to_vec();
        let extra = entry.extra.clone().unwrap_or_default();
        field16(name.len(), "entry name longer than 65535 bytes")?;
        field16(extra.len(), "extra field longer than 65535 bytes")?;
        if let Some(comment) = &entry.comment {
            field16(comment.len(), "entry comment longer than 65535 bytes")?;
        }

        let mut flags = 0;
        if !entry.name.is_ascii() || entry.comment.as_ref().is_some_and(|c| !c.is_ascii()) {
            flags |= FLAG_UTF8;
        }

        let (crc32, size, encoder) = match method {
            CompressionMethod::Stored => {
                let (Some(size), Some(crc)) = (entry.size, entry.crc) else {
                    return Err(ZipError::InvalidEntryState(
                        "STORED entry requires size and crc",
                    ));
                };
                (crc, zip32(size, "entry larger than 4 GiB")?, None)
            }
            CompressionMethod::Deflated => {
                flags |= FLAG_DATA_DESCRIPTOR;
                (0, 0, Some(Encoder::new(self.level)))
            }
            CompressionMethod::Unknown(v) => return Err(ZipError::UnsupportedMethod(v)),
        };
        entry.method = Some(method);

        let sink = self.sink.as_mut().ok_or(ZipError::StreamClosed)?;
        let offset = sink.bytes_written();
        let header = LocalFileHeader {
            version_needed: ZIP_VERSION,
            flags,
            compression_method: method.as_u16(),
            last_mod_time: entry.dos_time(),
            last_mod_date: entry.dos_date(),
            crc32,
            compressed_size: size,
            uncompressed_size: size,
            file_name: name,
            extra,
        };
        let written = header.write_to(sink).map_err(ZipError::from);
        self.poison_on_error(written)?;

        log::debug!("put entry {} at offset {} ({:?})", entry.name, offset, method);
        self.current = Some(WriteEntry {
            entry,
            method,
            flags,
            offset,
            hasher: Hasher::new(),
            uncompressed_size: 0,
            compressed_size: 0,
            encoder,
        });
        Ok(())
    }

    /// Append data to the current entry.
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if self.current.is_none() {
            return Err(ZipError::InvalidEntryState("no entry is open"));
        }
        if data.is_empty() {
            return Ok(());
        }
        let written = self.stream_data(data);
        self.poison_on_error(written)
    }

    fn stream_data(&mut self, data: &[u8]) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(ZipError::StreamClosed)?;
        let current = self
            .current
            .as_mut()
            .ok_or(ZipError::InvalidEntryState("no entry is open"))?;

        current.hasher.update(data);
        current.uncompressed_size += data.len() as u64;

        let Some(encoder) = current.encoder.as_mut() else {
            sink.write_all(data)?;
            current.compressed_size += data.len() as u64;
            return Ok(());
        };

        let mut input = data;
        while !input.is_empty() {
            let step = encoder.encode(input, &mut self.deflate_buf, FlushMode::Normal)?;
            if step.produced > 0 {
                sink.write_all(&self.deflate_buf[..step.produced])?;
                current.compressed_size += step.produced as u64;
            } else if step.consumed == 0 {
                return Err(ZipError::CompressionEngine(
                    "encoder made no progress".to_string(),
                ));
            }
            input = &input[step.consumed..];
        }
        Ok(())
    }

    /// Finish the current entry: flush the encoder, write the data descriptor
    /// and remember the entry for the central directory.
    ///
    /// A no-op when no entry is open. If the entry cannot be completed (a
    /// STORED entry whose data disagrees with its declared size or CRC, or an
    /// I/O failure) the writer refuses every further operation except `close`.
    pub fn close_entry(&mut self) -> Result<()> {
        self.ensure_open()?;
        let Some(current) = self.current.take() else {
            return Ok(());
        };
        let completed = self.complete_entry(current);
        self.poison_on_error(completed)
    }

    fn complete_entry(&mut self, mut current: WriteEntry) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(ZipError::StreamClosed)?;

        if let Some(encoder) = current.encoder.as_mut() {
            while !encoder.is_finished() {
                let step = encoder.encode(&[], &mut self.deflate_buf, FlushMode::Finish)?;
                if step.produced == 0 && !step.stream_end {
                    return Err(ZipError::CompressionEngine(
                        "encoder made no progress while finishing".to_string(),
                    ));
                }
                sink.write_all(&self.deflate_buf[..step.produced])?;
                current.compressed_size += step.produced as u64;
            }
        }
        current.encoder = None;

        let crc = current.hasher.finalize();
        if current.method == CompressionMethod::Stored {
            let declared = current.entry.size.unwrap_or_default();
            if declared != current.uncompressed_size {
                return Err(ZipError::SizeMismatch {
                    expected: declared,
                    actual: current.uncompressed_size,
                });
            }
            let expected = current.entry.crc.unwrap_or_default();
            if expected != crc {
                return Err(ZipError::CrcMismatch {
                    expected,
                    computed: crc,
                });
            }
        }

        let record = EntryRecord {
            offset: zip32(current.offset, "archive larger than 4 GiB")?,
            crc,
            compressed_size: zip32(current.compressed_size, "entry larger than 4 GiB")?,
            uncompressed_size: zip32(current.uncompressed_size, "entry larger than 4 GiB")?,
            method: current.method,
            flags: current.flags,
            entry: current.entry,
        };

        if record.flags & FLAG_DATA_DESCRIPTOR != 0 {
            DataDescriptor {
                crc32: record.crc,
                compressed_size: record.compressed_size,
                uncompressed_size: record.uncompressed_size,
            }
            .write_to(sink)?;
        }

        log::debug!(
            "closed entry {}: {} -> {} bytes, crc {:#010x}",
            record.entry.name,
            record.uncompressed_size,
            record.compressed_size,
            record.crc
        );
        self.records.push(record);
        Ok(())
    }

    /// Close any open entry and write the central directory and end record.
    ///
    /// Calling it again does nothing.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.close_entry()?;

        let sink = self.sink.as_mut().ok_or(ZipError::StreamClosed)?;
        let comment = self.comment.as_deref().unwrap_or_default().as_bytes();
        let total_entries = field16(self.records.len(), "more than 65535 entries")?;
        field16(comment.len(), "archive comment longer than 65535 bytes")?;
        let cd_offset = zip32(sink.bytes_written(), "archive larger than 4 GiB")?;

        let headers: Vec<CentralDirectoryHeader> = self
            .records
            .iter()
            .map(|record| CentralDirectoryHeader {
                version_made_by: ZIP_VERSION,
                version_needed: ZIP_VERSION,
                flags: record.flags,
                compression_method: record.method.as_u16(),
                last_mod_time: record.entry.dos_time(),
                last_mod_date: record.entry.dos_date(),
                crc32: record.crc,
                compressed_size: record.compressed_size,
                uncompressed_size: record.uncompressed_size,
                disk_number_start: 0,
                internal_attrs: 0,
                external_attrs: 0,
                lfh_offset: record.offset,
                file_name: record.entry.name.as_bytes().to_vec(),
                extra: record.entry.extra.clone().unwrap_or_default(),
                comment: record
                    .entry
                    .comment
                    .as_ref()
                    .map(|c| c.as_bytes().to_vec())
                    .unwrap_or_default(),
            })
            .collect();
        let cd_size: usize = headers.iter().map(CentralDirectoryHeader::encoded_len).sum();
        let cd_size = zip32(cd_size as u64, "central directory larger than 4 GiB")?;
        zip32(
            u64::from(cd_offset) + u64::from(cd_size),
            "archive larger than 4 GiB",
        )?;

        self.finished = true;
        for header in &headers {
            header.write_to(sink)?;
        }
        EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: total_entries,
            total_entries,
            cd_size,
            cd_offset,
            comment: comment.to_vec(),
        }
        .write_to(sink)?;
        sink.flush()?;

        log::debug!(
            "finished archive: {} entries, central directory at {} ({} bytes)",
            total_entries,
            cd_offset,
            cd_size
        );
        Ok(())
    }

    /// Finish the archive if needed, then flush and drop the sink.
    ///
    /// The sink is released even when finishing fails. Calling it again does
    /// nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.sink.is_none() {
            return Ok(());
        }
        let finished = self.finish();
        self.current = None;
        let flushed = match self.sink.take() {
            Some(mut sink) => sink.flush(),
            None => Ok(()),
        };
        log::debug!("closed archive writer");
        finished?;
        flushed?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }

    /// Finish the archive and hand back the sink.
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        let mut sink = self.sink.take().ok_or(ZipError::StreamClosed)?;
        sink.flush()?;
        Ok(sink.into_inner())
    }
}

impl<W: Write> Write for ZipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_data(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.flush(),
            None => Err(ZipError::StreamClosed.into()),
        }
    }
}
