//! Raw DEFLATE engine adapter.
//!
//! ZIP stores DEFLATE streams without a zlib or gzip envelope, so both halves
//! are built with `zlib_header = false` and the default 32 KiB window. Each
//! [`Encoder`] / [`Decoder`] lives for exactly one entry; dropping it releases
//! the underlying engine state, including on early returns and panics.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use super::error::{Result, ZipError};

/// Outcome of one engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecStep {
    /// Bytes taken from the input slice.
    pub consumed: usize,
    /// Bytes written to the output slice.
    pub produced: usize,
    /// The engine reached the end of the DEFLATE stream.
    pub stream_end: bool,
}

/// Flush behaviour for [`Encoder::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    Normal,
    Finish,
}

/// Map a `-1..=9` level to flate2; `-1` selects the engine default.
pub fn compression_level(level: i32) -> Result<Compression> {
    match level {
        -1 => Ok(Compression::default()),
        0..=9 => Ok(Compression::new(level as u32)),
        _ => Err(ZipError::InvalidLevel(level)),
    }
}

/// Entry-scoped raw DEFLATE compressor.
pub struct Encoder {
    inner: Compress,
    finished: bool,
}

impl Encoder {
    pub fn new(level: Compression) -> Self {
        Self {
            inner: Compress::new(level, false),
            finished: false,
        }
    }

    pub fn encode(&mut self, input: &[u8], output: &mut [u8], flush: FlushMode) -> Result<CodecStep> {
        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();
        let flush = match flush {
            FlushMode::Normal => FlushCompress::None,
            FlushMode::Finish => FlushCompress::Finish,
        };

        let status = self
            .inner
            .compress(input, output, flush)
            .map_err(|e| ZipError::CompressionEngine(e.to_string()))?;
        self.finished = status == Status::StreamEnd;

        Ok(CodecStep {
            consumed: (self.inner.total_in() - before_in) as usize,
            produced: (self.inner.total_out() - before_out) as usize,
            stream_end: self.finished,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Entry-scoped raw DEFLATE decompressor.
pub struct Decoder {
    inner: Decompress,
    finished: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            inner: Decompress::new(false),
            finished: false,
        }
    }

    /// Decode as much of `input` into `output` as fits.
    ///
    /// Once the stream has ended further calls consume and produce nothing,
    /// so bytes after the end of the DEFLATE data are never touched.
    pub fn decode(&mut self, input: &[u8], output: &mut [u8]) -> Result<CodecStep> {
        if self.finished {
            return Ok(CodecStep {
                consumed: 0,
                produced: 0,
                stream_end: true,
            });
        }

        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();
        let status = self
            .inner
            .decompress(input, output, FlushDecompress::None)
            .map_err(|e| ZipError::CompressionEngine(e.to_string()))?;
        self.finished = status == Status::StreamEnd;

        Ok(CodecStep {
            consumed: (self.inner.total_in() - before_in) as usize,
            produced: (self.inner.total_out() - before_out) as usize,
            stream_end: self.finished,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
