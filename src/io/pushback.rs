use std::collections::VecDeque;
use std::io::{self, Read};

/// A byte source with a pushback queue in front of it.
///
/// Every read drains the queue before touching the wrapped source, so bytes
/// that were read ahead and then handed back with [`unread`](Self::unread) are
/// replayed exactly once and in their original order.
#[derive(Debug)]
pub struct PushbackReader<R> {
    inner: R,
    pending: VecDeque<u8>,
}

impl<R: Read> PushbackReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: VecDeque::new(),
        }
    }

    /// Move up to `buf.len()` queued bytes into `buf`, returning how many.
    pub fn take_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.pending.len());
        for (dst, src) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }
        n
    }

    /// Push bytes back so the next read returns them first.
    pub fn unread(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        log::trace!("pushback {} bytes", bytes.len());
        for &b in bytes.iter().rev() {
            self.pending.push_front(b);
        }
    }

    /// Look at the next `n` bytes without consuming them.
    ///
    /// The returned slice is shorter than `n` only when the source ended.
    pub fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        let mut chunk = [0u8; 4096];
        while self.pending.len() < n {
            let want = (n - self.pending.len()).min(chunk.len());
            let read = match self.inner.read(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.pending.extend(&chunk[..read]);
        }
        let available = self.pending.len().min(n);
        Ok(&self.pending.make_contiguous()[..available])
    }

    /// Drop `n` bytes from the front of the queue (after a [`peek`](Self::peek)).
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.pending.len());
        self.pending.drain(..n);
    }
}

impl<R: Read> Read for PushbackReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.pending.is_empty() {
            return Ok(self.take_pending(buf));
        }
        self.inner.read(buf)
    }
}
