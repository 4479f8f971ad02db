use reqwest::blocking::{Client, Response};
use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{bail, Result};

/// Forward-only HTTP byte source.
///
/// The response body is consumed front to back as it arrives, which is all
/// the streaming archive reader needs: no Range support or Content-Length is
/// required from the server.
pub struct HttpSource {
    response: Response,
    transferred_bytes: Arc<AtomicU64>,
}

impl HttpSource {
    /// Send a GET request and return a source over its body.
    ///
    /// Connection failures and timeouts are retried with a growing delay;
    /// any non-success status is an error.
    pub fn open(url: &str) -> Result<Self> {
        const MAX_RETRY: u32 = 10;

        // No overall timeout: the body may take arbitrarily long to stream.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()?;

        let mut retry_count = 0;
        let response = loop {
            match client.get(url).send() {
                Ok(resp) => break resp,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= MAX_RETRY {
                        bail!("Max retries exceeded");
                    }
                    log::warn!("connection error, retry {}/{}: {}", retry_count, MAX_RETRY, e);
                    std::thread::sleep(Duration::from_millis(500 * retry_count as u64));
                }
                Err(e) => return Err(e.into()),
            }
        };

        if !response.status().is_success() {
            bail!("HTTP request failed with status: {}", response.status());
        }

        Ok(Self {
            response,
            transferred_bytes: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Shared counter of bytes transferred from network.
    ///
    /// Stays readable after the source itself has been handed to a reader.
    pub fn transferred_bytes(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.transferred_bytes)
    }
}

impl Read for HttpSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.response.read(buf)?;
        self.transferred_bytes
            .fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}
