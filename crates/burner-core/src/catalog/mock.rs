//! Fetcher that serves canned bodies and counts requests.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::fetch::{FetchError, Fetcher};

#[derive(Debug, Default)]
pub struct CountingFetcher {
    bodies: HashMap<String, Vec<u8>>,
    fallback: Option<Vec<u8>>,
    delay: Duration,
    requests: Mutex<Vec<String>>,
    failures_left: AtomicUsize,
}

impl CountingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub fn serve(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), body.to_vec());
        self
    }

    /// Serve `body` for every URL without a specific body.
    pub fn serve_any(mut self, body: &[u8]) -> Self {
        self.fallback = Some(body.to_vec());
        self
    }

    /// Sleep this long inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the first `n` fetches with a 503.
    pub fn fail_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| *u == url).count()
    }
}

impl Fetcher for CountingFetcher {
    fn fetch(&self, url: &str, out: &mut dyn Write) -> Result<u64, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let body = self.bodies.get(url).or(self.fallback.as_ref());
        match body {
            Some(body) if !failing => {
                out.write_all(body)?;
                Ok(body.len() as u64)
            }
            _ => Err(FetchError::Status {
                url: url.to_string(),
                status: if failing { 503 } else { 404 },
            }),
        }
    }
}
