//! Append-only store of round-trip times.

use std::sync::{Arc, Mutex};

use crate::error::PingResult;

/// Round-trip samples in whole milliseconds, in the order they were recorded.
///
/// Cloning yields another handle onto the same samples.
#[derive(Debug, Clone, Default)]
pub struct RttStore {
    samples: Arc<Mutex<Vec<u64>>>,
}

impl RttStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, rtt_ms: u64) -> PingResult<()> {
        self.samples.lock()?.push(rtt_ms);
        Ok(())
    }

    pub fn len(&self) -> PingResult<usize> {
        Ok(self.samples.lock()?.len())
    }

    pub fn is_empty(&self) -> PingResult<bool> {
        Ok(self.samples.lock()?.is_empty())
    }

    /// Copy of the samples recorded so far.
    pub fn snapshot(&self) -> PingResult<Vec<u64>> {
        Ok(self.samples.lock()?.clone())
    }
}
