//! Aggregate statistics printed when a run ends.

use std::{fmt, time::Duration};

/// min/avg/max/mdev over a non-empty set of RTT samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttSummary {
    pub min: u64,
    pub avg: f64,
    pub max: u64,
    /// Population standard deviation.
    pub mdev: f64,
}

/// Summarizes RTT samples. Returns `None` for an empty slice.
pub fn summarize(samples: &[u64]) -> Option<RttSummary> {
    let first = *samples.first()?;
    let (mut min, mut max) = (first, first);
    let (mut sum, mut sum_sq) = (0f64, 0f64);
    for &rtt in samples {
        min = min.min(rtt);
        max = max.max(rtt);
        let rtt = rtt as f64;
        sum += rtt;
        sum_sq += rtt * rtt;
    }
    let n = samples.len() as f64;
    let avg = sum / n;
    // rounding can leave a tiny negative variance for constant samples
    let variance = (sum_sq / n - avg * avg).max(0.0);
    Some(RttSummary {
        min,
        avg,
        max,
        mdev: variance.sqrt(),
    })
}

impl fmt::Display for RttSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rtt min/avg/max/mdev = {}/{:.3}/{}/{:.3} ms",
            self.min, self.avg, self.max, self.mdev
        )
    }
}

/// Totals for one run, taken once the scheduler has stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatistics {
    pub transmitted: u64,
    pub received: u64,
    /// Wall-clock time between start and the shutdown request.
    pub elapsed: Duration,
    pub rtt: Option<RttSummary>,
}

impl RunStatistics {
    pub fn new(transmitted: u64, received: u64, elapsed: Duration, samples: &[u64]) -> Self {
        Self {
            transmitted,
            received,
            elapsed,
            rtt: summarize(samples),
        }
    }

    /// Probes that produced no reply.
    pub fn lost(&self) -> u64 {
        self.transmitted.saturating_sub(self.received)
    }

    pub fn loss_percent(&self) -> f64 {
        if self.transmitted == 0 {
            0.0
        } else {
            self.lost() as f64 * 100.0 / self.transmitted as f64
        }
    }

    /// Renders the closing summary block for `host`. Nothing is rendered when
    /// no round trip was recorded.
    pub fn render(&self, host: &str) -> Option<String> {
        let rtt = self.rtt?;
        Some(format!(
            "\n--- {} ping statistics ---\n\
             {} packets transmitted, {} received, {:.0}% packet loss, time {}ms\n\
             {}",
            host,
            self.transmitted,
            self.received,
            self.loss_percent(),
            self.elapsed.as_millis(),
            rtt
        ))
    }
}
