//! An ICMP echo client.
//!
//! The ICMP echo protocol is specified in [RFC 792](https://www.rfc-editor.org/rfc/rfc792)

pub mod config;
pub mod error;
pub mod icmp;
pub mod parser;
pub mod pinger;
pub mod resolve;
pub mod rtt;
pub mod scheduler;
pub mod stats;

#[cfg(test)]
mod fake;

pub use config::PingConfig;
pub use error::{PingError, PingResult};
pub use pinger::{Outcome, Pinger, RawIcmp};
pub use scheduler::Scheduler;
pub use stats::RunStatistics;
