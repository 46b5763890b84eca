//! Run parameters for the pinger.
//!
//! The binary always runs with [`PingConfig::default`]; the builder methods
//! exist so the scheduler can be driven at other rates.

use std::time::Duration;

/// Time between two echo requests.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// How long a probe waits for its reply after sending.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(400);

/// How long in-flight probes may still report after shutdown.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(250);

/// Upper bound on probes outstanding at once.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Payload carried by every echo request.
pub const ECHO_PAYLOAD: &[u8] = b"HELLO-PING-PING";

/// Identifier stamped on outgoing requests: the low 16 bits of the pid.
pub fn process_identifier() -> u16 {
    (std::process::id() & 0xffff) as u16
}

#[derive(Debug, Clone)]
pub struct PingConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub grace_period: Duration,
    pub max_in_flight: usize,
    pub identifier: u16,
    pub payload: Vec<u8>,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            identifier: process_identifier(),
            payload: ECHO_PAYLOAD.to_vec(),
        }
    }
}

impl PingConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Set the in-flight bound. Zero is raised to one.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_identifier(mut self, identifier: u16) -> Self {
        self.identifier = identifier;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = PingConfig::default();
        assert_eq!(config.interval, Duration::from_millis(500));
        assert_eq!(config.timeout, Duration::from_millis(400));
        assert_eq!(config.grace_period, Duration::from_millis(250));
        assert_eq!(config.payload, b"HELLO-PING-PING");
        assert_eq!(config.payload.len(), 15);
        assert_eq!(config.identifier, (std::process::id() & 0xffff) as u16);
    }

    #[test]
    fn in_flight_bound_is_at_least_one() {
        assert_eq!(PingConfig::default().with_max_in_flight(0).max_in_flight, 1);
    }
}
