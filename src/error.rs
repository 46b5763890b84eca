//! Error types shared by the probe worker, the scheduler and the binary.

use std::{
    io,
    sync::{MutexGuard, PoisonError},
};

use thiserror::Error;
use tokio::task::JoinError;

#[derive(Debug, Error)]
pub enum PingError {
    /// The platform resolver could not resolve the hostname.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    /// The hostname resolved, but not to an IPv4 address.
    #[error("no IPv4 address found for {0}")]
    NoIpv4Address(String),

    /// Opening the raw ICMP socket was refused by the OS.
    #[error("permission denied opening raw ICMP socket (try running as root): {0}")]
    Permission(#[source] io::Error),

    /// Opening the raw ICMP socket failed for another reason.
    #[error("failed to open raw ICMP socket: {0}")]
    Socket(#[source] io::Error),

    #[error("failed to send echo request: {0}")]
    Send(#[source] io::Error),

    #[error("failed to receive echo reply: {0}")]
    Receive(#[source] io::Error),

    #[error("malformed ICMP message: {0}")]
    Malformed(String),

    #[error("probe task failed: {0}")]
    Task(#[from] JoinError),

    #[error("RTT store lock poisoned")]
    PoisonedLock,
}

impl PingError {
    /// Errors after which no further probe can succeed. The scheduler stops
    /// ticking when it sees one of these.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PingError::Permission(_) | PingError::Socket(_))
    }

    /// Classifies a failure to open the raw endpoint.
    pub fn from_open(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => PingError::Permission(err),
            _ => PingError::Socket(err),
        }
    }
}

impl<'a, T> From<PoisonError<MutexGuard<'a, T>>> for PingError {
    fn from(_value: PoisonError<MutexGuard<'a, T>>) -> Self {
        PingError::PoisonedLock
    }
}

pub type PingResult<T> = Result<T, PingError>;
