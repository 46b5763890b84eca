//! Contains the implementation of a single ping probe.
//!
//! A probe opens its own raw ICMP endpoint, sends one echo request and waits a
//! bounded time for the matching reply. Every raw ICMP socket on the host sees
//! every ICMP message, so a probe also sees replies meant for other probes and
//! other ping processes; those are skipped by identifier and sequence number.

use std::{
    fmt, io,
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
    time::{Duration, Instant},
};

use pnet::{
    packet::{icmp::IcmpPacket, ip::IpNextHeaderProtocols, Packet},
    transport::{
        icmp_packet_iter, transport_channel, TransportChannelType, TransportProtocol,
        TransportReceiver, TransportSender,
    },
};

use crate::{
    config::PingConfig,
    error::{PingError, PingResult},
    icmp::{IcmpEcho, IcmpMessage, IcmpType, IPV4_HEADER_LEN},
};

/// Opens raw ICMP endpoints. One endpoint is opened per probe.
pub trait Transport: Send + Sync + 'static {
    type Endpoint: Endpoint;

    fn open(&self) -> io::Result<Self::Endpoint>;
}

/// A raw ICMP socket. Dropping it releases the socket.
pub trait Endpoint {
    fn send_to(&mut self, packet: &[u8], target: Ipv4Addr) -> io::Result<usize>;

    /// Waits up to `timeout` for the next ICMP message, returned without its IP
    /// header together with its source. `Ok(None)` means the wait timed out.
    fn recv_timeout(&mut self, timeout: Duration) -> io::Result<Option<(Vec<u8>, IpAddr)>>;
}

/// Raw IPv4 ICMP sockets through pnet transport channels.
#[derive(Debug, Clone)]
pub struct RawIcmp {
    buf_size: usize,
}

impl Default for RawIcmp {
    fn default() -> Self {
        RawIcmp { buf_size: 1500 }
    }
}

pub struct RawIcmpEndpoint {
    tx: TransportSender,
    rx: TransportReceiver,
}

impl Transport for RawIcmp {
    type Endpoint = RawIcmpEndpoint;

    fn open(&self) -> io::Result<RawIcmpEndpoint> {
        let proto = TransportChannelType::Layer4(TransportProtocol::Ipv4(
            IpNextHeaderProtocols::Icmp,
        ));
        let (tx, rx) = transport_channel(self.buf_size, proto)?;
        Ok(RawIcmpEndpoint { tx, rx })
    }
}

impl Endpoint for RawIcmpEndpoint {
    fn send_to(&mut self, packet: &[u8], target: Ipv4Addr) -> io::Result<usize> {
        let pkt = IcmpPacket::new(packet).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "packet too short for ICMP")
        })?;
        self.tx.send_to(pkt, IpAddr::V4(target))
    }

    fn recv_timeout(&mut self, timeout: Duration) -> io::Result<Option<(Vec<u8>, IpAddr)>> {
        let mut iter = icmp_packet_iter(&mut self.rx);
        Ok(iter
            .next_with_timeout(timeout)?
            .map(|(packet, addr)| (packet.packet().to_vec(), addr)))
    }
}

/// What became of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reply {
        /// Reply size including the IPv4 header.
        bytes: usize,
        from: Ipv4Addr,
        seq: u16,
        rtt_ms: u64,
    },
    Unreachable {
        target: Ipv4Addr,
        seq: u16,
        rtt_ms: u64,
    },
    Timeout {
        seq: u16,
    },
    Other {
        seq: u16,
        rtt_ms: u64,
        message: IcmpMessage,
    },
}

impl Outcome {
    pub fn seq(&self) -> u16 {
        match self {
            Outcome::Reply { seq, .. }
            | Outcome::Unreachable { seq, .. }
            | Outcome::Timeout { seq }
            | Outcome::Other { seq, .. } => *seq,
        }
    }

    /// Round-trip time, absent for timeouts.
    pub fn rtt_ms(&self) -> Option<u64> {
        match self {
            Outcome::Reply { rtt_ms, .. }
            | Outcome::Unreachable { rtt_ms, .. }
            | Outcome::Other { rtt_ms, .. } => Some(*rtt_ms),
            Outcome::Timeout { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Outcome::Timeout { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Reply {
                bytes,
                from,
                seq,
                rtt_ms,
            } => write!(
                f,
                "{} bytes from {}: icmp_seq={} time={} ms",
                bytes, from, seq, rtt_ms
            ),
            Outcome::Unreachable { target, .. } => write!(f, "{} is unreachable", target),
            Outcome::Timeout { seq } => write!(f, "Request timeout for icmp_seq={}", seq),
            Outcome::Other { message, .. } => write!(f, "got {:?}", message),
        }
    }
}

/// Sends probes to one target. Cheap to clone; clones share the transport.
pub struct Pinger<T: Transport> {
    transport: Arc<T>,
    target: Ipv4Addr,
    identifier: u16,
    timeout: Duration,
    payload: Arc<[u8]>,
}

impl<T: Transport> Clone for Pinger<T> {
    fn clone(&self) -> Self {
        Pinger {
            transport: self.transport.clone(),
            target: self.target,
            identifier: self.identifier,
            timeout: self.timeout,
            payload: self.payload.clone(),
        }
    }
}

impl<T: Transport> Pinger<T> {
    pub fn new(transport: Arc<T>, target: Ipv4Addr, config: &PingConfig) -> Self {
        Pinger {
            transport,
            target,
            identifier: config.identifier,
            timeout: config.timeout,
            payload: config.payload.as_slice().into(),
        }
    }

    /// Sends one echo request with sequence number `seq` and blocks until its
    /// reply arrives or the timeout passes.
    ///
    /// A timeout is an [`Outcome`], not an error.
    pub fn probe(&self, seq: u16) -> PingResult<Outcome> {
        let mut endpoint = self.transport.open().map_err(PingError::from_open)?;

        let request = IcmpEcho::request(self.identifier, seq, &self.payload).to_bytes();
        endpoint
            .send_to(&request, self.target)
            .map_err(PingError::Send)?;
        let sent = Instant::now();
        let deadline = sent + self.timeout;

        loop {
            let Some(wait) = receive_wait(deadline, Instant::now()) else {
                return Ok(Outcome::Timeout { seq });
            };
            let (buf, from) = match endpoint.recv_timeout(wait) {
                Ok(Some(received)) => received,
                Ok(None) => return Ok(Outcome::Timeout { seq }),
                Err(e) if is_timeout(&e) => return Ok(Outcome::Timeout { seq }),
                Err(e) => return Err(PingError::Receive(e)),
            };
            let rtt_ms = sent.elapsed().as_millis() as u64;

            let message = match IcmpMessage::parse(&buf) {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!(seq, %from, error = %e, "skipping unparsable ICMP message");
                    continue;
                }
            };
            if let Some(outcome) = self.correlate(seq, buf.len(), from, rtt_ms, message) {
                return Ok(outcome);
            }
        }
    }

    /// Matches a received message against the probe with sequence `seq`.
    /// Returns `None` for traffic that belongs to someone else.
    fn correlate(
        &self,
        seq: u16,
        len: usize,
        from: IpAddr,
        rtt_ms: u64,
        message: IcmpMessage,
    ) -> Option<Outcome> {
        match message {
            IcmpMessage::Echo(echo) if echo.ty() == IcmpType::EchoReply => {
                if echo.id() != self.identifier
                    || echo.seq() != seq
                    || from != IpAddr::V4(self.target)
                {
                    tracing::trace!(
                        seq,
                        %from,
                        id = echo.id(),
                        reply_seq = echo.seq(),
                        "ignoring echo reply for another probe"
                    );
                    return None;
                }
                Some(Outcome::Reply {
                    bytes: len + IPV4_HEADER_LEN,
                    from: self.target,
                    seq,
                    rtt_ms,
                })
            }
            // requests: our own outgoing traffic or somebody pinging us
            IcmpMessage::Echo(_) => None,
            IcmpMessage::Error { ty, quoted, .. } if quoted != Some((self.identifier, seq)) => {
                tracing::trace!(seq, %from, ?ty, ?quoted, "ignoring ICMP error for another probe");
                None
            }
            IcmpMessage::Error {
                ty: IcmpType::DestinationUnreachable,
                ..
            } => Some(Outcome::Unreachable {
                target: self.target,
                seq,
                rtt_ms,
            }),
            message @ IcmpMessage::Error { .. } => Some(Outcome::Other {
                seq,
                rtt_ms,
                message,
            }),
            // nothing to correlate on, so only trust the target itself
            IcmpMessage::Other { ty, .. } if from != IpAddr::V4(self.target) => {
                tracing::trace!(seq, %from, ?ty, "ignoring ICMP message from another host");
                None
            }
            message @ IcmpMessage::Other { .. } => Some(Outcome::Other {
                seq,
                rtt_ms,
                message,
            }),
        }
    }
}

/// Shortest wait handed to the endpoint. Raw socket read timeouts have
/// microsecond resolution and a zero timeout blocks forever, so anything below
/// a millisecond counts as expired.
const MIN_RECEIVE_WAIT: Duration = Duration::from_millis(1);

/// Time left until `deadline`, rounded up to whole milliseconds, or `None`
/// once less than [`MIN_RECEIVE_WAIT`] remains.
fn receive_wait(deadline: Instant, now: Instant) -> Option<Duration> {
    let remaining = deadline.saturating_duration_since(now);
    if remaining < MIN_RECEIVE_WAIT {
        return None;
    }
    let millis = (remaining.as_nanos() + 999_999) / 1_000_000;
    Some(Duration::from_millis(millis as u64))
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
