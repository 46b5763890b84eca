//! Scripted in-memory transport for driving probes without raw sockets.

use std::{
    collections::VecDeque,
    io,
    net::{IpAddr, Ipv4Addr},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use crate::{
    icmp::{quoting_error, IcmpEcho, IcmpMessage, IcmpType},
    pinger::{Endpoint, Transport},
};

const ROUTER: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 1);
const STRANGER: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 9);

/// How the fake network answers the request with a given sequence number.
#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    Reply,
    ReplyAfter(Duration),
    Silent,
    /// A reply carrying another process's identifier, nothing else.
    ForeignOnly,
    ForeignThenReply,
    /// The probe first sees its own request, as on loopback.
    LoopbackThenReply,
    /// A steady stream of replies for another process, 7ms apart.
    ForeignFlood,
    Unreachable,
    TimeExceeded,
    /// Time Exceeded quoting someone else's request (id 0x9999, seq 77).
    ForeignTimeExceeded,
    /// An unrecognised ICMP type sent by a router.
    StrayFromRouter,
    /// An unrecognised ICMP type sent by the target.
    StrayFromTarget,
    SendError,
}

type Script = Arc<dyn Fn(u16) -> Behavior + Send + Sync>;

pub struct FakeTransport {
    script: Script,
    /// Error returned by `open`, after the given delay.
    open_error: Option<(io::ErrorKind, Duration)>,
    failed_opens_left: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
    /// Every timeout handed to `recv_timeout`, across all endpoints.
    pub waits: Arc<Mutex<Vec<Duration>>>,
}

impl FakeTransport {
    pub fn new(script: impl Fn(u16) -> Behavior + Send + Sync + 'static) -> Self {
        FakeTransport {
            script: Arc::new(script),
            open_error: None,
            failed_opens_left: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
            waits: Arc::default(),
        }
    }

    pub fn failing_open(kind: io::ErrorKind) -> Self {
        Self::new(|_| Behavior::Silent).with_failed_opens(kind, usize::MAX, Duration::ZERO)
    }

    /// The first `count` opens fail with `kind`, each after blocking for `delay`.
    pub fn with_failed_opens(
        mut self,
        kind: io::ErrorKind,
        count: usize,
        delay: Duration,
    ) -> Self {
        self.open_error = Some((kind, delay));
        self.failed_opens_left = AtomicUsize::new(count);
        self
    }
}

impl Transport for FakeTransport {
    type Endpoint = FakeEndpoint;

    fn open(&self) -> io::Result<FakeEndpoint> {
        if let Some((kind, delay)) = self.open_error {
            let failing = self
                .failed_opens_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failing {
                thread::sleep(delay);
                return Err(io::Error::from(kind));
            }
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeEndpoint {
            script: self.script.clone(),
            inbox: VecDeque::new(),
            closed: self.closed.clone(),
            waits: self.waits.clone(),
        })
    }
}

pub struct FakeEndpoint {
    script: Script,
    /// Pending deliveries: delay before delivery, ICMP bytes, source.
    inbox: VecDeque<(Duration, Vec<u8>, IpAddr)>,
    closed: Arc<AtomicUsize>,
    waits: Arc<Mutex<Vec<Duration>>>,
}

impl Endpoint for FakeEndpoint {
    fn send_to(&mut self, packet: &[u8], target: Ipv4Addr) -> io::Result<usize> {
        let echo = match IcmpMessage::parse(packet) {
            Ok(IcmpMessage::Echo(echo)) => echo,
            _ => return Err(io::Error::from(io::ErrorKind::InvalidInput)),
        };
        let reply =
            IcmpEcho::new(IcmpType::EchoReply, echo.id(), echo.seq(), echo.payload()).to_bytes();
        let foreign = IcmpEcho::new(
            IcmpType::EchoReply,
            echo.id() ^ 0xffff,
            echo.seq(),
            echo.payload(),
        )
        .to_bytes();
        let from = IpAddr::V4(target);

        match (self.script)(echo.seq()) {
            Behavior::Reply => self.inbox.push_back((Duration::ZERO, reply, from)),
            Behavior::ReplyAfter(delay) => self.inbox.push_back((delay, reply, from)),
            Behavior::Silent => {}
            Behavior::ForeignOnly => self.inbox.push_back((Duration::ZERO, foreign, from)),
            Behavior::ForeignThenReply => {
                self.inbox.push_back((Duration::ZERO, foreign, from));
                self.inbox.push_back((Duration::ZERO, reply, from));
            }
            Behavior::LoopbackThenReply => {
                self.inbox.push_back((Duration::ZERO, packet.to_vec(), from));
                self.inbox.push_back((Duration::ZERO, reply, from));
            }
            Behavior::ForeignFlood => {
                for _ in 0..100 {
                    let delay = Duration::from_millis(7);
                    self.inbox.push_back((delay, foreign.clone(), from));
                }
            }
            Behavior::Unreachable => {
                let msg = quoting_error(3, 1, packet);
                self.inbox.push_back((Duration::ZERO, msg, IpAddr::V4(ROUTER)));
            }
            Behavior::TimeExceeded => {
                let msg = quoting_error(11, 0, packet);
                self.inbox.push_back((Duration::ZERO, msg, IpAddr::V4(ROUTER)));
            }
            Behavior::ForeignTimeExceeded => {
                let theirs = IcmpEcho::request(0x9999, 77, echo.payload()).to_bytes();
                let msg = quoting_error(11, 0, &theirs);
                self.inbox.push_back((Duration::ZERO, msg, IpAddr::V4(STRANGER)));
            }
            Behavior::StrayFromRouter => {
                let msg = vec![13, 0, 0, 0, 1, 2, 3, 4];
                self.inbox.push_back((Duration::ZERO, msg, IpAddr::V4(ROUTER)));
            }
            Behavior::StrayFromTarget => {
                let msg = vec![13, 0, 0, 0, 1, 2, 3, 4];
                self.inbox.push_back((Duration::ZERO, msg, from));
            }
            Behavior::SendError => {
                return Err(io::Error::new(io::ErrorKind::Other, "network is down"))
            }
        }
        Ok(packet.len())
    }

    fn recv_timeout(&mut self, timeout: Duration) -> io::Result<Option<(Vec<u8>, IpAddr)>> {
        if let Ok(mut waits) = self.waits.lock() {
            waits.push(timeout);
        }
        match self.inbox.pop_front() {
            None => {
                thread::sleep(timeout);
                Ok(None)
            }
            Some((delay, bytes, from)) if delay > timeout => {
                thread::sleep(timeout);
                self.inbox.push_front((delay - timeout, bytes, from));
                Ok(None)
            }
            Some((delay, bytes, from)) => {
                thread::sleep(delay);
                Ok(Some((bytes, from)))
            }
        }
    }
}

impl Drop for FakeEndpoint {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
