//! The probe scheduler and outcome collector.
//!
//! One probe is launched per tick on tokio's blocking pool, since the raw
//! socket IO underneath blocks. Probes report back over an mpsc channel; the
//! loop in [`Scheduler::run`] is the only consumer and owns all counters.
//!
//! Shutdown stops the ticker and drops the loop's own sender. The channel then
//! closes by itself once every in-flight probe has reported, or is closed by
//! force when the grace period runs out; reports after that are dropped.

use std::{future::Future, net::Ipv4Addr, sync::Arc};

use tokio::{
    sync::{mpsc, Semaphore},
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    config::PingConfig,
    error::{PingError, PingResult},
    pinger::{Outcome, Pinger, Transport},
    rtt::RttStore,
    stats::RunStatistics,
};

/// Result of one probe, as delivered to the collector.
#[derive(Debug)]
struct ProbeReport {
    seq: u16,
    result: PingResult<Outcome>,
}

pub struct Scheduler<T: Transport> {
    pinger: Pinger<T>,
    config: PingConfig,
    rtts: RttStore,
}

impl<T: Transport> Scheduler<T> {
    pub fn new(transport: Arc<T>, target: Ipv4Addr, config: PingConfig) -> Self {
        Scheduler {
            pinger: Pinger::new(transport, target, &config),
            config,
            rtts: RttStore::new(),
        }
    }

    /// Handle onto the round-trip samples recorded by this scheduler.
    pub fn rtt_store(&self) -> RttStore {
        self.rtts.clone()
    }

    /// Pings until `shutdown` resolves, passing every consumed outcome to
    /// `display`.
    ///
    /// Per-probe failures are logged and counted as loss. A fatal failure (the
    /// raw socket cannot be opened) stops scheduling like a shutdown would and
    /// is returned once the in-flight probes are drained.
    pub async fn run<F, D>(self, shutdown: F, mut display: D) -> PingResult<RunStatistics>
    where
        F: Future<Output = ()>,
        D: FnMut(&Outcome),
    {
        let start = Instant::now();
        let mut ticker = time::interval_at(start + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let in_flight = Arc::new(Semaphore::new(self.config.max_in_flight));
        let (tx, mut rx) = mpsc::channel::<ProbeReport>(self.config.max_in_flight);
        let mut tx = Some(tx);

        let grace = time::sleep(self.config.grace_period);
        tokio::pin!(grace);
        tokio::pin!(shutdown);

        let mut transmitted: u64 = 0;
        let mut received: u64 = 0;
        let mut elapsed = None;
        let mut fatal: Option<PingError> = None;

        loop {
            let stopping = tx.is_none();
            tokio::select! {
                _ = &mut shutdown, if !stopping => {
                    tracing::debug!(transmitted, "shutdown requested");
                    elapsed = Some(start.elapsed());
                    tx = None;
                    grace.as_mut().reset(Instant::now() + self.config.grace_period);
                }
                _ = ticker.tick(), if !stopping => {
                    let Some(sender) = tx.as_ref() else { continue };
                    let permit = match in_flight.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!(
                                max_in_flight = self.config.max_in_flight,
                                "too many probes in flight, skipping tick"
                            );
                            continue;
                        }
                    };
                    let seq = transmitted as u16;
                    transmitted += 1;

                    let pinger = self.pinger.clone();
                    let sender = sender.clone();
                    tokio::spawn(async move {
                        let result = tokio::task::spawn_blocking(move || pinger.probe(seq))
                            .await
                            .unwrap_or_else(|e| Err(PingError::Task(e)));
                        drop(permit);
                        if sender.send(ProbeReport { seq, result }).await.is_err() {
                            tracing::debug!(seq, "report arrived after shutdown, dropped");
                        }
                    });
                }
                report = rx.recv() => {
                    let Some(ProbeReport { seq, result }) = report else {
                        // every sender is gone: all in-flight probes reported
                        break;
                    };
                    match result {
                        Ok(outcome) => {
                            if let Some(rtt) = outcome.rtt_ms() {
                                received += 1;
                                self.rtts.record(rtt)?;
                            }
                            display(&outcome);
                        }
                        Err(e) if e.is_fatal() => {
                            if fatal.is_none() {
                                tracing::error!(seq, error = %e, "cannot probe, stopping");
                                // an earlier shutdown keeps its own grace deadline
                                if tx.take().is_some() {
                                    elapsed = Some(start.elapsed());
                                    grace.as_mut().reset(Instant::now() + self.config.grace_period);
                                }
                                fatal = Some(e);
                            } else {
                                tracing::debug!(seq, error = %e, "probe failed after stop");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(seq, error = %e, "probe failed");
                        }
                    }
                }
                _ = &mut grace, if stopping => {
                    tracing::debug!("grace period over, abandoning in-flight probes");
                    rx.close();
                    break;
                }
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        let samples = self.rtts.snapshot()?;
        Ok(RunStatistics::new(
            transmitted,
            received,
            elapsed.unwrap_or_else(|| start.elapsed()),
            &samples,
        ))
    }
}
