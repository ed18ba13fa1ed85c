//! The per-subject edge FD runner (§4.E): a cooperative task that probes one
//! monitored subject on a fixed tick, feeds successful responses into an
//! [`AdaptiveAccrualFailureDetector`], and signals the owning state machine
//! exactly once when the subject becomes unavailable.
//!
//! Cancellation is "dropping the handle": [`EdgeFdRunner::spawn`] returns a
//! [`JoinHandle`] the caller aborts when the state machine leaves `Active`;
//! a run in flight at that point never gets to deliver a heartbeat
//! afterwards because the task itself is torn down, not merely told to stop.

use crate::detector::AdaptiveAccrualFailureDetector;
use async_trait::async_trait;
use rapid_core::{Endpoint, TransportError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What a probe response told us (§6 `ProbeResponse.status`). Kept local to
/// this crate rather than reusing `rapid-messaging::wire::ProbeStatus`
/// directly, so `rapid-fd` stays a leaf that does not need to know about the
/// wire format — the messaging crate's transport adapter maps between them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ok,
    Bootstrapping,
}

/// Sends a best-effort probe to one subject. Implemented by the transport
/// adapter that owns the real `MessagingClient`; fakeable in tests.
#[async_trait]
pub trait ProbeClient: Send + Sync + 'static {
    async fn probe(&self, subject: &Endpoint) -> Result<ProbeOutcome, TransportError>;
}

#[derive(Clone, Debug)]
pub struct EdgeFdRunnerConfig {
    pub interval: Duration,
    pub expect_first_heartbeat_after: Duration,
    pub threshold: f64,
    pub max_sample_size: u32,
    pub scaling_factor: f64,
    pub bootstrap_heartbeat_limit: u32,
}

impl From<&rapid_core::RapidSettings> for EdgeFdRunnerConfig {
    fn from(s: &rapid_core::RapidSettings) -> Self {
        Self {
            interval: s.failure_detector_interval(),
            expect_first_heartbeat_after: s.expect_first_heartbeat_after(),
            threshold: s.failure_detector_threshold,
            max_sample_size: s.failure_detector_max_sample_size,
            scaling_factor: s.failure_detector_scaling_factor,
            bootstrap_heartbeat_limit: s.bootstrap_heartbeat_limit,
        }
    }
}

pub struct EdgeFdRunner<P: ProbeClient> {
    subject: Endpoint,
    probe_client: Arc<P>,
    failure_tx: mpsc::Sender<Endpoint>,
    config: EdgeFdRunnerConfig,
}

impl<P: ProbeClient> EdgeFdRunner<P> {
    /// Spawns the runner as its own task and returns the handle the caller
    /// owns for cancellation. `failure_tx` is the state machine's mailbox
    /// sink for `SubjectFailed` events.
    pub fn spawn(
        subject: Endpoint,
        probe_client: Arc<P>,
        failure_tx: mpsc::Sender<Endpoint>,
        config: EdgeFdRunnerConfig,
    ) -> JoinHandle<()> {
        let runner = Self {
            subject,
            probe_client,
            failure_tx,
            config,
        };
        tokio::spawn(runner.run())
    }

    async fn run(self) {
        let started = Instant::now();
        let clock = || 0u64; // never invoked: run() always calls heartbeat_at with an explicit timestamp.
        let mut detector = AdaptiveAccrualFailureDetector::new(
            self.config.threshold,
            self.config.max_sample_size,
            self.config.scaling_factor,
            clock,
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        // Disarmed until the first tick primes it; the far-future deadline is a
        // placeholder `Sleep` to reset once the real deadline is known.
        let synthetic = tokio::time::sleep(Duration::from_secs(u64::MAX / 2));
        tokio::pin!(synthetic);
        let mut synthetic_armed = false;
        let mut first_tick = true;
        let mut first_heartbeat_observed = false;
        let mut bootstrap_heartbeats = 0u32;
        let mut failed = false;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if first_tick {
                        first_tick = false;
                        synthetic.as_mut().reset(tokio::time::Instant::now() + self.config.expect_first_heartbeat_after);
                        synthetic_armed = true;
                    }

                    if failed {
                        continue;
                    }

                    let now = started.elapsed().as_nanos() as u64;
                    if !detector.is_available(now) && first_heartbeat_observed {
                        failed = true;
                        tracing::warn!(subject = %self.subject, "edge failure detector signaled failure");
                        let _ = self.failure_tx.send(self.subject.clone()).await;
                        continue;
                    }

                    match self.probe_client.probe(&self.subject).await {
                        Ok(ProbeOutcome::Ok) => {
                            if failed {
                                continue; // late response after a failure signaled concurrently (§4.E step 4)
                            }
                            let t = started.elapsed().as_nanos() as u64;
                            detector.heartbeat_at(t);
                            first_heartbeat_observed = true;
                            tracing::debug!(subject = %self.subject, "heartbeat applied");
                        }
                        Ok(ProbeOutcome::Bootstrapping) => {
                            if failed {
                                continue;
                            }
                            if bootstrap_heartbeats < self.config.bootstrap_heartbeat_limit {
                                let t = started.elapsed().as_nanos() as u64;
                                detector.heartbeat_at(t);
                                bootstrap_heartbeats += 1;
                                tracing::debug!(subject = %self.subject, bootstrap_heartbeats, "bootstrap heartbeat applied");
                            }
                        }
                        Err(e) => {
                            tracing::debug!(subject = %self.subject, error = %e, "probe failed, no heartbeat recorded");
                        }
                    }
                }
                _ = &mut synthetic, if synthetic_armed => {
                    synthetic_armed = false;
                    let t = started.elapsed().as_nanos() as u64;
                    detector.heartbeat_at(t);
                    first_heartbeat_observed = true;
                    tracing::debug!(subject = %self.subject, "synthetic first heartbeat applied");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    struct ScriptedProbe {
        responses: Mutex<Vec<Result<ProbeOutcome, TransportError>>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ProbeClient for ScriptedProbe {
        async fn probe(&self, _subject: &Endpoint) -> Result<ProbeOutcome, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().await;
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses.first().cloned().unwrap_or(Ok(ProbeOutcome::Ok))
            }
        }
    }

    fn fast_config() -> EdgeFdRunnerConfig {
        EdgeFdRunnerConfig {
            interval: Duration::from_millis(10),
            expect_first_heartbeat_after: Duration::from_millis(5),
            threshold: 0.2,
            max_sample_size: 1000,
            scaling_factor: 0.9,
            bootstrap_heartbeat_limit: 30,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_edge_never_signals_failure() {
        let probe = Arc::new(ScriptedProbe {
            responses: Mutex::new(vec![Ok(ProbeOutcome::Ok)]),
            calls: AtomicU32::new(0),
        });
        let (tx, mut rx) = mpsc::channel(1);
        let handle = EdgeFdRunner::spawn(Endpoint::from(("subject", 1)), probe, tx, fast_config());

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn silent_edge_eventually_signals_failure_exactly_once() {
        let probe = Arc::new(ScriptedProbe {
            responses: Mutex::new(vec![Err(TransportError::Timeout {
                endpoint: "subject:1".into(),
                millis: 1,
            })]),
            calls: AtomicU32::new(0),
        });
        let (tx, mut rx) = mpsc::channel(8);
        let handle = EdgeFdRunner::spawn(Endpoint::from(("subject", 1)), probe, tx, fast_config());

        tokio::time::advance(Duration::from_secs(5)).await;
        let failed = rx.recv().await.unwrap();
        assert_eq!(failed, Endpoint::from(("subject", 1)));
        assert!(rx.try_recv().is_err(), "must signal failure exactly once");
        handle.abort();
    }
}
