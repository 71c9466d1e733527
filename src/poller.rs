use crate::core::{BootstrapError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Answer of a single readiness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness<T> {
    Ready(T),
    /// Not ready yet; the reason is kept for timeout diagnostics.
    NotReady(String),
}

/// Result of a bounded wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready {
        value: T,
        attempts: u32,
    },
    TimedOut {
        attempts: u32,
        elapsed: Duration,
        last_reason: Option<String>,
    },
}

/// Bounded retry loop shared by every readiness wait.
///
/// A wait makes at most `ceil(timeout / interval)` attempts, sleeping
/// `interval` between them. No attempt starts once `timeout` has elapsed.
/// Probe errors end the wait immediately and are returned unchanged; only
/// `Readiness::NotReady` is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPoller {
    interval: Duration,
    timeout: Duration,
}

impl ReadinessPoller {
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(BootstrapError::InvalidConfig(
                "poll interval must be > 0".to_string(),
            ));
        }
        Ok(Self { interval, timeout })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Upper bound on probe invocations for one wait.
    pub fn max_attempts(&self) -> u32 {
        let interval = self.interval.as_nanos();
        let attempts = self.timeout.as_nanos().div_ceil(interval).max(1);
        u32::try_from(attempts).unwrap_or(u32::MAX)
    }

    /// Invokes `probe` until it reports ready, errors, or the budget runs out.
    ///
    /// The probe receives the 1-based attempt number.
    pub async fn wait_until<T, F, Fut>(&self, what: &str, mut probe: F) -> Result<PollOutcome<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Readiness<T>>>,
    {
        let start = Instant::now();
        let max_attempts = self.max_attempts();
        let mut last_reason = None;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match probe(attempt).await? {
                Readiness::Ready(value) => {
                    debug!(what, attempt, "ready");
                    return Ok(PollOutcome::Ready {
                        value,
                        attempts: attempt,
                    });
                }
                Readiness::NotReady(reason) => {
                    debug!(what, attempt, reason = %reason, "not ready yet");
                    last_reason = Some(reason);
                }
            }

            // The next attempt would start at `elapsed + interval`.
            let elapsed = start.elapsed();
            if attempt >= max_attempts || elapsed.saturating_add(self.interval) >= self.timeout {
                return Ok(PollOutcome::TimedOut {
                    attempts: attempt,
                    elapsed,
                    last_reason,
                });
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poller(interval_ms: u64, timeout_ms: u64) -> ReadinessPoller {
        ReadinessPoller::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(timeout_ms),
        )
        .unwrap()
    }

    #[test]
    fn test_max_attempts_rounds_up() {
        assert_eq!(poller(1000, 100_000).max_attempts(), 100);
        assert_eq!(poller(300, 1000).max_attempts(), 4);
        assert_eq!(poller(1000, 0).max_attempts(), 1);
        assert_eq!(ReadinessPoller::default().max_attempts(), 100);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = ReadinessPoller::new(Duration::ZERO, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidConfig(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_kth_attempt() {
        let mut calls = 0u32;
        let outcome = poller(1000, 100_000)
            .wait_until("probe", |attempt| {
                calls += 1;
                async move {
                    if attempt == 7 {
                        Ok(Readiness::Ready(attempt))
                    } else {
                        Ok(Readiness::NotReady(format!("attempt {}", attempt)))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Ready {
                value: 7,
                attempts: 7
            }
        );
        assert_eq!(calls, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_budgeted_attempts() {
        let mut calls = 0u32;
        let outcome: PollOutcome<()> = poller(300, 1000)
            .wait_until("never", |_| {
                calls += 1;
                async { Ok(Readiness::NotReady("still booting".to_string())) }
            })
            .await
            .unwrap();

        match outcome {
            PollOutcome::TimedOut {
                attempts,
                last_reason,
                ..
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(last_reason.as_deref(), Some("still booting"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(calls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_errors_are_not_retried() {
        let mut calls = 0u32;
        let err = poller(10, 1000)
            .wait_until::<(), _, _>("broken", |_| {
                calls += 1;
                async { Err(BootstrapError::ProvisioningFailure("backend gone".to_string())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BootstrapError::ProvisioningFailure(_)));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_attempt_starts_after_budget() {
        let start = Instant::now();
        let mut starts = Vec::new();
        let outcome: PollOutcome<()> = poller(1000, 10_000)
            .wait_until("half-second probe", |_| {
                starts.push(start.elapsed());
                async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(Readiness::NotReady("busy".to_string()))
                }
            })
            .await
            .unwrap();

        assert_eq!(starts.len(), 7);
        assert_eq!(starts.last(), Some(&Duration::from_secs(9)));
        assert!(starts.iter().all(|at| *at < Duration::from_secs(10)));
        assert!(matches!(outcome, PollOutcome::TimedOut { attempts: 7, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_stops_on_elapsed_budget() {
        let mut calls = 0u32;
        let outcome: PollOutcome<()> = poller(10, 100)
            .wait_until("slow", |_| {
                calls += 1;
                async {
                    tokio::time::sleep(Duration::from_millis(60)).await;
                    Ok(Readiness::NotReady("slow".to_string()))
                }
            })
            .await
            .unwrap();

        assert!(matches!(outcome, PollOutcome::TimedOut { attempts: 2, .. }));
        assert_eq!(calls, 2);
    }
}
