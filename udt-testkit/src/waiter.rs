//! Condition waiter.
//!
//! Polls an injected probe at a fixed interval until it reports success,
//! the [`WaitPolicy`] bound is spent, or an attached cancellation token
//! fires. Probe errors end the wait immediately.
//!
//! ## Example
//!
//! ```rust
//! use udt_testkit::{ConditionWaiter, WaitPolicy};
//! use std::time::Duration;
//!
//! let waiter = ConditionWaiter::new(WaitPolicy::new(Duration::from_millis(1)).with_attempts(5));
//!
//! let mut calls = 0;
//! let outcome = waiter
//!     .wait_until(|| {
//!         calls += 1;
//!         Ok::<_, std::io::Error>(calls == 3)
//!     })
//!     .unwrap();
//!
//! assert_eq!(outcome.probes, 3);
//! assert_eq!(outcome.sleeps, 2);
//! ```

use crate::error::{ProbeError, Result, TestkitError};
use crate::policy::{WaitOutcome, WaitPolicy};
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Blocks until a polled predicate holds.
#[derive(Debug, Clone, Default)]
pub struct ConditionWaiter {
    policy: WaitPolicy,
    cancel: Option<CancellationToken>,
}

/// Advance a wait counter; unbounded zero-interval polls pin at `u32::MAX`.
fn tick(counter: &mut u32) {
    *counter = counter.saturating_add(1);
}

impl ConditionWaiter {
    /// Create a waiter with the given policy.
    pub fn new(policy: WaitPolicy) -> Self {
        Self {
            policy,
            cancel: None,
        }
    }

    /// Attach a cancellation token.
    ///
    /// The token is checked before every probe; async waits also race it
    /// against each pause.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    fn ensure_live(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(TestkitError::Cancelled),
            _ => Ok(()),
        }
    }

    fn exhausted(&self, probes: u32, elapsed: Duration) -> TestkitError {
        warn!(
            probes,
            elapsed = ?elapsed,
            bound = ?self.policy.bound(),
            "Condition not met before wait bound"
        );
        TestkitError::WaitTimedOut { probes, elapsed }
    }

    /// Block the calling thread until `probe` returns `Ok(true)`.
    pub fn wait_until<F, E>(&self, mut probe: F) -> Result<WaitOutcome>
    where
        F: FnMut() -> std::result::Result<bool, E>,
        E: Into<ProbeError>,
    {
        let started = std::time::Instant::now();
        let mut probes = 0u32;
        let mut sleeps = 0u32;

        loop {
            self.ensure_live()?;

            tick(&mut probes);
            if probe().map_err(TestkitError::probe)? {
                let elapsed = started.elapsed();
                if sleeps > 0 {
                    debug!(probes, elapsed = ?elapsed, "Condition met");
                }
                return Ok(WaitOutcome {
                    probes,
                    sleeps,
                    elapsed,
                });
            }

            let elapsed = started.elapsed();
            let Some(pause) = self.policy.next_pause(probes, elapsed) else {
                return Err(self.exhausted(probes, elapsed));
            };

            trace!(probes, pause = ?pause, "Condition not met, sleeping");
            std::thread::sleep(pause);
            tick(&mut sleeps);
        }
    }

    /// Block until `probe` returns a value equal to `target`.
    pub fn wait_for<S, F, E>(&self, mut probe: F, target: &S) -> Result<WaitOutcome>
    where
        S: PartialEq + Debug,
        F: FnMut() -> std::result::Result<S, E>,
        E: Into<ProbeError>,
    {
        self.wait_until(|| {
            let state = probe()?;
            trace!(observed = ?state, target = ?target, "Polled state");
            Ok::<_, E>(state == *target)
        })
    }

    /// Async variant of [`wait_until`](Self::wait_until).
    ///
    /// Pauses with `tokio::time::sleep`, so paused test clocks apply.
    pub async fn wait_until_async<F, Fut, E>(&self, mut probe: F) -> Result<WaitOutcome>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<bool, E>>,
        E: Into<ProbeError>,
    {
        let started = tokio::time::Instant::now();
        let mut probes = 0u32;
        let mut sleeps = 0u32;

        loop {
            self.ensure_live()?;

            tick(&mut probes);
            if probe().await.map_err(TestkitError::probe)? {
                let elapsed = started.elapsed();
                if sleeps > 0 {
                    debug!(probes, elapsed = ?elapsed, "Condition met");
                }
                return Ok(WaitOutcome {
                    probes,
                    sleeps,
                    elapsed,
                });
            }

            let elapsed = started.elapsed();
            let Some(pause) = self.policy.next_pause(probes, elapsed) else {
                return Err(self.exhausted(probes, elapsed));
            };

            trace!(probes, pause = ?pause, "Condition not met, sleeping");
            self.pause_async(pause).await?;
            tick(&mut sleeps);
        }
    }

    /// Async variant of [`wait_for`](Self::wait_for).
    pub async fn wait_for_async<S, F, Fut, E>(&self, mut probe: F, target: &S) -> Result<WaitOutcome>
    where
        S: PartialEq + Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<S, E>>,
        E: Into<ProbeError>,
    {
        self.wait_until_async(|| {
            let next = probe();
            async move {
                let state = next.await?;
                Ok::<_, E>(state == *target)
            }
        })
        .await
    }

    async fn pause_async(&self, pause: Duration) -> Result<()> {
        match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(TestkitError::Cancelled),
                _ = tokio::time::sleep(pause) => Ok(()),
            },
            None => {
                tokio::time::sleep(pause).await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Instant;

    fn fast(attempts: u32) -> ConditionWaiter {
        ConditionWaiter::new(WaitPolicy::new(Duration::from_millis(10)).with_attempts(attempts))
    }

    #[test]
    fn test_counters_saturate() {
        let mut probes = u32::MAX - 1;
        tick(&mut probes);
        tick(&mut probes);
        assert_eq!(probes, u32::MAX);

        let policy = WaitPolicy::unbounded(Duration::ZERO);
        assert_eq!(policy.next_pause(u32::MAX, Duration::from_secs(3600)), Some(Duration::ZERO));
    }

    #[test]
    fn test_unbounded_zero_interval_counts_probes() {
        let waiter = ConditionWaiter::new(WaitPolicy::unbounded(Duration::ZERO));
        let mut calls = 0u32;

        let outcome = waiter
            .wait_until(|| {
                calls += 1;
                Ok::<_, io::Error>(calls == 1000)
            })
            .unwrap();

        assert_eq!(outcome.probes, 1000);
        assert_eq!(outcome.sleeps, 999);
    }

    #[test]
    fn test_returns_immediately_when_already_true() {
        let waiter = ConditionWaiter::new(WaitPolicy::new(Duration::from_secs(60)));
        let started = Instant::now();

        let outcome = waiter.wait_until(|| Ok::<_, io::Error>(true)).unwrap();

        assert_eq!(outcome.probes, 1);
        assert_eq!(outcome.sleeps, 0);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_polls_until_true() {
        let mut calls = 0;
        let outcome = fast(10)
            .wait_until(|| {
                calls += 1;
                Ok::<_, io::Error>(calls >= 3)
            })
            .unwrap();

        assert_eq!(outcome.probes, 3);
        assert_eq!(outcome.sleeps, 2);
        assert!(outcome.elapsed >= Duration::from_millis(20));
    }

    #[test]
    fn test_attempt_bound_exhausted() {
        let mut calls = 0;
        let started = Instant::now();
        let err = fast(3)
            .wait_until(|| {
                calls += 1;
                Ok::<_, io::Error>(false)
            })
            .unwrap_err();

        assert_eq!(calls, 3);
        assert!(started.elapsed() >= Duration::from_millis(20));
        match err {
            TestkitError::WaitTimedOut { probes, .. } => assert_eq!(probes, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_time_bound_exhausted() {
        let waiter = ConditionWaiter::new(
            WaitPolicy::new(Duration::from_millis(10)).with_timeout(Duration::from_millis(35)),
        );
        let started = Instant::now();

        let err = waiter.wait_until(|| Ok::<_, io::Error>(false)).unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(35));
    }

    #[test]
    fn test_probe_error_propagates_without_retry() {
        let mut calls = 0;
        let err = fast(10)
            .wait_until(|| {
                calls += 1;
                Err::<bool, _>(io::Error::new(io::ErrorKind::NotConnected, "socket gone"))
            })
            .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err, TestkitError::ProbeFailed(_)));
        assert!(err.to_string().contains("socket gone"));
    }

    #[test]
    fn test_cancelled_before_first_probe() {
        let token = CancellationToken::new();
        token.cancel();
        let waiter = fast(10).with_cancellation(token);
        let mut calls = 0;

        let err = waiter
            .wait_until(|| {
                calls += 1;
                Ok::<_, io::Error>(true)
            })
            .unwrap_err();

        assert!(matches!(err, TestkitError::Cancelled));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_resumes_within_one_interval_of_flip() {
        let interval = Duration::from_millis(20);
        let delay = Duration::from_millis(60);
        let flag = Arc::new(AtomicBool::new(false));

        let setter = {
            let flag = Arc::clone(&flag);
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                flag.store(true, Ordering::SeqCst);
            })
        };

        let waiter = ConditionWaiter::new(WaitPolicy::new(interval).with_timeout(Duration::from_secs(5)));
        let started = Instant::now();
        let outcome = waiter
            .wait_until(|| Ok::<_, io::Error>(flag.load(Ordering::SeqCst)))
            .unwrap();
        let waited = started.elapsed();
        setter.join().unwrap();

        assert!(waited >= delay);
        // One interval plus scheduler slack.
        assert!(waited < delay + interval + Duration::from_millis(250));
        assert!(outcome.sleeps >= 1);
    }

    #[test]
    fn test_wait_for_target_state() {
        #[derive(Debug, PartialEq)]
        enum Status {
            Opened,
            Connecting,
            Connected,
        }

        let mut seq = vec![Status::Connected, Status::Connecting, Status::Opened];
        let outcome = fast(5)
            .wait_for(|| Ok::<_, io::Error>(seq.pop().unwrap_or(Status::Connected)), &Status::Connected)
            .unwrap();

        assert_eq!(outcome.probes, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_counts_probes_and_sleeps() {
        let calls = AtomicU32::new(0);
        let waiter = ConditionWaiter::new(WaitPolicy::new(Duration::from_millis(50)).with_attempts(5));

        let outcome = waiter
            .wait_until_async(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok::<_, io::Error>(n == 2) }
            })
            .await
            .unwrap();

        assert_eq!(outcome.probes, 2);
        assert_eq!(outcome.sleeps, 1);
        assert!(outcome.elapsed >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_time_bound() {
        let waiter = ConditionWaiter::new(
            WaitPolicy::new(Duration::from_millis(50)).with_timeout(Duration::from_millis(120)),
        );

        let err = waiter
            .wait_until_async(|| async { Ok::<_, io::Error>(false) })
            .await
            .unwrap_err();

        match err {
            TestkitError::WaitTimedOut { probes, elapsed } => {
                // 0, 50, 100, 120
                assert_eq!(probes, 4);
                assert!(elapsed >= Duration::from_millis(120));
                assert!(elapsed < Duration::from_millis(170));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_cancel_interrupts_pause() {
        let token = CancellationToken::new();
        let waiter = ConditionWaiter::new(WaitPolicy::unbounded(Duration::from_secs(3600)))
            .with_cancellation(token.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = waiter
            .wait_until_async(|| async { Ok::<_, io::Error>(false) })
            .await
            .unwrap_err();

        assert!(matches!(err, TestkitError::Cancelled));
    }

    #[tokio::test]
    async fn test_async_wait_for() {
        let calls = AtomicU32::new(0);
        let waiter = ConditionWaiter::new(WaitPolicy::new(Duration::from_millis(1)).with_attempts(10));

        let outcome = waiter
            .wait_for_async(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move { Ok::<_, io::Error>(n) }
                },
                &4,
            )
            .await
            .unwrap();

        assert_eq!(outcome.probes, 5);
    }
}
