//! Retry and wait policies.
//!
//! Both the address allocator and the condition waiter are bounded loops
//! over a side-effecting probe with a fixed pause between attempts. The
//! types here describe those bounds.
//!
//! ## Example
//!
//! ```rust
//! use udt_testkit::{RetryPolicy, WaitBound, WaitPolicy};
//! use std::time::Duration;
//!
//! let alloc = RetryPolicy::new(10, Duration::from_millis(500));
//! assert_eq!(alloc.max_sleep_budget(), Duration::from_millis(4500));
//!
//! let wait = WaitPolicy::new(Duration::from_millis(50))
//!     .with_bound(WaitBound::Within(Duration::from_secs(5)));
//! assert!(wait.is_bounded());
//! ```

use crate::error::{Result, TestkitError};
use std::num::NonZeroU32;
use std::time::Duration;

/// Default number of allocation attempts.
pub const DEFAULT_ALLOCATION_ATTEMPTS: u32 = 10;

/// Default pause between failed allocation attempts.
pub const DEFAULT_ALLOCATION_BACKOFF: Duration = Duration::from_millis(500);

/// Default condition polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default upper bound for a condition wait.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounded attempts with a constant pause; fails on exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: NonZeroU32,
    interval: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    ///
    /// A zero attempt count is raised to one: the probe always runs once.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: NonZeroU32::new(max_attempts).unwrap_or(NonZeroU32::MIN),
            interval,
        }
    }

    /// Create a policy, rejecting a zero attempt count.
    pub fn try_new(max_attempts: u32, interval: Duration) -> Result<Self> {
        let max_attempts = NonZeroU32::new(max_attempts).ok_or_else(|| {
            TestkitError::InvalidArgument("max_attempts must be at least 1".to_string())
        })?;
        Ok(Self {
            max_attempts,
            interval,
        })
    }

    /// Maximum number of probes, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.get()
    }

    /// Pause after each failed attempt except the last.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether another attempt is allowed after `attempts` probes.
    pub fn allows_another(&self, attempts: u32) -> bool {
        attempts < self.max_attempts.get()
    }

    /// Total sleep time when every attempt fails.
    pub fn max_sleep_budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts.get() - 1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOCATION_ATTEMPTS, DEFAULT_ALLOCATION_BACKOFF)
    }
}

/// How long a condition wait may keep polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitBound {
    /// Stop after this many probes.
    Attempts(NonZeroU32),
    /// Stop once this much time has passed since the first probe.
    Within(Duration),
    /// Poll until the predicate holds. Must be chosen explicitly.
    Unbounded,
}

impl WaitBound {
    /// Attempt bound; zero is raised to one.
    pub fn attempts(n: u32) -> Self {
        Self::Attempts(NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN))
    }
}

impl Default for WaitBound {
    fn default() -> Self {
        Self::Within(DEFAULT_WAIT_TIMEOUT)
    }
}

/// Polling interval plus bound for a condition wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    interval: Duration,
    bound: WaitBound,
}

impl WaitPolicy {
    /// Poll every `interval` under the default bound.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            bound: WaitBound::default(),
        }
    }

    /// Poll every `interval` with no bound at all.
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            bound: WaitBound::Unbounded,
        }
    }

    /// Replace the bound.
    pub fn with_bound(mut self, bound: WaitBound) -> Self {
        self.bound = bound;
        self
    }

    /// Limit the wait to `timeout`.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_bound(WaitBound::Within(timeout))
    }

    /// Limit the wait to `attempts` probes.
    pub fn with_attempts(self, attempts: u32) -> Self {
        self.with_bound(WaitBound::attempts(attempts))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn bound(&self) -> WaitBound {
        self.bound
    }

    pub fn is_bounded(&self) -> bool {
        !matches!(self.bound, WaitBound::Unbounded)
    }

    /// Decide what happens after a failed probe.
    ///
    /// `elapsed` is measured from the first probe. Returns the pause before
    /// the next probe, or `None` when the bound is spent. A `Within` pause is
    /// clipped so the next probe lands on the deadline instead of past it.
    pub(crate) fn next_pause(&self, probes: u32, elapsed: Duration) -> Option<Duration> {
        match self.bound {
            WaitBound::Attempts(max) => (probes < max.get()).then_some(self.interval),
            WaitBound::Within(limit) => {
                if elapsed >= limit {
                    None
                } else {
                    Some(self.interval.min(limit - elapsed))
                }
            }
            WaitBound::Unbounded => Some(self.interval),
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl From<RetryPolicy> for WaitPolicy {
    fn from(policy: RetryPolicy) -> Self {
        Self::new(policy.interval()).with_attempts(policy.max_attempts())
    }
}

/// Counters reported by a successful wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    /// Probes invoked, including the one that succeeded.
    pub probes: u32,
    /// Pauses taken between probes.
    pub sleeps: u32,
    /// Wall time from the first probe to success.
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 10);
        assert_eq!(policy.interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_attempts_rejected_or_raised() {
        assert!(RetryPolicy::try_new(0, Duration::ZERO).is_err());
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
        assert_eq!(WaitBound::attempts(0), WaitBound::attempts(1));
    }

    #[test]
    fn test_allows_another() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        assert!(policy.allows_another(1));
        assert!(policy.allows_another(2));
        assert!(!policy.allows_another(3));
        assert_eq!(policy.max_sleep_budget(), Duration::from_millis(20));
    }

    #[test]
    fn test_wait_policy_default_is_bounded() {
        let policy = WaitPolicy::default();
        assert_eq!(policy.interval(), Duration::from_millis(50));
        assert_eq!(policy.bound(), WaitBound::Within(DEFAULT_WAIT_TIMEOUT));
        assert!(policy.is_bounded());
        assert!(!WaitPolicy::unbounded(Duration::from_millis(1)).is_bounded());
    }

    #[test]
    fn test_next_pause_attempts() {
        let policy = WaitPolicy::new(Duration::from_millis(5)).with_attempts(2);
        assert_eq!(policy.next_pause(1, Duration::ZERO), Some(Duration::from_millis(5)));
        assert_eq!(policy.next_pause(2, Duration::ZERO), None);
    }

    #[test]
    fn test_next_pause_clipped_to_deadline() {
        let policy = WaitPolicy::new(Duration::from_secs(60)).with_timeout(Duration::from_secs(1));
        let pause = policy.next_pause(1, Duration::from_millis(400));
        assert_eq!(pause, Some(Duration::from_millis(600)));
    }

    #[test]
    fn test_next_pause_after_deadline() {
        let policy = WaitPolicy::new(Duration::from_millis(1)).with_timeout(Duration::ZERO);
        assert_eq!(policy.next_pause(1, Duration::from_millis(3)), None);
    }

    #[test]
    fn test_from_retry_policy() {
        let wait = WaitPolicy::from(RetryPolicy::new(4, Duration::from_millis(7)));
        assert_eq!(wait.interval(), Duration::from_millis(7));
        assert_eq!(wait.bound(), WaitBound::attempts(4));
    }
}
