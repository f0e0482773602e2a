//! Notification-based status waiting.
//!
//! When the code under test can publish its state changes, waiting on a
//! [`StatusWatch`] wakes exactly when the state moves instead of polling on
//! a fixed interval. Every wait still carries a deadline.
//!
//! ## Example
//!
//! ```rust
//! use udt_testkit::StatusWatch;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let watch = StatusWatch::new("opened");
//! let mut waiter = watch.subscribe();
//!
//! watch.publish("connected");
//!
//! let status = waiter
//!     .wait_for_status(&"connected", Duration::from_secs(1))
//!     .await
//!     .unwrap();
//! assert_eq!(status, "connected");
//! # });
//! ```

use crate::error::{Result, TestkitError};
use std::fmt::Debug;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Publisher side of an observable status.
#[derive(Debug)]
pub struct StatusWatch<S> {
    tx: watch::Sender<S>,
}

impl<S> StatusWatch<S>
where
    S: Clone + PartialEq + Debug + Send + Sync + 'static,
{
    /// Create a watch holding `initial`.
    pub fn new(initial: S) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Publish a new status, waking waiters if it changed.
    pub fn publish(&self, status: S) {
        self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                debug!(from = ?current, to = ?status, "Status changed");
                *current = status;
                true
            }
        });
    }

    /// Current status.
    pub fn current(&self) -> S {
        self.tx.borrow().clone()
    }

    /// A waiter handle that can be moved to another task.
    pub fn subscribe(&self) -> StatusWaiter<S> {
        StatusWaiter {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiver side of a [`StatusWatch`].
#[derive(Debug, Clone)]
pub struct StatusWaiter<S> {
    rx: watch::Receiver<S>,
}

impl<S> StatusWaiter<S>
where
    S: Clone + PartialEq + Debug + Send + Sync + 'static,
{
    /// Wait until the status equals `target`, or fail after `timeout`.
    ///
    /// Returns immediately when the status already matches. A dropped
    /// publisher is reported as a probe failure.
    pub async fn wait_for_status(&mut self, target: &S, timeout: Duration) -> Result<S> {
        let outcome = tokio::time::timeout(timeout, self.rx.wait_for(|status| status == target))
            .await
            .map(|res| res.map(|status| (*status).clone()));

        match outcome {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(closed)) => Err(TestkitError::probe(closed)),
            Err(_) => {
                let current = self.rx.borrow().clone();
                warn!(target_status = ?target, current = ?current, "Status wait timed out");
                Err(TestkitError::WaitTimedOut {
                    probes: 0,
                    elapsed: timeout,
                })
            }
        }
    }

    /// Current status.
    pub fn current(&self) -> S {
        self.rx.borrow().clone()
    }
}
