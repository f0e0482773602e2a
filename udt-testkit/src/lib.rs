//! Test-support utilities for exercising a UDT socket transport binding.
//!
//! ## Features
//!
//! - **ConditionWaiter** - Bounded polling until a probe reports success
//! - **StatusWatch** - Change-notified waiting with a deadline
//! - **AddressAllocator** - Free local address/port with retry and backoff
//! - **Ping** - Round-trip time through the platform `ping` command
//! - **SocketRegistry** - Test-owned id to socket map plus buffer helpers
//! - **Diagnostics** - Log dumps of id buffers, sets and paths
//! - **Random** - Reproducible test data
//! - **TestkitConfig** - TOML/env configuration for all of the above
//!
//! ## Quick Start
//!
//! ```no_run
//! use udt_testkit::*;
//!
//! let config = TestkitConfig::load(None)?;
//!
//! // Pick a free port for the server under test
//! let addr = config.allocator().hosted_socket_address(&config.default_host)?;
//!
//! // ... start the server on `addr` ...
//! # let server_ready = || true;
//!
//! // Wait for it to come up, but never forever
//! config
//!     .waiter()
//!     .wait_until(|| Ok::<_, std::io::Error>(server_ready()))?;
//! # Ok::<(), TestkitError>(())
//! ```
//!
//! ## Waiting on a socket status
//!
//! ```
//! use udt_testkit::*;
//! use std::cell::Cell;
//! use std::time::Duration;
//!
//! #[derive(Debug, PartialEq)]
//! enum Status { Opened, Connected }
//!
//! struct Probe { id: i32, polls: Cell<u32> }
//!
//! impl ObservableSocket for Probe {
//!     type Status = Status;
//!     type Error = std::io::Error;
//!
//!     fn id(&self) -> i32 { self.id }
//!
//!     fn status(&self) -> std::io::Result<Status> {
//!         self.polls.set(self.polls.get() + 1);
//!         Ok(if self.polls.get() > 2 { Status::Connected } else { Status::Opened })
//!     }
//! }
//!
//! let socket = Probe { id: 1, polls: Cell::new(0) };
//! let waiter = ConditionWaiter::new(WaitPolicy::new(Duration::from_millis(1)).with_attempts(10));
//!
//! let outcome = socket_await(&socket, &Status::Connected, &waiter).unwrap();
//! assert_eq!(outcome.probes, 3);
//! ```

pub mod allocator;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod ping;
pub mod policy;
pub mod random;
pub mod registry;
pub mod waiter;
pub mod watch;

pub use allocator::{AddressAllocator, Allocation, Binder, TcpBinder};
pub use config::TestkitConfig;
pub use error::{ConfigError, ProbeError, Result, TestkitError};
pub use ping::{Platform, ping, ping_command, run_command};
pub use policy::{RetryPolicy, WaitBound, WaitOutcome, WaitPolicy};
pub use random::{random_int_array, random_string, random_suffix};
pub use registry::{ObservableSocket, SocketRegistry, clear, socket_await, socket_index_set, socket_present};
pub use waiter::ConditionWaiter;
pub use watch::{StatusWaiter, StatusWatch};

// Re-export so callers can build tokens without naming tokio-util
pub use tokio_util::sync::CancellationToken;

/// Allocate a free address on `localhost` with the default policy.
pub fn local_socket_address() -> Result<std::net::SocketAddr> {
    AddressAllocator::default().local_socket_address()
}

/// Allocate a free address on `host` with the default policy.
pub fn hosted_socket_address(host: &str) -> Result<std::net::SocketAddr> {
    AddressAllocator::default().hosted_socket_address(host)
}

/// Install the env-configured tracing subscriber for test output.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_test_logging() {
    udt_testkit_log::init();
    let _ = udt_testkit_log::tracing_compat::try_init();
}
