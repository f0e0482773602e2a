//! Local address allocation.
//!
//! Asks the OS for an ephemeral port on a host by binding a listener to
//! port 0, reading the bound address back, and closing the listener again.
//! The result is advisory: the port was free when probed, nothing keeps it
//! reserved afterwards, and concurrent allocations race on the OS.
//!
//! ## Example
//!
//! ```rust,no_run
//! use udt_testkit::AddressAllocator;
//!
//! let allocator = AddressAllocator::default();
//! let addr = allocator.local_socket_address()?;
//! assert!(addr.ip().is_loopback());
//! # Ok::<(), udt_testkit::TestkitError>(())
//! ```

use crate::error::{Result, TestkitError};
use crate::policy::RetryPolicy;
use socket2::{Domain, Socket, Type};
use std::io;
use std::future::Future;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// Default listen backlog for probe sockets.
pub const DEFAULT_BACKLOG: i32 = 3;

/// OS facility used by the allocator.
///
/// Split into steps so tests can fail any one of them.
pub trait Binder {
    /// Listener handle held between bind and close.
    type Listener;

    /// Resolve `host` to the address to bind.
    fn resolve(&self, host: &str) -> io::Result<IpAddr> {
        (host, 0)
            .to_socket_addrs()?
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no address for host '{host}'"))
            })
    }

    /// Resolve `host` without blocking the runtime thread.
    ///
    /// Used by the async allocation path. Binders that override
    /// [`resolve`](Self::resolve) should override this too.
    fn resolve_async(&self, host: &str) -> impl Future<Output = io::Result<IpAddr>> + Send {
        let host = host.to_string();
        async move {
            tokio::net::lookup_host((host.as_str(), 0))
                .await?
                .next()
                .map(|addr| addr.ip())
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, format!("no address for host '{host}'"))
                })
        }
    }

    /// Open a listener on `ip` with an OS-chosen port.
    fn bind(&self, ip: IpAddr) -> io::Result<Self::Listener>;

    /// Address the listener ended up on.
    fn local_addr(&self, listener: &Self::Listener) -> io::Result<SocketAddr>;

    /// Release the listener.
    fn close(&self, listener: Self::Listener) -> io::Result<()>;
}

/// TCP listener binder.
#[derive(Debug, Clone, Copy)]
pub struct TcpBinder {
    backlog: i32,
}

impl TcpBinder {
    pub fn new(backlog: i32) -> Self {
        Self { backlog }
    }
}

impl Default for TcpBinder {
    fn default() -> Self {
        Self::new(DEFAULT_BACKLOG)
    }
}

impl Binder for TcpBinder {
    type Listener = Socket;

    fn bind(&self, ip: IpAddr) -> io::Result<Socket> {
        let addr = SocketAddr::new(ip, 0);
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
        socket.bind(&addr.into())?;
        socket.listen(self.backlog)?;
        Ok(socket)
    }

    fn local_addr(&self, listener: &Socket) -> io::Result<SocketAddr> {
        listener.local_addr()?.as_socket().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Unsupported, "listener bound to a non-IP address")
        })
    }

    fn close(&self, listener: Socket) -> io::Result<()> {
        drop(listener);
        Ok(())
    }
}

/// A successful allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Address that was free when probed.
    pub addr: SocketAddr,
    /// Probes used, including the successful one.
    pub attempts: u32,
}

/// Bounded retry-with-backoff over a [`Binder`].
#[derive(Debug, Clone)]
pub struct AddressAllocator<B = TcpBinder> {
    binder: B,
    policy: RetryPolicy,
    cancel: Option<CancellationToken>,
}

impl AddressAllocator<TcpBinder> {
    /// Allocator using TCP listeners.
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_binder(TcpBinder::default(), policy)
    }
}

impl Default for AddressAllocator<TcpBinder> {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl<B: Binder> AddressAllocator<B> {
    pub fn with_binder(binder: B, policy: RetryPolicy) -> Self {
        Self {
            binder,
            policy,
            cancel: None,
        }
    }

    /// Abort between attempts once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn binder(&self) -> &B {
        &self.binder
    }

    /// Single allocation attempt.
    ///
    /// Returns `None` if resolving, binding, or reading the address fails.
    /// A failed close is logged and does not discard the address.
    pub fn try_allocate(&self, host: &str) -> Option<SocketAddr> {
        self.open(host, self.binder.resolve(host))
    }

    /// Bind, read back and close on an already resolved address.
    fn open(&self, host: &str, resolved: io::Result<IpAddr>) -> Option<SocketAddr> {
        let listener = match resolved.and_then(|ip| self.binder.bind(ip)) {
            Ok(listener) => listener,
            Err(e) => {
                error!(host, error = %e, "Failed to find address");
                return None;
            }
        };

        let addr = self.binder.local_addr(&listener);

        if let Err(e) = self.binder.close(listener) {
            error!(host, error = %e, "Failed to close probe socket");
        }

        match addr {
            Ok(addr) => Some(addr),
            Err(e) => {
                error!(host, error = %e, "Failed to read bound address");
                None
            }
        }
    }

    fn ensure_live(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(TestkitError::Cancelled),
            _ => Ok(()),
        }
    }

    fn exhausted(&self, host: &str, attempts: u32) -> TestkitError {
        warn!(host, attempts, "Address allocation budget exhausted");
        TestkitError::AllocationExhausted {
            host: host.to_string(),
            attempts,
        }
    }

    /// One attempt of the retry loop; `Ok(None)` means "back off and retry".
    fn step(&self, host: &str, accept: &dyn Fn(&SocketAddr) -> bool) -> Result<Option<SocketAddr>> {
        self.ensure_live()?;
        Ok(self.try_allocate(host).filter(|addr| {
            let fresh = accept(addr);
            if !fresh {
                debug!(host, addr = %addr, "Discarding duplicate address");
            }
            fresh
        }))
    }

    fn backoff(&self, host: &str, attempts: u32) -> Option<Duration> {
        if !self.policy.allows_another(attempts) {
            return None;
        }
        let delay = self.policy.interval();
        debug!(host, attempt = attempts, delay = ?delay, "Allocation attempt failed, waiting before retry");
        Some(delay)
    }

    fn allocate_filtered(&self, host: &str, accept: &dyn Fn(&SocketAddr) -> bool) -> Result<Allocation> {
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            if let Some(addr) = self.step(host, accept)? {
                trace!(host, addr = %addr, attempts, "Allocated address");
                return Ok(Allocation { addr, attempts });
            }

            match self.backoff(host, attempts) {
                Some(delay) => std::thread::sleep(delay),
                None => return Err(self.exhausted(host, attempts)),
            }
        }
    }

    /// Allocate an address on `host`, retrying per the policy.
    ///
    /// Fails with [`TestkitError::AllocationExhausted`] after exactly
    /// `max_attempts` failed probes. There is no pause after the last one.
    pub fn allocate(&self, host: &str) -> Result<Allocation> {
        self.allocate_filtered(host, &|_| true)
    }

    /// Allocate and return only the address.
    pub fn hosted_socket_address(&self, host: &str) -> Result<SocketAddr> {
        self.allocate(host).map(|allocation| allocation.addr)
    }

    /// Allocate an address on `localhost`.
    pub fn local_socket_address(&self) -> Result<SocketAddr> {
        self.hosted_socket_address("localhost")
    }

    /// Allocate `count` distinct addresses on `host`.
    ///
    /// Each address gets the full attempt budget; a duplicate of an earlier
    /// address counts as a failed attempt.
    pub fn allocate_many(&self, host: &str, count: usize) -> Result<Vec<SocketAddr>> {
        let mut addrs: Vec<SocketAddr> = Vec::with_capacity(count);
        while addrs.len() < count {
            let seen = addrs.clone();
            let allocation = self.allocate_filtered(host, &move |addr| !seen.contains(addr))?;
            addrs.push(allocation.addr);
        }
        Ok(addrs)
    }

    /// Async variant of [`allocate`](Self::allocate).
    ///
    /// Host resolution goes through [`Binder::resolve_async`], so name lookups
    /// do not hold the runtime thread. Bind and close run inline. The pauses
    /// yield to the runtime and race the cancellation token.
    pub async fn allocate_async(&self, host: &str) -> Result<Allocation> {
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            self.ensure_live()?;
            let resolved = self.binder.resolve_async(host).await;
            if let Some(addr) = self.open(host, resolved) {
                trace!(host, addr = %addr, attempts, "Allocated address");
                return Ok(Allocation { addr, attempts });
            }

            let Some(delay) = self.backoff(host, attempts) else {
                return Err(self.exhausted(host, attempts));
            };

            match &self.cancel {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => return Err(TestkitError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                },
                None => tokio::time::sleep(delay).await,
            }
        }
    }
}
