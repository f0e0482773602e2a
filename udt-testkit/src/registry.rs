//! Socket registry and selection-buffer helpers.
//!
//! Selection results arrive as `i32` buffers of socket ids, with zero
//! marking an unused slot. The registry maps ids back to the sockets a test
//! created; it is owned by the test, not shared process-wide.

use crate::error::{ProbeError, Result};
use crate::policy::WaitOutcome;
use crate::waiter::ConditionWaiter;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use tracing::debug;

/// A socket whose id and status can be observed.
pub trait ObservableSocket {
    type Status: PartialEq + Debug;
    type Error: Into<ProbeError>;

    fn id(&self) -> i32;

    /// Current status; errors end any wait on this socket.
    fn status(&self) -> std::result::Result<Self::Status, Self::Error>;
}

/// Sockets keyed by id.
#[derive(Debug)]
pub struct SocketRegistry<S> {
    sockets: HashMap<i32, S>,
}

impl<S: ObservableSocket> SocketRegistry<S> {
    pub fn new() -> Self {
        Self {
            sockets: HashMap::new(),
        }
    }

    /// Register `socket`, returning any socket previously under its id.
    pub fn insert(&mut self, socket: S) -> Option<S> {
        let id = socket.id();
        debug!(id = format_args!("0x{:08x}", id), "Registering socket");
        self.sockets.insert(id, socket)
    }

    pub fn get(&self, id: i32) -> Option<&S> {
        self.sockets.get(&id)
    }

    pub fn remove(&mut self, id: i32) -> Option<S> {
        self.sockets.remove(&id)
    }

    pub fn contains(&self, id: i32) -> bool {
        self.sockets.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.sockets.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Registered sockets whose ids appear in `buffer`.
    pub fn selected<'a>(&'a self, buffer: &'a [i32]) -> impl Iterator<Item = &'a S> + 'a {
        buffer
            .iter()
            .filter(|&&id| id != 0)
            .filter_map(move |id| self.sockets.get(id))
    }
}

impl<S: ObservableSocket> Default for SocketRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Every value in `buffer` as a set.
pub fn socket_index_set(buffer: &[i32]) -> HashSet<i32> {
    buffer.iter().copied().collect()
}

/// Whether `socket`'s id appears in `buffer`.
pub fn socket_present<S: ObservableSocket>(socket: &S, buffer: &[i32]) -> bool {
    buffer.contains(&socket.id())
}

/// Zero every slot.
pub fn clear(buffer: &mut [i32]) {
    buffer.fill(0);
}

/// Wait until `socket` reports `status`.
pub fn socket_await<S: ObservableSocket>(
    socket: &S,
    status: &S::Status,
    waiter: &ConditionWaiter,
) -> Result<WaitOutcome> {
    waiter.wait_for(|| socket.status(), status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TestkitError;
    use crate::policy::WaitPolicy;
    use std::cell::Cell;
    use std::io;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Status {
        Init,
        Opened,
        Listening,
        Broken,
    }

    #[derive(Debug)]
    struct FakeSocket {
        id: i32,
        polls: Cell<u32>,
        listening_after: u32,
    }

    impl FakeSocket {
        fn new(id: i32, listening_after: u32) -> Self {
            Self {
                id,
                polls: Cell::new(0),
                listening_after,
            }
        }
    }

    impl ObservableSocket for FakeSocket {
        type Status = Status;
        type Error = io::Error;

        fn id(&self) -> i32 {
            self.id
        }

        fn status(&self) -> io::Result<Status> {
            let n = self.polls.get() + 1;
            self.polls.set(n);
            match n {
                _ if self.id < 0 => Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed")),
                1 => Ok(Status::Init),
                n if n >= self.listening_after => Ok(Status::Listening),
                _ => Ok(Status::Opened),
            }
        }
    }

    fn waiter() -> ConditionWaiter {
        ConditionWaiter::new(WaitPolicy::new(Duration::from_millis(5)).with_attempts(10))
    }

    #[test]
    fn test_registry_operations() {
        let mut registry = SocketRegistry::new();
        assert!(registry.is_empty());

        registry.insert(FakeSocket::new(7, 1));
        registry.insert(FakeSocket::new(3, 1));
        assert!(registry.insert(FakeSocket::new(7, 2)).is_some());

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec![3, 7]);
        assert!(registry.contains(3));
        assert_eq!(registry.get(7).map(|s| s.listening_after), Some(2));

        assert!(registry.remove(3).is_some());
        assert!(!registry.contains(3));
    }

    #[test]
    fn test_registries_are_independent() {
        let mut a = SocketRegistry::new();
        let b: SocketRegistry<FakeSocket> = SocketRegistry::default();
        a.insert(FakeSocket::new(1, 1));
        assert!(b.get(1).is_none());
    }

    #[test]
    fn test_selected() {
        let mut registry = SocketRegistry::new();
        registry.insert(FakeSocket::new(5, 1));
        registry.insert(FakeSocket::new(9, 1));

        let ids: Vec<i32> = registry.selected(&[0, 9, 4, 0]).map(|s| s.id).collect();
        assert_eq!(ids, vec![9]);
    }

    #[test]
    fn test_buffer_helpers() {
        let socket = FakeSocket::new(0x2a, 1);
        let mut buffer = [0, 0x2a, 5, 5];

        assert_eq!(socket_index_set(&buffer), HashSet::from([0, 0x2a, 5]));
        assert!(socket_present(&socket, &buffer));

        clear(&mut buffer);
        assert_eq!(buffer, [0; 4]);
        assert!(!socket_present(&socket, &buffer));
    }

    #[test]
    fn test_socket_await_reaches_status() {
        let socket = FakeSocket::new(1, 3);
        let outcome = socket_await(&socket, &Status::Listening, &waiter()).unwrap();

        assert_eq!(outcome.probes, 3);
        assert_eq!(socket.polls.get(), 3);
    }

    #[test]
    fn test_socket_await_status_error() {
        let socket = FakeSocket::new(-1, 1);
        let err = socket_await(&socket, &Status::Listening, &waiter()).unwrap_err();
        assert!(matches!(err, TestkitError::ProbeFailed(_)));
    }

    #[test]
    fn test_socket_await_never_reached() {
        let socket = FakeSocket::new(1, u32::MAX);
        let err = socket_await(&socket, &Status::Broken, &waiter()).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(socket.polls.get(), 10);
    }
}
