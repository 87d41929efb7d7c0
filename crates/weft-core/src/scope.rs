#![forbid(unsafe_code)]

//! Grouped connection lifetimes.

use crate::connection::{Connection, ScopedConnection};
use crate::signal::Signal;

/// Collects the connections made on behalf of one logical owner.
///
/// When the scope is dropped every held connection is disconnected, so no
/// slot registered through it fires afterwards.
///
/// # Usage
///
/// ```
/// use weft_core::{ConnectionScope, Signal};
///
/// let clicked = Signal::<u32>::new();
/// let mut scope = ConnectionScope::new();
/// scope.connect(&clicked, |n| println!("clicked {n} times"));
/// clicked.emit(&1);
/// drop(scope);
/// assert!(clicked.is_empty());
/// ```
///
/// # Invariants
///
/// 1. Connections are released in reverse registration order.
/// 2. `clear()` releases everything immediately and leaves the scope reusable.
/// 3. `len()` counts held connections, active or not.
#[derive(Default)]
pub struct ConnectionScope {
    connections: Vec<ScopedConnection>,
}

impl ConnectionScope {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: Vec::new(),
        }
    }

    /// Take ownership of `connection` until the scope is dropped or cleared.
    pub fn hold(&mut self, connection: impl Into<ScopedConnection>) -> &mut Self {
        self.connections.push(connection.into());
        self
    }

    /// Connect `slot` to `signal` and hold the resulting connection.
    pub fn connect<A: ?Sized + 'static>(
        &mut self,
        signal: &Signal<A>,
        slot: impl Fn(&A) + 'static,
    ) -> &mut Self {
        self.hold(signal.connect(slot))
    }

    /// Clones of the held connections.
    #[must_use]
    pub fn connections(&self) -> Vec<Connection> {
        self.connections
            .iter()
            .map(|scoped| scoped.get().clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Disconnect everything held so far.
    pub fn clear(&mut self) {
        while let Some(connection) = self.connections.pop() {
            drop(connection);
        }
    }
}

impl Drop for ConnectionScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for ConnectionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionScope")
            .field("connection_count", &self.connections.len())
            .finish()
    }
}
