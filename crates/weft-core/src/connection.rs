#![forbid(unsafe_code)]

//! Handles to registered slots.
//!
//! A [`Connection`] is a cheap, clonable handle that refers back to the
//! registry that issued it through a `Weak` pointer. Every operation on a
//! handle whose registry is gone, or whose entry was disconnected, is a no-op
//! that reports the connection as inactive.
//!
//! [`ScopedConnection`] and [`ConnectionBlocker`] are RAII wrappers: the first
//! disconnects on drop, the second blocks for its lifetime and then restores
//! the previous block state.

use std::fmt;
use std::rc::{Rc, Weak};

use crate::diagnostics;
use crate::registry::ConnectionTable;
use crate::signal::Signal;

/// Identifier of a connection within its signal.
///
/// Ids start at 1, increase monotonically per signal and are never reused.
/// `ConnectionId::default()` (zero) is never issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to a slot registered on a [`Signal`].
///
/// A default-constructed connection is permanently inactive.
#[derive(Clone, Default)]
pub struct Connection {
    table: Option<Weak<dyn ConnectionTable>>,
    id: ConnectionId,
}

impl Connection {
    pub(crate) fn new(table: Weak<dyn ConnectionTable>, id: ConnectionId) -> Self {
        Self {
            table: Some(table),
            id,
        }
    }

    fn table(&self) -> Option<Rc<dyn ConnectionTable>> {
        self.table.as_ref()?.upgrade()
    }

    /// The id assigned by the issuing signal.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the slot is still registered and not awaiting removal.
    #[must_use]
    pub fn active(&self) -> bool {
        self.table().is_some_and(|table| table.active(self.id))
    }

    /// Remove the slot. Idempotent.
    ///
    /// When called from inside the slot itself the slot finishes its current
    /// invocation and is released afterwards.
    pub fn disconnect(&self) {
        if let Some(table) = self.table() {
            table.disconnect(self.id);
        }
    }

    /// Set the block flag and return its previous value.
    ///
    /// On an inactive connection this logs a warning and returns `true`.
    pub fn block(&self, blocked: bool) -> bool {
        match self.table() {
            Some(table) => table.block(self.id, blocked),
            None => {
                diagnostics::warn_inactive(self.id, "block");
                true
            }
        }
    }

    /// Shorthand for `block(false)`.
    pub fn unblock(&self) -> bool {
        self.block(false)
    }

    /// Whether emissions currently skip this slot.
    ///
    /// On an inactive connection this logs a warning and returns `true`.
    #[must_use]
    pub fn blocked(&self) -> bool {
        match self.table() {
            Some(table) => table.blocked(self.id),
            None => {
                diagnostics::warn_inactive(self.id, "blocked");
                true
            }
        }
    }

    /// Whether this connection is active on `signal`.
    #[must_use]
    pub fn belongs_to<A: ?Sized + 'static>(&self, signal: &Signal<A>) -> bool {
        signal.owns(self)
    }

    pub(crate) fn is_issued_by(&self, table: &Rc<dyn ConnectionTable>) -> bool {
        self.table()
            .is_some_and(|own| std::ptr::addr_eq(Rc::as_ptr(&own), Rc::as_ptr(table)))
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("active", &self.active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ScopedConnection
// ---------------------------------------------------------------------------

/// A connection that is disconnected when this guard is dropped or replaced.
#[derive(Debug, Default)]
#[must_use = "dropping a ScopedConnection disconnects it immediately"]
pub struct ScopedConnection {
    connection: Connection,
}

impl ScopedConnection {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// The wrapped connection.
    pub fn get(&self) -> &Connection {
        &self.connection
    }

    #[must_use]
    pub fn active(&self) -> bool {
        self.connection.active()
    }

    /// Disconnect the current connection and take ownership of `connection`.
    pub fn replace(&mut self, connection: Connection) {
        self.connection.disconnect();
        self.connection = connection;
    }

    /// Give up ownership without disconnecting.
    pub fn release(&mut self) -> Connection {
        std::mem::take(&mut self.connection)
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }
}

impl From<Connection> for ScopedConnection {
    fn from(connection: Connection) -> Self {
        Self::new(connection)
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.connection.disconnect();
    }
}

// ---------------------------------------------------------------------------
// ConnectionBlocker
// ---------------------------------------------------------------------------

/// Blocks a connection for the guard's lifetime.
///
/// On drop the block flag is restored to whatever it was when the guard was
/// created, so blockers nest.
#[derive(Debug)]
#[must_use = "the connection is unblocked again as soon as the blocker is dropped"]
pub struct ConnectionBlocker {
    connection: Connection,
    was_blocked: bool,
}

impl ConnectionBlocker {
    pub fn new(connection: Connection) -> Self {
        let was_blocked = connection.block(true);
        Self {
            connection,
            was_blocked,
        }
    }

    /// The blocked connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl Drop for ConnectionBlocker {
    fn drop(&mut self) {
        self.connection.block(self.was_blocked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn quiet() -> crate::diagnostics::DiagnosticsConfig {
        crate::diagnostics::DiagnosticsConfig::quiet()
    }

    #[test]
    fn default_connection_is_inactive() {
        crate::diagnostics::with_config(quiet(), || {
            let connection = Connection::default();
            assert!(!connection.active());
            assert!(connection.blocked());
            assert!(connection.block(false));
            connection.disconnect();
            assert_eq!(connection.id(), ConnectionId::default());
        });
    }

    #[test]
    fn connection_ids_are_monotonic_and_never_reused() {
        let signal = Signal::<()>::new();
        let first = signal.connect(|()| {});
        let second = signal.connect(|()| {});
        first.disconnect();
        let third = signal.connect(|()| {});
        assert_eq!(first.id().get(), 1);
        assert!(second.id() > first.id());
        assert!(third.id() > second.id());
    }

    #[test]
    fn scoped_connection_disconnects_on_drop() {
        let signal = Signal::<i32>::new();
        let calls = Rc::new(Cell::new(0));
        {
            let calls = Rc::clone(&calls);
            let _scoped = ScopedConnection::new(signal.connect(move |_| calls.set(calls.get() + 1)));
            signal.emit(&1);
        }
        signal.emit(&2);
        assert_eq!(calls.get(), 1);
        assert!(signal.is_empty());
    }

    #[test]
    fn scoped_connection_replace_disconnects_previous() {
        let signal = Signal::<()>::new();
        let first = signal.connect(|()| {});
        let second = signal.connect(|()| {});
        let mut scoped = ScopedConnection::from(first.clone());
        scoped.replace(second.clone());
        assert!(!first.active());
        assert!(second.active());
        assert_eq!(scoped.get().id(), second.id());
    }

    #[test]
    fn scoped_connection_release_keeps_slot() {
        let signal = Signal::<()>::new();
        let mut scoped = ScopedConnection::new(signal.connect(|()| {}));
        let released = scoped.release();
        drop(scoped);
        assert!(released.active());
    }

    #[test]
    fn blocker_restores_previous_state() {
        let signal = Signal::<()>::new();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let connection = signal.connect(move |()| counter.set(counter.get() + 1));
        {
            let _outer = ConnectionBlocker::new(connection.clone());
            assert!(connection.blocked());
            {
                let _inner = ConnectionBlocker::new(connection.clone());
                signal.emit(&());
            }
            assert!(connection.blocked());
            signal.emit(&());
        }
        assert!(!connection.blocked());
        signal.emit(&());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn blocker_on_inactive_connection_is_harmless() {
        crate::diagnostics::with_config(quiet(), || {
            let blocker = ConnectionBlocker::new(Connection::default());
            assert!(!blocker.connection().active());
        });
    }

    #[test]
    fn belongs_to_checks_issuing_signal() {
        let a = Signal::<u8>::new();
        let b = Signal::<u8>::new();
        let connection = a.connect(|_| {});
        assert!(connection.belongs_to(&a));
        assert!(!connection.belongs_to(&b));
        connection.disconnect();
        assert!(!connection.belongs_to(&a));
    }

    #[test]
    fn connection_outlives_signal() {
        crate::diagnostics::with_config(quiet(), || {
            let connection = {
                let signal = Signal::<()>::new();
                signal.connect(|()| {})
            };
            assert!(!connection.active());
            assert!(connection.blocked());
            connection.disconnect();
        });
    }

    #[test]
    fn display_formats_id() {
        assert_eq!(ConnectionId::new(7).to_string(), "#7");
    }
}
