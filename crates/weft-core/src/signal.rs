#![forbid(unsafe_code)]

//! Multicast signals.
//!
//! [`Signal<A>`] delivers `&A` to every connected slot, in connection order.
//! The slot registry is allocated on first [`connect`](Signal::connect), so an
//! unused signal costs one empty cell and emitting it does nothing.
//!
//! Slots may freely re-enter the signal that is calling them: connect,
//! disconnect, block and emit are all allowed from inside a slot.

use std::cell::OnceCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::connection::{Connection, ScopedConnection};
use crate::registry::{ConnectionTable, Registry, Slot};

/// A multicast notification source carrying `&A`.
///
/// # Invariants
///
/// 1. Slots run in the order they were connected.
/// 2. A slot connected during an emission is not called by that emission.
/// 3. A slot disconnected before its turn in an emission is not called.
/// 4. Blocked slots are skipped but stay connected.
pub struct Signal<A: ?Sized + 'static> {
    registry: OnceCell<Rc<Registry<A>>>,
}

impl<A: ?Sized + 'static> Signal<A> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            registry: OnceCell::new(),
        }
    }

    fn registry(&self) -> &Rc<Registry<A>> {
        self.registry.get_or_init(|| Rc::new(Registry::new()))
    }

    /// Register `slot` and return a handle to it.
    pub fn connect(&self, slot: impl Fn(&A) + 'static) -> Connection {
        let registry = self.registry();
        let slot: Slot<A> = Rc::new(slot);
        let id = registry.connect(slot);
        let strong: Rc<dyn ConnectionTable> = registry.clone();
        let table: Weak<dyn ConnectionTable> = Rc::downgrade(&strong);
        Connection::new(table, id)
    }

    /// Like [`connect`](Self::connect), disconnecting when the guard drops.
    pub fn connect_scoped(&self, slot: impl Fn(&A) + 'static) -> ScopedConnection {
        ScopedConnection::new(self.connect(slot))
    }

    /// Call every active, unblocked slot with `args`.
    pub fn emit(&self, args: &A) {
        if let Some(registry) = self.registry.get() {
            let registry = Rc::clone(registry);
            registry.invoke(args);
        }
    }

    /// Disconnect `connection` if it belongs to this signal.
    pub fn disconnect(&self, connection: &Connection) {
        if self.owns(connection) {
            connection.disconnect();
        }
    }

    /// Set the block flag of `connection`, returning the previous value.
    pub fn block(&self, connection: &Connection, blocked: bool) -> bool {
        connection.block(blocked)
    }

    #[must_use]
    pub fn blocked(&self, connection: &Connection) -> bool {
        connection.blocked()
    }

    /// Disconnect every slot. Slots that are currently running finish their
    /// invocation first.
    pub fn disconnect_all(&self) {
        if let Some(registry) = self.registry.get() {
            let registry = Rc::clone(registry);
            registry.disconnect_all();
        }
    }

    /// Whether `connection` is active and was issued by this signal.
    #[must_use]
    pub fn owns(&self, connection: &Connection) -> bool {
        let Some(registry) = self.registry.get() else {
            return false;
        };
        let table: Rc<dyn ConnectionTable> = registry.clone();
        connection.is_issued_by(&table) && connection.active()
    }

    /// Number of active connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.get().map_or(0, |registry| registry.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connection_count() == 0
    }
}

impl<A: ?Sized + 'static> Default for Signal<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized + 'static> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("connections", &self.connection_count())
            .finish()
    }
}
