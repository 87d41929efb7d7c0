#![forbid(unsafe_code)]

//! Slot storage behind a `Signal`.
//!
//! # Design
//!
//! A [`Registry`] keeps its entries in a `Vec` sorted by [`ConnectionId`].
//! Ids are handed out from a monotonically increasing counter, so appending
//! keeps the order and lookups are a binary search.
//!
//! Emission walks the vector by index and never holds the `RefCell` borrow
//! while a slot runs. Slots are therefore free to connect, disconnect, block
//! or emit again on the same registry:
//!
//! - connections made while an emission is in flight go to `pending` and are
//!   merged once the outermost emission finishes;
//! - disconnecting an entry that is not currently executing clears its slot
//!   immediately; disconnecting one that is executing marks it for removal
//!   and the slot is cleared when its last invocation frame unwinds;
//! - entries with a cleared slot are compacted away when the outermost
//!   emission finishes.
//!
//! # Invariants
//!
//! 1. `connections` and `pending` are each sorted by id, and every pending id
//!    is greater than every id in `connections`.
//! 2. `depth == 0` implies `pending` is empty and every entry has a slot.
//! 3. A slot closure is never dropped while the `RefCell` is borrowed.
//! 4. An entry's `invoke_depth` counts the frames currently running its slot.
//!
//! # Failure Modes
//!
//! - **Slot panics**: the frame guards still unwind `invoke_depth` and
//!   `depth`, so the registry stays consistent and later emissions work.

use std::cell::RefCell;
use std::rc::Rc;

use crate::connection::ConnectionId;
use crate::diagnostics;

pub(crate) type Slot<A> = Rc<dyn Fn(&A)>;

/// Operations a `Connection` performs on the registry it
/// came from, erased over the argument type.
pub(crate) trait ConnectionTable {
    fn disconnect(&self, id: ConnectionId);
    fn active(&self, id: ConnectionId) -> bool;
    fn block(&self, id: ConnectionId, blocked: bool) -> bool;
    fn blocked(&self, id: ConnectionId) -> bool;
}

struct Entry<A: ?Sized> {
    id: ConnectionId,
    slot: Option<Slot<A>>,
    invoke_depth: u32,
    blocked: bool,
    lazy_disconnect: bool,
}

impl<A: ?Sized> Entry<A> {
    fn new(id: ConnectionId, slot: Slot<A>) -> Self {
        Self {
            id,
            slot: Some(slot),
            invoke_depth: 0,
            blocked: false,
            lazy_disconnect: false,
        }
    }

    fn is_active(&self) -> bool {
        self.slot.is_some() && !self.lazy_disconnect
    }

    /// Clear the slot now, or defer it to the end of the running invocation.
    fn disconnect(&mut self) -> Option<Slot<A>> {
        if self.invoke_depth == 0 {
            self.slot.take()
        } else {
            self.lazy_disconnect = true;
            None
        }
    }
}

struct Slots<A: ?Sized> {
    next_id: u64,
    connections: Vec<Entry<A>>,
    pending: Vec<Entry<A>>,
    depth: u32,
}

fn search<A: ?Sized>(entries: &[Entry<A>], id: ConnectionId) -> Option<usize> {
    entries.binary_search_by_key(&id, |entry| entry.id).ok()
}

impl<A: ?Sized> Slots<A> {
    fn find(&self, id: ConnectionId) -> Option<&Entry<A>> {
        search(&self.connections, id)
            .map(|index| &self.connections[index])
            .or_else(|| search(&self.pending, id).map(|index| &self.pending[index]))
    }

    fn find_mut(&mut self, id: ConnectionId) -> Option<&mut Entry<A>> {
        if let Some(index) = search(&self.connections, id) {
            return Some(&mut self.connections[index]);
        }
        search(&self.pending, id).map(|index| &mut self.pending[index])
    }
}

pub(crate) struct Registry<A: ?Sized> {
    slots: RefCell<Slots<A>>,
}

impl<A: ?Sized> Registry<A> {
    pub(crate) fn new() -> Self {
        Self {
            slots: RefCell::new(Slots {
                next_id: 1,
                connections: Vec::new(),
                pending: Vec::new(),
                depth: 0,
            }),
        }
    }

    pub(crate) fn connect(&self, slot: Slot<A>) -> ConnectionId {
        let mut slots = self.slots.borrow_mut();
        let id = ConnectionId::new(slots.next_id);
        slots.next_id += 1;
        let entry = Entry::new(id, slot);
        if slots.depth == 0 {
            slots.connections.push(entry);
        } else {
            slots.pending.push(entry);
        }
        id
    }

    /// Call every active, unblocked slot in connection order.
    pub(crate) fn invoke(&self, args: &A) {
        let _frame = EmitFrame::enter(self);
        let mut index = 0;
        loop {
            let slot = {
                let mut slots = self.slots.borrow_mut();
                let Some(entry) = slots.connections.get_mut(index) else {
                    break;
                };
                if entry.is_active() && !entry.blocked {
                    entry.invoke_depth += 1;
                    entry.slot.clone()
                } else {
                    None
                }
            };
            if let Some(slot) = slot {
                let _running = SlotFrame {
                    registry: self,
                    index,
                };
                slot(args);
            }
            index += 1;
        }
    }

    pub(crate) fn disconnect_all(&self) {
        let released: Vec<Slot<A>> = {
            let mut slots = self.slots.borrow_mut();
            let slots = &mut *slots;
            if slots.depth == 0 {
                slots
                    .connections
                    .drain(..)
                    .filter_map(|entry| entry.slot)
                    .collect()
            } else {
                slots
                    .connections
                    .iter_mut()
                    .chain(slots.pending.iter_mut())
                    .filter_map(Entry::disconnect)
                    .collect()
            }
        };
        drop(released);
    }

    /// Number of active connections, including ones pending a merge.
    pub(crate) fn len(&self) -> usize {
        let slots = self.slots.borrow();
        slots
            .connections
            .iter()
            .chain(slots.pending.iter())
            .filter(|entry| entry.is_active())
            .count()
    }

    fn finish_slot(&self, index: usize) {
        let released = {
            let mut slots = self.slots.borrow_mut();
            let Some(entry) = slots.connections.get_mut(index) else {
                return;
            };
            entry.invoke_depth = entry.invoke_depth.saturating_sub(1);
            if entry.lazy_disconnect && entry.invoke_depth == 0 {
                entry.slot.take()
            } else {
                None
            }
        };
        drop(released);
    }

    fn finish_emit(&self) {
        let released: Vec<Entry<A>> = {
            let mut slots = self.slots.borrow_mut();
            slots.depth = slots.depth.saturating_sub(1);
            if slots.depth > 0 {
                return;
            }
            let slots = &mut *slots;
            let (kept, mut released): (Vec<_>, Vec<_>) =
                std::mem::take(&mut slots.connections)
                    .into_iter()
                    .partition(|entry| entry.slot.is_some());
            slots.connections = kept;
            let merged = slots.pending.len();
            for entry in slots.pending.drain(..) {
                if entry.is_active() {
                    slots.connections.push(entry);
                } else {
                    released.push(entry);
                }
            }
            if !released.is_empty() || merged > 0 {
                tracing::trace!(
                    released = released.len(),
                    merged,
                    remaining = slots.connections.len(),
                    "compacted signal registry"
                );
            }
            released
        };
        drop(released);
    }
}

impl<A: ?Sized> ConnectionTable for Registry<A> {
    fn disconnect(&self, id: ConnectionId) {
        let released = {
            let mut slots = self.slots.borrow_mut();
            if slots.depth == 0 {
                search(&slots.connections, id)
                    .map(|index| slots.connections.remove(index))
                    .and_then(|entry| entry.slot)
            } else {
                slots.find_mut(id).and_then(Entry::disconnect)
            }
        };
        drop(released);
    }

    fn active(&self, id: ConnectionId) -> bool {
        self.slots
            .borrow()
            .find(id)
            .is_some_and(Entry::is_active)
    }

    fn block(&self, id: ConnectionId, blocked: bool) -> bool {
        let previous = self
            .slots
            .borrow_mut()
            .find_mut(id)
            .filter(|entry| entry.is_active())
            .map(|entry| std::mem::replace(&mut entry.blocked, blocked));
        previous.unwrap_or_else(|| {
            diagnostics::warn_inactive(id, "block");
            true
        })
    }

    fn blocked(&self, id: ConnectionId) -> bool {
        let current = self
            .slots
            .borrow()
            .find(id)
            .filter(|entry| entry.is_active())
            .map(|entry| entry.blocked);
        current.unwrap_or_else(|| {
            diagnostics::warn_inactive(id, "blocked");
            true
        })
    }
}

/// Tracks one level of emission depth on a registry.
struct EmitFrame<'a, A: ?Sized> {
    registry: &'a Registry<A>,
}

impl<'a, A: ?Sized> EmitFrame<'a, A> {
    fn enter(registry: &'a Registry<A>) -> Self {
        registry.slots.borrow_mut().depth += 1;
        Self { registry }
    }
}

impl<A: ?Sized> Drop for EmitFrame<'_, A> {
    fn drop(&mut self) {
        self.registry.finish_emit();
    }
}

/// Tracks one running invocation of the entry at `index`.
///
/// Indices are stable while `depth > 0` because compaction only happens when
/// the outermost emission finishes.
struct SlotFrame<'a, A: ?Sized> {
    registry: &'a Registry<A>,
    index: usize,
}

impl<A: ?Sized> Drop for SlotFrame<'_, A> {
    fn drop(&mut self) {
        self.registry.finish_slot(self.index);
    }
}
