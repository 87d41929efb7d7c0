#![forbid(unsafe_code)]

//! Multi-source change observation.
//!
//! An [`Observer`] subscribes to the change and destruction signals of any
//! number of [`Trackable`] sources and funnels them into three callbacks. It
//! is the plumbing under [`Binding`](crate::Binding) and is also useful on
//! its own, for example to redraw when any of several properties change.
//!
//! # Invariants
//!
//! 1. Callbacks may be replaced at any time, including from inside a
//!    callback; the replacement takes effect on the next notification.
//! 2. Dropping the observer disconnects every subscription it made.
//! 3. A notification that arrives after the observer was dropped is ignored.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use weft_core::{ScopedConnection, Signal};

use crate::track::Trackable;

type Hook = Rc<dyn Fn()>;

#[derive(Default)]
struct Hooks {
    changing: RefCell<Option<Hook>>,
    changed: RefCell<Option<Hook>>,
    destroyed: RefCell<Option<Hook>>,
}

#[derive(Clone, Copy)]
enum Phase {
    Changing,
    Changed,
    Destroyed,
}

impl Hooks {
    fn slot(&self, phase: Phase) -> &RefCell<Option<Hook>> {
        match phase {
            Phase::Changing => &self.changing,
            Phase::Changed => &self.changed,
            Phase::Destroyed => &self.destroyed,
        }
    }

    fn fire(&self, phase: Phase) {
        let hook = self.slot(phase).borrow().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

/// Watches trackable sources and forwards their notifications.
#[derive(Default)]
pub struct Observer {
    hooks: Rc<Hooks>,
    connections: Vec<ScopedConnection>,
}

impl Observer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `source`. Dangling sources are ignored.
    pub fn watch<S: Trackable>(&mut self, source: &S) -> &mut Self {
        source.watch(self);
        self
    }

    /// Called when a watched source is about to change.
    pub fn set_changing_callback(&self, callback: impl Fn() + 'static) {
        *self.hooks.changing.borrow_mut() = Some(Rc::new(callback));
    }

    /// Called after a watched source changed.
    pub fn set_changed_callback(&self, callback: impl Fn() + 'static) {
        *self.hooks.changed.borrow_mut() = Some(Rc::new(callback));
    }

    /// Called when a watched source is being destroyed.
    pub fn set_destroyed_callback(&self, callback: impl Fn() + 'static) {
        *self.hooks.destroyed.borrow_mut() = Some(Rc::new(callback));
    }

    /// Route `signal` to the changing callback.
    pub fn forward_changing<A: ?Sized + 'static>(&mut self, signal: &Signal<A>) {
        self.forward(signal, Phase::Changing);
    }

    /// Route `signal` to the changed callback.
    pub fn forward_changed<A: ?Sized + 'static>(&mut self, signal: &Signal<A>) {
        self.forward(signal, Phase::Changed);
    }

    /// Route `signal` to the destroyed callback.
    pub fn forward_destroyed<A: ?Sized + 'static>(&mut self, signal: &Signal<A>) {
        self.forward(signal, Phase::Destroyed);
    }

    fn forward<A: ?Sized + 'static>(&mut self, signal: &Signal<A>, phase: Phase) {
        let hooks: Weak<Hooks> = Rc::downgrade(&self.hooks);
        let connection = signal.connect(move |_| {
            if let Some(hooks) = hooks.upgrade() {
                hooks.fire(phase);
            }
        });
        self.connections.push(connection.into());
    }

    /// Number of signal subscriptions currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Drop every subscription. Callbacks stay installed.
    pub fn clear(&mut self) {
        self.connections.clear();
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("subscriptions", &self.connections.len())
            .finish()
    }
}
