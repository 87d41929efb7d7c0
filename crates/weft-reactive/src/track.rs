#![forbid(unsafe_code)]

//! Dereference and subscription seams used by bindings and observers.

use crate::observer::Observer;

/// A non-owning handle to a value that can be read and watched.
///
/// Implementors must announce a change on the changing route before they
/// report it on the changed route; bindings ignore a changed notification
/// that was not announced in the same batch.
pub trait Trackable: 'static {
    type Value;

    /// Run `f` on the current value, or return `None` if the target is gone.
    fn with_value<R>(&self, f: impl FnOnce(&Self::Value) -> R) -> Option<R>;

    /// Route the target's notifications into `observer`. Does nothing if the
    /// target is gone.
    fn watch(&self, observer: &mut Observer);

    /// Whether the target is gone.
    fn is_dangling(&self) -> bool;
}

/// Owners and handles that can produce a [`Trackable`] handle to themselves.
pub trait Track {
    type Handle: Trackable;

    fn track(&self) -> Self::Handle;
}
