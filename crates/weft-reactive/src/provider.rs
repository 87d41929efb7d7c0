#![forbid(unsafe_code)]

//! The value provider seam.

/// Notification hook handed to a provider by the property it backs.
pub type Callback = Box<dyn Fn()>;

/// A source of values for a bound [`Property`](crate::Property).
///
/// The property installs its callbacks right after it takes ownership of the
/// provider, and drops the provider when it is detached.
///
/// Providers that can announce a change before it happens call the changing
/// callback first and the updated callback afterwards; this lets dependent
/// properties settle in one consistent pass. Providers that only know about
/// changes after the fact may call the updated callback alone.
pub trait ValueProvider<T> {
    /// Current value, or `None` if it cannot be produced right now. The
    /// property keeps its previous value in that case.
    fn get(&self) -> Option<T>;

    /// Called after the provider's value may have changed.
    fn set_updated_callback(&mut self, callback: Callback);

    /// Called when the provider can no longer produce values, for example
    /// because one of its inputs was destroyed. The property detaches.
    fn set_before_invalid_callback(&mut self, callback: Callback);

    /// Called before the provider's value changes.
    fn set_changing_callback(&mut self, callback: Callback) {
        drop(callback);
    }
}
