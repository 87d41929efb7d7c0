#![forbid(unsafe_code)]

//! Reactive values for weft.
//!
//! - [`Property`]: an observable value, optionally computed by a
//!   [`ValueProvider`], with two-phase change notification.
//! - [`PropertyRef`]: a weak handle that follows a property's identity.
//! - [`Binding`] / [`make_binding`]: a provider computed from tracked inputs.
//! - [`Observer`]: funnels notifications from many sources into callbacks.
//! - [`Tracked`], [`TrackingPtr`], [`TrackingRef`]: owned objects and
//!   non-owning handles that notice relocation and destruction.
//!
//! # Invariants
//!
//! 1. After any assignment returns, every bound property reads a value
//!    consistent with its inputs.
//! 2. A `value_changed` observer never sees a dependent that still reflects
//!    the pre-assignment inputs.
//! 3. Destroying an input freezes the properties bound to it at their last
//!    value; nothing dangles.

mod batch;
pub mod binding;
pub mod error;
pub mod observer;
pub mod property;
pub mod property_ref;
pub mod provider;
pub mod track;
pub mod tracking;

pub use binding::{Binding, Inputs, Sources, make_binding};
pub use error::TrackingError;
pub use observer::Observer;
pub use property::Property;
pub use property_ref::PropertyRef;
pub use provider::{Callback, ValueProvider};
pub use track::{Track, Trackable};
pub use tracking::{Tracked, TrackingPtr, TrackingRef};
