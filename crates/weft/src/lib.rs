#![forbid(unsafe_code)]

//! weft public facade crate.
//!
//! Re-exports the signal layer ([`core`]) and, with the default `reactive`
//! feature, properties and bindings ([`reactive`]). Most code only needs the
//! [`prelude`].

pub use weft_core as core;
#[cfg(feature = "reactive")]
pub use weft_reactive as reactive;

pub mod prelude {
    pub use weft_core::diagnostics::{self, DiagnosticsConfig};
    pub use weft_core::{
        Connection, ConnectionBlocker, ConnectionId, ConnectionScope, ScopedConnection, Signal,
    };

    #[cfg(feature = "reactive")]
    pub use weft_reactive::{
        Binding, Observer, Property, PropertyRef, Track, Trackable, Tracked, TrackingError,
        TrackingPtr, TrackingRef, ValueProvider, make_binding,
    };
}
