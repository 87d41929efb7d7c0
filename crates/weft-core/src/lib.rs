#![forbid(unsafe_code)]

//! Core: signals, connections and diagnostics.
//!
//! - [`Signal`]: multicast notification source with reentrancy-safe slots.
//! - [`Connection`]: handle to one registered slot.
//! - [`ScopedConnection`], [`ConnectionBlocker`], [`ConnectionScope`]: RAII
//!   helpers over connections.
//! - [`diagnostics`]: per-thread switches for misuse warnings and tracing.
//!
//! Everything here is single-threaded (`!Send`, `!Sync`).

pub mod connection;
pub mod diagnostics;
mod registry;
pub mod scope;
pub mod signal;

pub use connection::{Connection, ConnectionBlocker, ConnectionId, ScopedConnection};
pub use diagnostics::DiagnosticsConfig;
pub use scope::ConnectionScope;
pub use signal::Signal;
