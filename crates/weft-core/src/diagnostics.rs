#![forbid(unsafe_code)]

//! Runtime diagnostics switches.
//!
//! Misuse that the registry tolerates (blocking or querying a connection that
//! is no longer active) is reported through `tracing` as a warning. Whether
//! those warnings are emitted, and whether propagation is traced at `TRACE`
//! level, is controlled per thread by a [`DiagnosticsConfig`].
//!
//! The initial config for each thread is read from the environment:
//!
//! | Variable                 | Effect                                     |
//! |--------------------------|--------------------------------------------|
//! | `WEFT_WARN_INACTIVE`     | `1`/`true`/`on` enables inactive warnings  |
//! | `WEFT_TRACE_PROPAGATION` | `1`/`true`/`on` enables propagation events |
//!
//! Unset or unparseable values fall back to [`DiagnosticsConfig::default`].

use std::cell::Cell;

use crate::connection::ConnectionId;

/// Environment variable toggling inactive-connection warnings.
pub const ENV_WARN_INACTIVE: &str = "WEFT_WARN_INACTIVE";
/// Environment variable toggling propagation tracing.
pub const ENV_TRACE_PROPAGATION: &str = "WEFT_TRACE_PROPAGATION";

/// Per-thread diagnostics switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    /// Warn when an inactive connection is blocked, unblocked or queried.
    /// Defaults to on in debug builds.
    pub warn_inactive_connections: bool,
    /// Emit `TRACE` events as change notifications travel through the graph.
    pub trace_propagation: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            warn_inactive_connections: cfg!(debug_assertions),
            trace_propagation: false,
        }
    }
}

impl DiagnosticsConfig {
    /// Config with every diagnostic disabled.
    #[must_use]
    pub const fn quiet() -> Self {
        Self {
            warn_inactive_connections: false,
            trace_propagation: false,
        }
    }

    /// Defaults overridden by `WEFT_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(flag) = env_flag(ENV_WARN_INACTIVE) {
            config.warn_inactive_connections = flag;
        }
        if let Some(flag) = env_flag(ENV_TRACE_PROPAGATION) {
            config.trace_propagation = flag;
        }
        config
    }

    #[must_use]
    pub fn with_warn_inactive_connections(mut self, enabled: bool) -> Self {
        self.warn_inactive_connections = enabled;
        self
    }

    #[must_use]
    pub fn with_trace_propagation(mut self, enabled: bool) -> Self {
        self.trace_propagation = enabled;
        self
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    parse_flag(&raw)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

thread_local! {
    static CONFIG: Cell<DiagnosticsConfig> = Cell::new(DiagnosticsConfig::from_env());
}

/// The config active on this thread.
#[must_use]
pub fn current() -> DiagnosticsConfig {
    CONFIG.with(Cell::get)
}

/// Install `config` for this thread, returning the previous one.
pub fn install(config: DiagnosticsConfig) -> DiagnosticsConfig {
    CONFIG.with(|cell| cell.replace(config))
}

/// Run `f` with `config` installed, restoring the previous config afterwards
/// (also when `f` panics).
pub fn with_config<R>(config: DiagnosticsConfig, f: impl FnOnce() -> R) -> R {
    struct Restore(DiagnosticsConfig);

    impl Drop for Restore {
        fn drop(&mut self) {
            install(self.0);
        }
    }

    let _restore = Restore(install(config));
    f()
}

/// Whether propagation tracing is enabled on this thread.
#[must_use]
pub fn trace_propagation() -> bool {
    current().trace_propagation
}

pub(crate) fn warn_inactive(id: ConnectionId, operation: &'static str) {
    if current().warn_inactive_connections {
        tracing::warn!(
            connection_id = id.get(),
            op = operation,
            "operation on inactive connection"
        );
    }
}
