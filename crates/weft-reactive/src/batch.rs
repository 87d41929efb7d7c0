#![forbid(unsafe_code)]

//! Propagation epochs.
//!
//! Every externally triggered change (a plain assignment, attaching a
//! provider, a provider that reports an update on its own) opens a batch.
//! Nested batches opened while one is running share its epoch, so a node that
//! is reached through several paths (a diamond) forwards `value_changing` and
//! recomputes once per epoch.
//!
//! Dedupe flags are tagged with the epoch that set them. A flag left behind
//! by an earlier batch (for example because an input announced a change and
//! then turned out equal) is simply stale and never blocks later batches.

use std::cell::Cell;

thread_local! {
    static EPOCH: Cell<u64> = const { Cell::new(0) };
    static DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Keeps the current batch open until dropped.
pub(crate) struct Batch {
    _private: (),
}

/// Open a batch, starting a new epoch if none is running.
pub(crate) fn begin() -> Batch {
    DEPTH.with(|depth| {
        if depth.get() == 0 {
            EPOCH.with(|epoch| epoch.set(epoch.get().wrapping_add(1)));
        }
        depth.set(depth.get() + 1);
    });
    Batch { _private: () }
}

impl Drop for Batch {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// The epoch of the running batch, or of the last one if none is running.
pub(crate) fn current() -> u64 {
    EPOCH.with(Cell::get)
}

/// Epoch-tagged "already handled in this batch" flag.
#[derive(Debug, Default)]
pub(crate) struct EpochFlag {
    epoch: Cell<Option<u64>>,
}

impl EpochFlag {
    /// Set the flag for the current epoch. Returns `false` if it was already
    /// set in this epoch.
    pub(crate) fn raise(&self) -> bool {
        let now = current();
        self.epoch.replace(Some(now)) != Some(now)
    }

    /// Clear the flag. Returns whether it was set in the current epoch.
    pub(crate) fn take(&self) -> bool {
        self.epoch.take() == Some(current())
    }
}
