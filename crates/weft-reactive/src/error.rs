#![forbid(unsafe_code)]

//! Errors from tracking handles.

// ---------------------------------------------------------------------------
// TrackingError
// ---------------------------------------------------------------------------

/// Error returned when a tracking handle cannot reach its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingError {
    /// The tracked object was destroyed (or the pointer is null).
    Dangling,
    /// The tracked object is mutably borrowed elsewhere.
    Borrowed,
}

impl std::fmt::Display for TrackingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dangling => write!(f, "tracked object is gone"),
            Self::Borrowed => write!(f, "tracked object is already mutably borrowed"),
        }
    }
}

impl std::error::Error for TrackingError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
