//! Error types for the stormtrack object-tracking engine.

use thiserror::Error;

/// Errors surfaced to the caller by the tracking engine.
///
/// Conditions the spec calls "recovered locally" (data gaps, degenerate
/// frames, numeric degeneracy, overflowing shifts) are never constructed as
/// `TrackerError` values — they are handled inline by the component that
/// encounters them and reported through `tracing` instead.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Configuration failed validation before a session could be built.
    #[error("invalid tracker configuration: {0}")]
    ConfigError(String),

    /// Two or more grids that must share a shape disagree.
    #[error("shape mismatch: {left_name} is {left_shape:?}, {right_name} is {right_shape:?}")]
    ShapeMismatch {
        left_name: &'static str,
        left_shape: (usize, usize),
        right_name: &'static str,
        right_shape: (usize, usize),
    },
}

impl TrackerError {
    /// Build a `ConfigError`.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Build a `ShapeMismatch`.
    pub fn shape_mismatch(
        left_name: &'static str,
        left_shape: (usize, usize),
        right_name: &'static str,
        right_shape: (usize, usize),
    ) -> Self {
        Self::ShapeMismatch {
            left_name,
            left_shape,
            right_name,
            right_shape,
        }
    }
}

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
