//! Shared data model, configuration, and error types for the stormtrack
//! object-tracking engine.
//!
//! This crate has no algorithmic code of its own. It defines the vocabulary
//! that `stormtrack-core` builds on:
//!
//! - [`grid`] — grid type aliases (`FieldGrid`, `LabelGrid`,
//!   `DisplacementGrid`) and the [`grid::Connectivity`] kernel used by the
//!   connected-component labeler.
//! - [`object`] — [`object::ObjectRecord`], the per-object record threaded
//!   forward from snapshot to snapshot.
//! - [`config`] — [`config::TrackConfig`], the validated set of tunables for
//!   one tracking run.
//! - [`error`] — [`error::TrackerError`] and the crate's `Result` alias.

pub mod config;
pub mod error;
pub mod grid;
pub mod object;

pub use config::{TrackConfig, WindowMethod};
pub use error::{Result, TrackerError};
pub use grid::{Connectivity, DisplacementGrid, FieldGrid, IdGrid, LabelGrid, LifeGrid};
pub use object::ObjectRecord;
