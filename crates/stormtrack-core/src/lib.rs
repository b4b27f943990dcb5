//! Per-step object-tracking engine: labeling, block correlation, vector-field
//! smoothing, advection, and identity resolution.
//!
//! The pipeline for one snapshot pair is, in order:
//!
//! 1. [`labeler`] — threshold the scalar field and assign dense connected-
//!    component labels.
//! 2. [`stats`] — compute per-object area/extreme/centroid/bounding-box
//!    statistics directly from the label grid.
//! 3. [`correlator`] — FFT cross-correlation between corresponding tiles of
//!    the prior and current binary masks, giving a coarse displacement
//!    field.
//! 4. [`smoother`] — reject outlier coarse vectors, triangulate the
//!    survivors, and resample onto the fine grid.
//! 5. [`advector`] — shift each prior object's label mask by its mean
//!    displacement.
//! 6. [`identity`] — match current-frame objects against the advected prior
//!    frame by fractional pixel overlap, with a halo fallback for near
//!    misses.
//! 7. [`lineage`] — detect objects that independently inherited the same
//!    prior identity and reassign all but one a fresh identity.
//!
//! [`track`] wires these together for a single pair of snapshots;
//! [`session`] threads the required state (prior objects, prior labels,
//! persistent ID counter, last timestamp) across a whole run and applies the
//! `dt_tolerance` data-gap restart rule.

pub mod advector;
pub mod correlator;
pub mod identity;
pub mod labeler;
pub mod lineage;
pub mod session;
pub mod smoother;
pub mod stats;
pub mod track;

pub use advector::{advect, AdvectedSummary};
pub use correlator::{correlate, CorrelationResult};
pub use identity::resolve as resolve_identity;
pub use labeler::label;
pub use lineage::reconcile as reconcile_lineage;
pub use session::{same_day_minutes, FieldLoader, StepOutcome, TrackingSession};
pub use smoother::{smooth_and_interpolate, Axes};
pub use stats::build_objects;
pub use track::{step, StepResult};
