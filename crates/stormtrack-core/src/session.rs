//! Sequential, stateful driver over successive `TrackStep` calls.

use ndarray::Array2;
use stormtrack_types::{DisplacementGrid, FieldGrid, IdGrid, LabelGrid, LifeGrid, ObjectRecord, Result, TrackConfig};
use tracing::warn;

use crate::track::{self, StepResult};

/// Default `TimeDiff` implementation: same-day wall-clock minutes between
/// two `(hour, minute)` timestamps, assuming monotonically increasing
/// input. Callers needing day-rollover or DST-aware semantics should pass
/// their own function matching this signature to
/// [`TrackingSession::advance_with`].
pub fn same_day_minutes(prev_hour: u32, prev_minute: u32, cur_hour: u32, cur_minute: u32) -> f64 {
    let prev = (prev_hour * 60 + prev_minute) as f64;
    let cur = (cur_hour * 60 + cur_minute) as f64;
    cur - prev
}

/// Driver-supplied seam for loading one snapshot. This crate ships no
/// implementation; snapshot loading and decoding are an external concern.
pub trait FieldLoader {
    fn load(&mut self, path: &str) -> Result<(FieldGrid, String, u32, u32)>;
}

/// The objects and auxiliary grids produced by one `advance()` call.
#[derive(Debug)]
pub struct StepOutcome {
    pub objects: Vec<ObjectRecord>,
    pub fine_u: DisplacementGrid,
    pub fine_v: DisplacementGrid,
    pub wasarray: IdGrid,
    pub lifearray: LifeGrid,
    pub restarted: bool,
}

/// Threads `prior_objects`/`prior_labels`/timestamp/ID-counter state across
/// successive snapshots, applying the `dt_tolerance` data-gap restart rule.
pub struct TrackingSession {
    config: TrackConfig,
    prior_objects: Vec<ObjectRecord>,
    prior_labels: Option<LabelGrid>,
    prior_mask: Option<Array2<bool>>,
    prior_timestamp: Option<(u32, u32)>,
    next_persistent_id: i64,
}

impl TrackingSession {
    /// Build a new session. `config` must already have passed
    /// `TrackConfig::validate()`.
    pub fn new(config: TrackConfig) -> Self {
        Self {
            config,
            prior_objects: Vec::new(),
            prior_labels: None,
            prior_mask: None,
            prior_timestamp: None,
            next_persistent_id: 1,
        }
    }

    /// Advance by one snapshot, using [`same_day_minutes`] as the
    /// `TimeDiff` implementation.
    #[allow(clippy::too_many_arguments)]
    pub fn advance(
        &mut self,
        new_field: &FieldGrid,
        new_labels: &LabelGrid,
        new_mask: &Array2<bool>,
        xmat: &FieldGrid,
        ymat: &FieldGrid,
        hour: u32,
        minute: u32,
    ) -> Result<StepOutcome> {
        self.advance_with(new_field, new_labels, new_mask, xmat, ymat, hour, minute, same_day_minutes)
    }

    /// Advance by one snapshot with a caller-supplied `TimeDiff` function,
    /// for day-rollover or DST-aware callers.
    #[allow(clippy::too_many_arguments)]
    pub fn advance_with(
        &mut self,
        new_field: &FieldGrid,
        new_labels: &LabelGrid,
        new_mask: &Array2<bool>,
        xmat: &FieldGrid,
        ymat: &FieldGrid,
        hour: u32,
        minute: u32,
        timediff: impl Fn(u32, u32, u32, u32) -> f64,
    ) -> Result<StepOutcome> {
        let mut restarted = false;
        let num_dt = match self.prior_timestamp {
            None => 1.0,
            Some((prev_hour, prev_minute)) => {
                let dtnow = timediff(prev_hour, prev_minute, hour, minute);
                if dtnow > self.config.dt_tolerance {
                    warn!(
                        dtnow,
                        dt_tolerance = self.config.dt_tolerance,
                        "data gap exceeded dt_tolerance, discarding prior state"
                    );
                    self.prior_objects.clear();
                    self.prior_labels = None;
                    self.prior_mask = None;
                    self.next_persistent_id = 1;
                    restarted = true;
                    1.0
                } else {
                    dtnow / self.config.dt
                }
            }
        };

        let StepResult {
            objects,
            fine_u,
            fine_v,
            wasarray,
            lifearray,
        } = track::step(
            &self.prior_objects,
            self.prior_labels.as_ref(),
            self.prior_mask.as_ref(),
            new_field,
            new_labels,
            new_mask,
            xmat,
            ymat,
            &self.config,
            num_dt,
            &mut self.next_persistent_id,
        )?;

        self.prior_objects = objects.clone();
        self.prior_labels = Some(new_labels.clone());
        self.prior_mask = Some(new_mask.clone());
        self.prior_timestamp = Some((hour, minute));

        Ok(StepOutcome {
            objects,
            fine_u,
            fine_v,
            wasarray,
            lifearray,
            restarted,
        })
    }

    /// The objects from the most recently processed snapshot, if any.
    pub fn current_objects(&self) -> &[ObjectRecord] {
        &self.prior_objects
    }
}
