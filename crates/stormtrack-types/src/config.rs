//! Typed configuration for the tracking engine, with validation.

use crate::error::{Result, TrackerError};
use crate::grid::Connectivity;
use serde::{Deserialize, Serialize};

/// Method used by `BlockCorrelator` to window a tile before cross-correlating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowMethod {
    /// Separable 2-D Tukey (tapered cosine) window.
    #[default]
    Tukey,
    /// No windowing (all-ones).
    Rectangular,
}

/// All tunable parameters for one tracking run.
///
/// Mirrors spec.md §6's configuration list. Values that are purely derived
/// from other fields (`squarehalf`, `fftpixels`, `halosq`) are computed on
/// demand rather than stored, so they can never drift out of sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackConfig {
    /// Time units (e.g. minutes) represented by one snapshot step.
    pub dt: f64,
    /// Maximum time gap, in the same units as `dt`, before prior state is discarded.
    pub dt_tolerance: f64,
    /// Threshold used by the labeler to define an object.
    pub threshold: f64,
    /// If true, objects are cells *under* `threshold`; otherwise *over* it.
    pub under_threshold: bool,
    /// Minimum pixel count for a labeled region to survive.
    pub minpixel: u32,
    /// Side length, in pixels, of the coarse correlation tiles. Must evenly
    /// divide both grid dimensions.
    pub squarelength: u32,
    /// Minimum fractional cover of a correlation tile (as ones) required
    /// before `BlockCorrelator` is invoked on it.
    pub rafraction: f64,
    /// Maximum allowed deviation, per unit `num_dt`, between a displacement
    /// vector and its local neighbourhood mean before it is rejected as an outlier.
    pub dd_tolerance: f64,
    /// Radius, in pixels, of the halo fallback search region.
    pub halopixel: f64,
    /// Minimum normalized overlap fraction required to declare identity continuation.
    pub lapthresh: f64,
    /// Sentinel value a caller's Serializer should use in place of "no value".
    /// Unused internally — see SPEC_FULL.md §3 for the representation decision.
    pub misval: i64,
    /// Window method used by `BlockCorrelator`.
    pub window: WindowMethod,
    /// Retained for a caller's Serializer; this crate performs no radar enrichment.
    pub doradar: bool,
    /// Optional secondary thresholds for per-object `extra_area` counts.
    #[serde(default)]
    pub extra_thresholds: Vec<f64>,
    /// Connectivity kernel for connected-component labeling. Not serialized;
    /// constructed via `Connectivity::four_connected()`/`eight_connected()`.
    #[serde(skip, default = "Connectivity::eight_connected")]
    pub connectivity: Connectivity,
}

impl TrackConfig {
    /// Half the tile side length; the pitch of the coarse correlation grid.
    pub fn squarehalf(&self) -> u32 {
        self.squarelength / 2
    }

    /// Minimum number of thresholded pixels required in a tile before
    /// `BlockCorrelator` is invoked on it.
    pub fn fftpixels(&self) -> f64 {
        (self.squarelength as f64).powi(2) * self.rafraction
    }

    /// Squared halo radius, in pixels.
    pub fn halosq(&self) -> f64 {
        self.halopixel * self.halopixel
    }

    /// Validate this configuration against itself and, if given, a concrete grid shape.
    ///
    /// Raises the `ConfigError` conditions from SPEC_FULL.md §7.
    pub fn validate(&self, grid_shape: Option<(usize, usize)>) -> Result<()> {
        if self.minpixel < 1 {
            return Err(TrackerError::config("minpixel must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.lapthresh) {
            return Err(TrackerError::config("lapthresh must be in [0, 1]"));
        }
        if self.squarelength == 0 {
            return Err(TrackerError::config("squarelength must be > 0"));
        }
        if self.dt <= 0.0 {
            return Err(TrackerError::config("dt must be > 0"));
        }
        if self.dt_tolerance < 0.0 {
            return Err(TrackerError::config("dt_tolerance must be >= 0"));
        }
        if self.rafraction < 0.0 {
            return Err(TrackerError::config("rafraction must be >= 0"));
        }

        if let Some((h, w)) = grid_shape {
            let sl = self.squarelength as usize;
            if h % sl != 0 || w % sl != 0 {
                return Err(TrackerError::config(format!(
                    "grid shape ({h}, {w}) is not a multiple of squarelength ({sl})"
                )));
            }
        }

        Ok(())
    }
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            dt: 5.0,
            dt_tolerance: 15.0,
            threshold: 3.0,
            under_threshold: false,
            minpixel: 4,
            squarelength: 100,
            rafraction: 0.01,
            dd_tolerance: 3.0,
            halopixel: 5.0,
            lapthresh: 0.6,
            misval: -999,
            window: WindowMethod::Tukey,
            doradar: false,
            extra_thresholds: Vec::new(),
            connectivity: Connectivity::eight_connected(),
        }
    }
}
