//! Wires the Labeler output, BlockCorrelator, VectorFieldSmoother, Advector,
//! IdentityResolver, and LineageReconciler together for one snapshot pair.

use std::collections::HashMap;

use ndarray::Array2;
use rayon::prelude::*;
use stormtrack_types::{
    DisplacementGrid, FieldGrid, IdGrid, LabelGrid, LifeGrid, ObjectRecord, Result, TrackConfig,
    TrackerError, WindowMethod,
};
use tracing::{info, warn};

use crate::{advector, correlator, identity, lineage, smoother, stats};

/// Everything one `step()` call produces.
#[derive(Debug)]
pub struct StepResult {
    pub objects: Vec<ObjectRecord>,
    pub fine_u: DisplacementGrid,
    pub fine_v: DisplacementGrid,
    pub wasarray: IdGrid,
    pub lifearray: LifeGrid,
}

/// Advance the tracker by one snapshot pair.
///
/// `prior_labels`/`prior_mask` are `None` on the first call in a session, or
/// whenever `TrackingSession` has just discarded state after a data gap.
#[allow(clippy::too_many_arguments)]
pub fn step(
    prior_objects: &[ObjectRecord],
    prior_labels: Option<&LabelGrid>,
    prior_mask: Option<&Array2<bool>>,
    new_field: &FieldGrid,
    new_labels: &LabelGrid,
    new_mask: &Array2<bool>,
    xmat: &FieldGrid,
    ymat: &FieldGrid,
    config: &TrackConfig,
    num_dt: f64,
    next_persistent_id: &mut i64,
) -> Result<StepResult> {
    let shape = new_field.dim();
    check_shape("new_field", shape, "new_labels", new_labels.dim())?;
    check_shape("new_field", shape, "new_mask", new_mask.dim())?;
    check_shape("new_field", shape, "xmat", xmat.dim())?;
    check_shape("new_field", shape, "ymat", ymat.dim())?;
    if let Some(pl) = prior_labels {
        check_shape("new_field", shape, "prior_labels", pl.dim())?;
    }
    if let Some(pm) = prior_mask {
        check_shape("new_field", shape, "prior_mask", pm.dim())?;
    }

    let mut new_objects = stats::build_objects(
        new_labels,
        new_field,
        xmat,
        ymat,
        config.under_threshold,
        &config.extra_thresholds,
    );

    let no_prior_state = prior_objects.is_empty()
        || prior_labels.map(|l| l.iter().copied().max().unwrap_or(0)).unwrap_or(0) <= 0;
    let no_new_labels = new_labels.iter().copied().max().unwrap_or(0) <= 0;

    if no_prior_state || no_new_labels {
        if no_new_labels {
            warn!("degenerate frame: no labels found, all prior state dropped for this step");
        }
        let (wasarray, lifearray) = assign_fresh_identities(&mut new_objects, new_labels, next_persistent_id);
        let fine_u = DisplacementGrid::zeros(shape);
        let fine_v = DisplacementGrid::zeros(shape);
        return Ok(StepResult {
            objects: new_objects,
            fine_u,
            fine_v,
            wasarray,
            lifearray,
        });
    }

    let prior_labels = prior_labels.expect("checked above");
    let prior_mask = prior_mask.expect("checked above");

    let (coarse_u, coarse_v, coarse_axes) =
        correlate_coarse_grid(prior_mask, new_mask, xmat, ymat, config);
    let fine_axes = smoother::Axes {
        x: xmat.row(0).to_vec(),
        y: ymat.column(0).to_vec(),
    };

    let (fine_u, fine_v) = smoother::smooth_and_interpolate(
        &coarse_u,
        &coarse_v,
        &coarse_axes,
        &fine_axes,
        config.dd_tolerance,
        num_dt,
    );

    let (advected_labels, advected_summary) =
        advector::advect(prior_labels, prior_objects, &fine_u, &fine_v, xmat, ymat);

    let prior_by_storm: HashMap<i64, &ObjectRecord> =
        prior_objects.iter().map(|o| (o.storm, o)).collect();

    let (mut wasarray, mut lifearray) = identity::resolve(
        new_labels,
        &mut new_objects,
        &advected_labels,
        &advected_summary,
        &prior_by_storm,
        xmat,
        ymat,
        config.lapthresh,
        config.halosq(),
        next_persistent_id,
    );

    lineage::reconcile(&mut new_objects, &mut wasarray, new_labels, next_persistent_id);

    for obj in &mut new_objects {
        let (sum_dx, sum_dy, count) = new_labels.indexed_iter().fold(
            (0.0, 0.0, 0u32),
            |(sdx, sdy, n), ((r, c), &label)| {
                if label as i64 == obj.storm {
                    (sdx + fine_u[[r, c]], sdy + fine_v[[r, c]], n + 1)
                } else {
                    (sdx, sdy, n)
                }
            },
        );
        if count > 0 {
            obj.dx = sum_dx / count as f64 / num_dt;
            obj.dy = sum_dy / count as f64 / num_dt;
        }
    }

    info!(objects = new_objects.len(), "track step complete");

    Ok(StepResult {
        objects: new_objects,
        fine_u,
        fine_v,
        wasarray,
        lifearray,
    })
}

fn assign_fresh_identities(
    objects: &mut [ObjectRecord],
    new_labels: &LabelGrid,
    next_persistent_id: &mut i64,
) -> (IdGrid, LifeGrid) {
    let (h, w) = new_labels.dim();
    let mut wasarray = IdGrid::zeros((h, w));
    let mut lifearray = LifeGrid::zeros((h, w));

    let mut order: Vec<usize> = (0..objects.len()).collect();
    order.sort_by_key(|&i| objects[i].storm);

    for idx in order {
        objects[idx].was = *next_persistent_id;
        objects[idx].life = 1;
        objects[idx].wasdist = None;
        *next_persistent_id += 1;

        let storm = objects[idx].storm;
        let was = objects[idx].was;
        for ((r, c), &label) in new_labels.indexed_iter() {
            if label as i64 == storm {
                wasarray[[r, c]] = was;
                lifearray[[r, c]] = 1;
            }
        }
    }

    (wasarray, lifearray)
}

/// Tile `prior_mask`/`new_mask` at pitch `squarehalf` into `squarelength`
/// sized squares and invoke `BlockCorrelator` wherever both tiles clear
/// `fftpixels`. Runs over a `rayon` parallel iterator since each tile's
/// correlation is independent.
fn correlate_coarse_grid(
    prior_mask: &Array2<bool>,
    new_mask: &Array2<bool>,
    xmat: &FieldGrid,
    ymat: &FieldGrid,
    config: &TrackConfig,
) -> (DisplacementGrid, DisplacementGrid, smoother::Axes) {
    let (h, w) = prior_mask.dim();
    let squarehalf = config.squarehalf() as usize;
    let squarelength = config.squarelength as usize;
    let fftpixels = config.fftpixels();

    let ny = h / squarehalf - 1;
    let nx = w / squarehalf - 1;

    let coarse_axes = smoother::Axes {
        x: (0..nx).map(|j| xmat[[0, squarehalf * (j + 1)]]).collect(),
        y: (0..ny).map(|i| ymat[[squarehalf * (i + 1), 0]]).collect(),
    };

    let results: Vec<((usize, usize), f64, f64)> = (0..ny)
        .into_par_iter()
        .flat_map(|i| {
            (0..nx)
                .into_par_iter()
                .map(move |j| (i, j))
        })
        .map(|(i, j)| {
            let row0 = squarehalf * i;
            let col0 = squarehalf * j;
            let old_tile = prior_mask
                .slice(ndarray::s![row0..row0 + squarelength, col0..col0 + squarelength])
                .mapv(|b| if b { 1.0 } else { 0.0 });
            let new_tile = new_mask
                .slice(ndarray::s![row0..row0 + squarelength, col0..col0 + squarelength])
                .mapv(|b| if b { 1.0 } else { 0.0 });

            let old_count = old_tile.iter().sum::<f64>();
            let new_count = new_tile.iter().sum::<f64>();

            if old_count < fftpixels || new_count < fftpixels {
                ((i, j), f64::NAN, f64::NAN)
            } else {
                match correlator::correlate(&old_tile, &new_tile, WindowMethod::Tukey) {
                    Ok(result) => ((i, j), result.dx as f64, result.dy as f64),
                    Err(_) => ((i, j), f64::NAN, f64::NAN),
                }
            }
        })
        .collect();

    let mut coarse_u = DisplacementGrid::from_elem((ny, nx), f64::NAN);
    let mut coarse_v = DisplacementGrid::from_elem((ny, nx), f64::NAN);
    for ((i, j), u, v) in results {
        coarse_u[[i, j]] = u;
        coarse_v[[i, j]] = v;
    }

    (coarse_u, coarse_v, coarse_axes)
}

fn check_shape(
    left_name: &'static str,
    left_shape: (usize, usize),
    right_name: &'static str,
    right_shape: (usize, usize),
) -> Result<()> {
    if left_shape != right_shape {
        Err(TrackerError::shape_mismatch(left_name, left_shape, right_name, right_shape))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use stormtrack_types::Connectivity;

    fn coord_grids(h: usize, w: usize) -> (FieldGrid, FieldGrid) {
        let mut xmat = Array2::<f64>::zeros((h, w));
        let mut ymat = Array2::<f64>::zeros((h, w));
        for r in 0..h {
            for c in 0..w {
                xmat[[r, c]] = c as f64;
                ymat[[r, c]] = r as f64;
            }
        }
        (xmat, ymat)
    }

    fn square_field(h: usize, w: usize, row: usize, col: usize, size: usize, value: f64) -> FieldGrid {
        let mut field = Array2::<f64>::zeros((h, w));
        for r in row..(row + size).min(h) {
            for c in col..(col + size).min(w) {
                field[[r, c]] = value;
            }
        }
        field
    }

    fn config() -> TrackConfig {
        TrackConfig {
            threshold: 1.0,
            minpixel: 4,
            squarelength: 20,
            rafraction: 0.01,
            connectivity: Connectivity::eight_connected(),
            ..TrackConfig::default()
        }
    }

    #[test]
    fn still_scene_preserves_identity_and_increments_life() {
        let h = 40;
        let w = 40;
        let config = config();
        let field = square_field(h, w, 10, 10, 5, 5.0);
        let (xmat, ymat) = coord_grids(h, w);
        let mask = field.mapv(|v| v > config.threshold);
        let labels = crate::labeler::label(&field, config.minpixel, config.threshold, &config.connectivity, false);

        let mut next_id = 1i64;
        let first = step(&[], None, None, &field, &labels, &mask, &xmat, &ymat, &config, 1.0, &mut next_id)
            .expect("first step");
        assert_eq!(first.objects.len(), 1);
        assert_eq!(first.objects[0].was, 1);
        assert_eq!(first.objects[0].life, 1);

        let second = step(
            &first.objects,
            Some(&labels),
            Some(&mask),
            &field,
            &labels,
            &mask,
            &xmat,
            &ymat,
            &config,
            1.0,
            &mut next_id,
        )
        .expect("second step");

        assert_eq!(second.objects.len(), 1);
        assert_eq!(second.objects[0].was, 1);
        assert_eq!(second.objects[0].life, 2);
        assert!(second.objects[0].dx.abs() < 1e-6);
        assert!(second.objects[0].dy.abs() < 1e-6);
    }

    #[test]
    fn degenerate_frame_assigns_fresh_identities() {
        let h = 20;
        let w = 20;
        let config = config();
        let field = Array2::<f64>::zeros((h, w));
        let (xmat, ymat) = coord_grids(h, w);
        let mask = field.mapv(|v| v > config.threshold);
        let labels = LabelGrid::zeros((h, w));

        let mut next_id = 5i64;
        let result = step(&[], None, None, &field, &labels, &mask, &xmat, &ymat, &config, 1.0, &mut next_id)
            .expect("step should succeed even with no labels");
        assert!(result.objects.is_empty());
        assert_eq!(next_id, 5);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let config = config();
        let field = Array2::<f64>::zeros((20, 20));
        let labels = LabelGrid::zeros((20, 21));
        let mask = field.mapv(|v| v > 0.0);
        let (xmat, ymat) = coord_grids(20, 20);
        let mut next_id = 1i64;
        let result = step(&[], None, None, &field, &labels, &mask, &xmat, &ymat, &config, 1.0, &mut next_id);
        assert!(result.is_err());
    }

    /// Not run by default — install a subscriber and eyeball the
    /// `label`/`track step complete` span output with:
    /// `cargo test -- --ignored --nocapture eyeball_span_output`
    #[test]
    #[ignore]
    fn eyeball_span_output() {
        let subscriber = tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(tracing::Level::TRACE)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let config = config();
        let field = square_field(40, 40, 10, 10, 5, 5.0);
        let (xmat, ymat) = coord_grids(40, 40);
        let mask = field.mapv(|v| v > config.threshold);
        let labels = crate::labeler::label(&field, config.minpixel, config.threshold, &config.connectivity, false);

        let mut next_id = 1i64;
        step(&[], None, None, &field, &labels, &mask, &xmat, &ymat, &config, 1.0, &mut next_id)
            .expect("step");
    }
}
