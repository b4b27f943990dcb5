//! Rigid advection of prior-frame label masks by per-object mean displacement.

use std::collections::HashMap;

use stormtrack_types::{DisplacementGrid, FieldGrid, LabelGrid, ObjectRecord};
use tracing::trace;

/// Centroid and footprint size of one prior object after advection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvectedSummary {
    pub centroid_x: f64,
    pub centroid_y: f64,
    pub area: u32,
}

/// Advect every prior object's label mask by its mean displacement over the
/// fine displacement field, resolving destination-cell collisions by
/// centroid proximity.
///
/// Objects are processed in ascending `storm` order so collisions resolve
/// deterministically regardless of how the caller's `prior_objects` vector
/// is ordered.
pub fn advect(
    prior_labels: &LabelGrid,
    prior_objects: &[ObjectRecord],
    u_field: &DisplacementGrid,
    v_field: &DisplacementGrid,
    xmat: &FieldGrid,
    ymat: &FieldGrid,
) -> (LabelGrid, HashMap<i64, AdvectedSummary>) {
    let (h, w) = prior_labels.dim();
    let mut advected_labels = LabelGrid::zeros((h, w));
    let mut claim_dist = FieldGrid::from_elem((h, w), f64::INFINITY);

    let mut ordered: Vec<&ObjectRecord> = prior_objects.iter().collect();
    ordered.sort_by_key(|o| o.storm);

    for o in &ordered {
        let label = o.storm as i32;
        let cells: Vec<(usize, usize)> = prior_labels
            .indexed_iter()
            .filter(|&(_, &v)| v == label)
            .map(|(idx, _)| idx)
            .collect();

        if cells.is_empty() {
            continue;
        }

        let mut sum_dx = 0.0;
        let mut sum_dy = 0.0;
        for &(r, c) in &cells {
            sum_dx += u_field[[r, c]];
            sum_dy += v_field[[r, c]];
        }
        let mean_dx = sum_dx / cells.len() as f64;
        let mean_dy = sum_dy / cells.len() as f64;

        let round_dx = mean_dx.round() as i64;
        let round_dy = mean_dy.round() as i64;

        for &(r, c) in &cells {
            let (dest_r, dest_c) = if round_dx == 0 && round_dy == 0 {
                (r as i64, c as i64)
            } else {
                (r as i64 + round_dy, c as i64 + round_dx)
            };

            if dest_r < 0 || dest_c < 0 || dest_r as usize >= h || dest_c as usize >= w {
                trace!(storm = o.storm, r, c, "advected cell fell outside grid, dropping");
                continue;
            }
            let (dest_r, dest_c) = (dest_r as usize, dest_c as usize);

            let dest_x = xmat[[dest_r, dest_c]];
            let dest_y = ymat[[dest_r, dest_c]];
            let dist_sq = (o.centroid_x - dest_x).powi(2) + (o.centroid_y - dest_y).powi(2);

            if advected_labels[[dest_r, dest_c]] == 0 || dist_sq < claim_dist[[dest_r, dest_c]] {
                advected_labels[[dest_r, dest_c]] = label;
                claim_dist[[dest_r, dest_c]] = dist_sq;
            }
        }
    }

    let mut summaries = HashMap::new();
    for o in &ordered {
        let label = o.storm as i32;
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut count = 0u32;
        for ((r, c), &v) in advected_labels.indexed_iter() {
            if v == label {
                sum_x += xmat[[r, c]];
                sum_y += ymat[[r, c]];
                count += 1;
            }
        }
        let summary = if count == 0 {
            AdvectedSummary {
                centroid_x: o.centroid_x,
                centroid_y: o.centroid_y,
                area: 0,
            }
        } else {
            AdvectedSummary {
                centroid_x: sum_x / count as f64,
                centroid_y: sum_y / count as f64,
                area: count,
            }
        };
        summaries.insert(o.storm, summary);
    }

    (advected_labels, summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

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

    fn object(storm: i64, cx: f64, cy: f64) -> ObjectRecord {
        ObjectRecord {
            storm,
            was: storm,
            area: 4,
            extreme: 5.0,
            meanvar: 5.0,
            centroid_x: cx,
            centroid_y: cy,
            box_left: cx - 1.0,
            box_up: cy - 1.0,
            box_width: 2.0,
            box_height: 2.0,
            life: 1,
            dx: 0.0,
            dy: 0.0,
            parent: Vec::new(),
            child: None,
            accreted: Vec::new(),
            wasdist: None,
            extra_area: Vec::new(),
        }
    }

    #[test]
    fn zero_displacement_copies_cells_unchanged() {
        let h = 10;
        let w = 10;
        let mut labels = LabelGrid::zeros((h, w));
        labels[[3, 3]] = 1;
        labels[[3, 4]] = 1;
        let u = DisplacementGrid::zeros((h, w));
        let v = DisplacementGrid::zeros((h, w));
        let (xmat, ymat) = coord_grids(h, w);
        let objects = vec![object(1, 3.5, 3.0)];

        let (advected, summaries) = advect(&labels, &objects, &u, &v, &xmat, &ymat);
        assert_eq!(advected[[3, 3]], 1);
        assert_eq!(advected[[3, 4]], 1);
        assert_eq!(summaries[&1].area, 2);
    }

    #[test]
    fn nonzero_displacement_shifts_cells() {
        let h = 10;
        let w = 10;
        let mut labels = LabelGrid::zeros((h, w));
        labels[[3, 3]] = 1;
        let mut u = DisplacementGrid::zeros((h, w));
        let mut v = DisplacementGrid::zeros((h, w));
        u[[3, 3]] = 2.0;
        v[[3, 3]] = 1.0;
        let (xmat, ymat) = coord_grids(h, w);
        let objects = vec![object(1, 3.0, 3.0)];

        let (advected, _summaries) = advect(&labels, &objects, &u, &v, &xmat, &ymat);
        assert_eq!(advected[[4, 5]], 1);
        assert_eq!(advected[[3, 3]], 0);
    }

    #[test]
    fn shift_off_grid_is_dropped() {
        let h = 5;
        let w = 5;
        let mut labels = LabelGrid::zeros((h, w));
        labels[[0, 0]] = 1;
        let mut u = DisplacementGrid::zeros((h, w));
        let mut v = DisplacementGrid::zeros((h, w));
        u[[0, 0]] = -5.0;
        v[[0, 0]] = 0.0;
        let (xmat, ymat) = coord_grids(h, w);
        let objects = vec![object(1, 0.0, 0.0)];

        let (advected, summaries) = advect(&labels, &objects, &u, &v, &xmat, &ymat);
        assert!(advected.iter().all(|&v| v == 0));
        assert_eq!(summaries[&1].area, 0);
        assert_eq!(summaries[&1].centroid_x, 0.0);
    }

    #[test]
    fn collision_resolved_by_nearest_centroid() {
        let h = 10;
        let w = 10;
        let mut labels = LabelGrid::zeros((h, w));
        labels[[2, 2]] = 1;
        labels[[6, 6]] = 2;
        let mut u = DisplacementGrid::zeros((h, w));
        let mut v = DisplacementGrid::zeros((h, w));
        // Both advect onto (5, 5).
        u[[2, 2]] = 3.0;
        v[[2, 2]] = 3.0;
        u[[6, 6]] = -1.0;
        v[[6, 6]] = -1.0;
        let (xmat, ymat) = coord_grids(h, w);
        let objects = vec![object(1, 2.0, 2.0), object(2, 6.0, 6.0)];

        let (advected, _summaries) = advect(&labels, &objects, &u, &v, &xmat, &ymat);
        // Object 2 starts closer to (5,5) than object 1 does, so it wins the cell.
        assert_eq!(advected[[5, 5]], 2);
    }
}
