//! Per-object statistics (area, extreme, centroid, bounding box) computed
//! directly from a label grid and the scalar field it was thresholded from.

use stormtrack_types::{FieldGrid, LabelGrid, ObjectRecord};

/// Build one placeholder `ObjectRecord` per distinct non-zero label in
/// `labels`, populated with everything derivable from the current frame
/// alone (`storm`, `area`, `extreme`, `meanvar`, centroid, bounding box,
/// `extra_area`). `was`/`life`/`dx`/`dy`/`parent`/`child`/`accreted`/`wasdist`
/// are left at their zero/empty defaults for `identity::resolve` and
/// `lineage::reconcile` to fill in.
///
/// Records are returned ordered by ascending `storm`, matching the
/// determinism requirement that downstream passes rely on.
pub fn build_objects(
    labels: &LabelGrid,
    field: &FieldGrid,
    xmat: &FieldGrid,
    ymat: &FieldGrid,
    under_threshold: bool,
    extra_thresholds: &[f64],
) -> Vec<ObjectRecord> {
    let max_label = labels.iter().copied().max().unwrap_or(0);
    if max_label <= 0 {
        return Vec::new();
    }

    let mut objects = Vec::with_capacity(max_label as usize);
    for storm in 1..=max_label {
        objects.push(build_one(
            labels,
            field,
            xmat,
            ymat,
            storm,
            under_threshold,
            extra_thresholds,
        ));
    }
    objects
}

fn build_one(
    labels: &LabelGrid,
    field: &FieldGrid,
    xmat: &FieldGrid,
    ymat: &FieldGrid,
    storm: i32,
    under_threshold: bool,
    extra_thresholds: &[f64],
) -> ObjectRecord {
    let mut area = 0u32;
    let mut sum_var = 0.0;
    let mut extreme = if under_threshold { f64::INFINITY } else { f64::NEG_INFINITY };
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    let mut extra_counts = vec![0u32; extra_thresholds.len()];

    for ((r, c), &label) in labels.indexed_iter() {
        if label != storm {
            continue;
        }
        let v = field[[r, c]];
        let x = xmat[[r, c]];
        let y = ymat[[r, c]];

        area += 1;
        sum_var += v;
        sum_x += x;
        sum_y += y;
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
        extreme = if under_threshold { extreme.min(v) } else { extreme.max(v) };

        for (i, &t) in extra_thresholds.iter().enumerate() {
            let hit = if under_threshold { v < t } else { v > t };
            if hit {
                extra_counts[i] += 1;
            }
        }
    }

    let area_f = area.max(1) as f64;
    ObjectRecord {
        storm: storm as i64,
        was: 0,
        area,
        extreme: if area == 0 { 0.0 } else { extreme },
        meanvar: sum_var / area_f,
        centroid_x: sum_x / area_f,
        centroid_y: sum_y / area_f,
        box_left: min_x,
        box_up: max_y,
        box_width: max_x - min_x,
        box_height: max_y - min_y,
        life: 0,
        dx: 0.0,
        dy: 0.0,
        parent: Vec::new(),
        child: None,
        accreted: Vec::new(),
        wasdist: None,
        extra_area: extra_counts,
    }
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

    #[test]
    fn builds_one_record_per_label_in_ascending_order() {
        let h = 4;
        let w = 4;
        let mut labels = LabelGrid::zeros((h, w));
        labels[[0, 0]] = 1;
        labels[[3, 3]] = 2;
        let field = Array2::<f64>::from_elem((h, w), 5.0);
        let (xmat, ymat) = coord_grids(h, w);

        let objects = build_objects(&labels, &field, &xmat, &ymat, false, &[]);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].storm, 1);
        assert_eq!(objects[1].storm, 2);
        assert_eq!(objects[0].area, 1);
        assert_eq!(objects[0].centroid_x, 0.0);
        assert_eq!(objects[1].centroid_x, 3.0);
    }

    #[test]
    fn extra_area_respects_polarity() {
        let h = 1;
        let w = 3;
        let mut labels = LabelGrid::zeros((h, w));
        labels[[0, 0]] = 1;
        labels[[0, 1]] = 1;
        labels[[0, 2]] = 1;
        let field = Array2::from_shape_vec((h, w), vec![1.0, 5.0, 10.0]).unwrap();
        let (xmat, ymat) = coord_grids(h, w);

        let objects_over = build_objects(&labels, &field, &xmat, &ymat, false, &[4.0]);
        assert_eq!(objects_over[0].extra_area, vec![2]); // 5.0 and 10.0 are > 4.0

        let objects_under = build_objects(&labels, &field, &xmat, &ymat, true, &[4.0]);
        assert_eq!(objects_under[0].extra_area, vec![1]); // only 1.0 is < 4.0
    }

    #[test]
    fn no_labels_yields_no_objects() {
        let labels = LabelGrid::zeros((3, 3));
        let field = Array2::<f64>::zeros((3, 3));
        let (xmat, ymat) = coord_grids(3, 3);
        assert!(build_objects(&labels, &field, &xmat, &ymat, false, &[]).is_empty());
    }

    #[test]
    fn bounding_box_uses_max_y_for_box_up() {
        let h = 5;
        let w = 10;
        let mut labels = LabelGrid::zeros((h, w));
        for r in 1..3 {
            for c in 5..9 {
                labels[[r, c]] = 1;
            }
        }
        let field = Array2::<f64>::from_elem((h, w), 5.0);

        // Non-uniform axes: x increases with column, y *decreases* with
        // row (as in a north-up lat/lon grid), so max_y corresponds to
        // the smaller row index rather than the larger one.
        let mut xmat = Array2::<f64>::zeros((h, w));
        let mut ymat = Array2::<f64>::zeros((h, w));
        for r in 0..h {
            for c in 0..w {
                xmat[[r, c]] = c as f64 * 3.0;
                ymat[[r, c]] = 100.0 - r as f64 * 2.0;
            }
        }

        let objects = build_objects(&labels, &field, &xmat, &ymat, false, &[]);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].box_left, 15.0); // min_x at col 5
        assert_eq!(objects[0].box_up, 98.0); // max_y at row 1, not row 2
    }
}
