//! Outlier rejection and scattered-to-grid interpolation of the coarse
//! displacement field produced by `BlockCorrelator`.

use delaunator::{triangulate, Point};
use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, warn};

/// Coordinate axes for a grid: `x` varies along columns, `y` along rows.
/// Both are assumed monotonically increasing and (for the coarse axes)
/// uniformly spaced, matching the pitch at which `BlockCorrelator` tiles
/// are laid out.
#[derive(Debug, Clone)]
pub struct Axes {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Reject outliers on `coarse_u`/`coarse_v` independently, then interpolate
/// each onto the fine grid described by `fine_axes`.
///
/// Returns all-zero fields if fewer than 4 finite samples survive rejection
/// for a given component (the `NumericDegeneracy` condition from
/// SPEC_FULL.md §7 — recovered locally, logged, never returned as an error).
pub fn smooth_and_interpolate(
    coarse_u: &Array2<f64>,
    coarse_v: &Array2<f64>,
    coarse_axes: &Axes,
    fine_axes: &Axes,
    tolerance_per_dt: f64,
    num_dt: f64,
) -> (Array2<f64>, Array2<f64>) {
    let tolerance = tolerance_per_dt * num_dt;

    let cleaned_u = reject_outliers(coarse_u, tolerance);
    let cleaned_v = reject_outliers(coarse_v, tolerance);

    let fine_u = interpolate_component(&cleaned_u, coarse_axes, fine_axes, "u");
    let fine_v = interpolate_component(&cleaned_v, coarse_axes, fine_axes, "v");

    (fine_u, fine_v)
}

/// Reject any coarse cell whose value deviates from its NaN-ignoring
/// neighbourhood mean by more than `tolerance`. Operates on a read snapshot
/// of the input so every cell's decision is independent of every other's,
/// making the pass trivially parallel.
fn reject_outliers(grid: &Array2<f64>, tolerance: f64) -> Array2<f64> {
    let (h, w) = grid.dim();
    let mut out = Array2::<f64>::from_elem((h, w), f64::NAN);

    let decisions: Vec<((usize, usize), f64)> = grid
        .indexed_iter()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|((r, c), &value)| {
            if value.is_nan() {
                return ((r, c), f64::NAN);
            }
            let mean = neighbour_mean(grid, r, c, h, w);
            if mean.is_nan() || (value - mean).abs() <= tolerance {
                ((r, c), value)
            } else {
                ((r, c), f64::NAN)
            }
        })
        .collect();

    for ((r, c), value) in decisions {
        out[[r, c]] = value;
    }
    out
}

/// NaN-ignoring mean over the in-bounds 8-neighbourhood of `(r, c)`.
/// Every one of the four edges and four corners is covered by the same
/// bounds check, so a left-edge cell (5 in-bounds neighbours) is never
/// treated as an interior cell (8 neighbours).
fn neighbour_mean(grid: &Array2<f64>, r: usize, c: usize, h: usize, w: usize) -> f64 {
    const OFFSETS: [(isize, isize); 8] = [
        (-1, -1),
        (-1, 0),
        (-1, 1),
        (0, -1),
        (0, 1),
        (1, -1),
        (1, 0),
        (1, 1),
    ];

    let mut sum = 0.0;
    let mut count = 0usize;
    for (dr, dc) in OFFSETS {
        let nr = r as isize + dr;
        let nc = c as isize + dc;
        if nr < 0 || nc < 0 || nr as usize >= h || nc as usize >= w {
            continue;
        }
        let value = grid[[nr as usize, nc as usize]];
        if !value.is_nan() {
            sum += value;
            count += 1;
        }
    }

    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

fn interpolate_component(
    coarse: &Array2<f64>,
    coarse_axes: &Axes,
    fine_axes: &Axes,
    component_name: &str,
) -> Array2<f64> {
    let fine_shape = (fine_axes.y.len(), fine_axes.x.len());

    let mut samples: Vec<(f64, f64, f64)> = Vec::new();
    for ((r, c), &value) in coarse.indexed_iter() {
        if value.is_nan() {
            continue;
        }
        samples.push((coarse_axes.x[c], coarse_axes.y[r], value));
    }

    if samples.len() < 4 {
        warn!(
            component = component_name,
            samples = samples.len(),
            "too few finite displacement samples to interpolate, substituting zero field"
        );
        return Array2::zeros(fine_shape);
    }

    let dense_coarse = triangulate_and_fill(&samples, coarse_axes, coarse.dim());
    let fine = bicubic_resample(&dense_coarse, coarse_axes, fine_axes);

    debug!(component = component_name, samples = samples.len(), "interpolated");
    fine
}

/// Triangulate the surviving samples and fill every coarse-grid cell with
/// the linearly interpolated value inside the triangulation's convex hull,
/// or 0 outside it.
fn triangulate_and_fill(
    samples: &[(f64, f64, f64)],
    coarse_axes: &Axes,
    coarse_shape: (usize, usize),
) -> Array2<f64> {
    let points: Vec<Point> = samples
        .iter()
        .map(|&(x, y, _)| Point { x, y })
        .collect();
    let triangulation = triangulate(&points);

    let (h, w) = coarse_shape;
    let mut out = Array2::<f64>::zeros((h, w));

    for r in 0..h {
        for c in 0..w {
            let px = coarse_axes.x[c];
            let py = coarse_axes.y[r];
            out[[r, c]] = sample_triangulation(&triangulation, &points, samples, px, py);
        }
    }

    out
}

fn sample_triangulation(
    triangulation: &delaunator::Triangulation,
    points: &[Point],
    samples: &[(f64, f64, f64)],
    px: f64,
    py: f64,
) -> f64 {
    let tris = &triangulation.triangles;
    let mut t = 0;
    while t + 2 < tris.len() {
        let ia = tris[t];
        let ib = tris[t + 1];
        let ic = tris[t + 2];
        t += 3;

        let (ax, ay) = (points[ia].x, points[ia].y);
        let (bx, by) = (points[ib].x, points[ib].y);
        let (cx, cy) = (points[ic].x, points[ic].y);

        let denom = (by - cy) * (ax - cx) + (cx - bx) * (ay - cy);
        if denom.abs() < 1e-12 {
            continue;
        }
        let w_a = ((by - cy) * (px - cx) + (cx - bx) * (py - cy)) / denom;
        let w_b = ((cy - ay) * (px - cx) + (ax - cx) * (py - cy)) / denom;
        let w_c = 1.0 - w_a - w_b;

        let eps = -1e-9;
        if w_a >= eps && w_b >= eps && w_c >= eps {
            return w_a * samples[ia].2 + w_b * samples[ib].2 + w_c * samples[ic].2;
        }
    }
    0.0
}

/// Resample `coarse` from its axes onto `fine_axes` using bicubic
/// (Catmull-Rom) interpolation, assuming uniformly spaced axes.
fn bicubic_resample(coarse: &Array2<f64>, coarse_axes: &Axes, fine_axes: &Axes) -> Array2<f64> {
    let (ch, cw) = coarse.dim();
    let (fh, fw) = (fine_axes.y.len(), fine_axes.x.len());
    let mut out = Array2::<f64>::zeros((fh, fw));

    for fr in 0..fh {
        let fy = fine_axes.y[fr];
        let row_idx = axis_to_fractional_index(&coarse_axes.y, fy).clamp(0.0, (ch - 1) as f64);
        for fc in 0..fw {
            let fx = fine_axes.x[fc];
            let col_idx =
                axis_to_fractional_index(&coarse_axes.x, fx).clamp(0.0, (cw - 1) as f64);
            out[[fr, fc]] = cubic_interpolate(coarse, col_idx, row_idx);
        }
    }

    out
}

fn axis_to_fractional_index(axis: &[f64], value: f64) -> f64 {
    if axis.len() < 2 {
        return 0.0;
    }
    let spacing = axis[1] - axis[0];
    if spacing.abs() < 1e-12 {
        return 0.0;
    }
    (value - axis[0]) / spacing
}

fn cubic_interpolate(data: &Array2<f64>, x: f64, y: f64) -> f64 {
    let (h, w) = data.dim();
    let xi = x.floor() as i64;
    let yi = y.floor() as i64;
    let xf = x - xi as f64;
    let yf = y - yi as f64;

    let sample = |dx: i64, dy: i64| -> f64 {
        let px = (xi + dx).clamp(0, w as i64 - 1) as usize;
        let py = (yi + dy).clamp(0, h as i64 - 1) as usize;
        data[[py, px]]
    };

    let mut row_values = [0.0; 4];
    for (j, row) in row_values.iter_mut().enumerate() {
        let dy = j as i64 - 1;
        *row = cubic_1d(sample(-1, dy), sample(0, dy), sample(1, dy), sample(2, dy), xf);
    }
    cubic_1d(row_values[0], row_values[1], row_values[2], row_values[3], yf)
}

/// 1-D cubic interpolation using a Catmull-Rom spline.
fn cubic_1d(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;
    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    let d = p1;
    a * t3 + b * t2 + c * t + d
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_axes(len: usize, spacing: f64) -> Vec<f64> {
        (0..len).map(|i| i as f64 * spacing).collect()
    }

    #[test]
    fn corner_and_edge_neighbour_counts_are_explicit() {
        let grid = Array2::<f64>::zeros((5, 5));
        assert_eq!(count_finite_neighbours(&grid, 0, 0), 3);
        assert_eq!(count_finite_neighbours(&grid, 0, 2), 5);
        assert_eq!(count_finite_neighbours(&grid, 0, 4), 3);
        assert_eq!(count_finite_neighbours(&grid, 2, 0), 5);
        assert_eq!(count_finite_neighbours(&grid, 2, 2), 8);
        assert_eq!(count_finite_neighbours(&grid, 4, 4), 3);
    }

    fn count_finite_neighbours(grid: &Array2<f64>, r: usize, c: usize) -> usize {
        let (h, w) = grid.dim();
        const OFFSETS: [(isize, isize); 8] = [
            (-1, -1),
            (-1, 0),
            (-1, 1),
            (0, -1),
            (0, 1),
            (1, -1),
            (1, 0),
            (1, 1),
        ];
        OFFSETS
            .iter()
            .filter(|&&(dr, dc)| {
                let nr = r as isize + dr;
                let nc = c as isize + dc;
                nr >= 0 && nc >= 0 && (nr as usize) < h && (nc as usize) < w
            })
            .count()
    }

    #[test]
    fn rejects_a_single_spike() {
        let mut grid = Array2::<f64>::from_elem((5, 5), 1.0);
        grid[[2, 2]] = 100.0;
        let cleaned = reject_outliers(&grid, 2.0);
        assert!(cleaned[[2, 2]].is_nan());
        assert_eq!(cleaned[[0, 0]], 1.0);
    }

    #[test]
    fn too_few_samples_yields_zero_field() {
        let coarse_u = Array2::<f64>::from_elem((3, 3), f64::NAN);
        let coarse_v = coarse_u.clone();
        let coarse_axes = Axes {
            x: uniform_axes(3, 10.0),
            y: uniform_axes(3, 10.0),
        };
        let fine_axes = Axes {
            x: uniform_axes(30, 1.0),
            y: uniform_axes(30, 1.0),
        };
        let (fine_u, fine_v) =
            smooth_and_interpolate(&coarse_u, &coarse_v, &coarse_axes, &fine_axes, 1.0, 1.0);
        assert!(fine_u.iter().all(|&v| v == 0.0));
        assert!(fine_v.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn interpolates_a_uniform_field_exactly() {
        let coarse_u = Array2::<f64>::from_elem((4, 4), 3.0);
        let coarse_v = Array2::<f64>::from_elem((4, 4), -1.5);
        let coarse_axes = Axes {
            x: uniform_axes(4, 10.0),
            y: uniform_axes(4, 10.0),
        };
        let fine_axes = Axes {
            x: uniform_axes(31, 1.0),
            y: uniform_axes(31, 1.0),
        };
        let (fine_u, fine_v) =
            smooth_and_interpolate(&coarse_u, &coarse_v, &coarse_axes, &fine_axes, 1.0, 1.0);
        // interior points (inside the convex hull) should recover the constant field
        assert!((fine_u[[15, 15]] - 3.0).abs() < 1e-6);
        assert!((fine_v[[15, 15]] - (-1.5)).abs() < 1e-6);
    }
}
