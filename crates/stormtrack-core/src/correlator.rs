//! Windowed 2-D FFT cross-correlation between two equal-shaped tiles.

use ndarray::Array2;
use num_complex::Complex64;
use rustfft::FftPlanner;
use stormtrack_types::{TrackerError, WindowMethod};
use tracing::trace;

/// Result of correlating one pair of tiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationResult {
    /// Integer pixel shift from `a` to `b` along the column axis.
    pub dx: i64,
    /// Integer pixel shift from `a` to `b` along the row axis.
    pub dy: i64,
    /// Normalized correlation amplitude in `[0, 1]` for well-formed inputs.
    pub amp: f64,
}

/// Correlate two equal-shaped tiles via windowed FFT cross-correlation with
/// aliasing-corrected peak finding.
///
/// `tile_a`, `tile_b` must share a shape, or `TrackerError::ShapeMismatch`
/// is returned.
pub fn correlate(
    tile_a: &Array2<f64>,
    tile_b: &Array2<f64>,
    method: WindowMethod,
) -> Result<CorrelationResult, TrackerError> {
    let shape_a = tile_a.dim();
    let shape_b = tile_b.dim();
    if shape_a != shape_b {
        return Err(TrackerError::shape_mismatch(
            "tile_a", shape_a, "tile_b", shape_b,
        ));
    }

    let (h, w) = shape_a;
    let l = h.max(w) as f64;

    let window = build_window(h, w, method, l);

    let a_centered = center(tile_a, &window);
    let b_centered = center(tile_b, &window);

    let sum_sq_a: f64 = a_centered.iter().map(|v| v * v).sum();
    let sum_sq_b: f64 = b_centered.iter().map(|v| v * v).sum();

    let fft_a = fft2d_forward(&a_centered);
    let fft_b = fft2d_forward(&b_centered);

    let mut cross = Array2::<Complex64>::zeros((h, w));
    for ((r, c), value) in cross.indexed_iter_mut() {
        *value = fft_b[[r, c]] * fft_a[[r, c]].conj();
    }

    let corr = ifft2d_inverse(&cross);

    let mut peak_val = f64::NEG_INFINITY;
    let mut peak_row = 0usize;
    let mut peak_col = 0usize;
    for ((r, c), value) in corr.indexed_iter() {
        let re = value.re;
        if re > peak_val {
            peak_val = re;
            peak_row = r;
            peak_col = c;
        }
    }

    let mut dx = peak_col as i64;
    let mut dy = peak_row as i64;
    let half_l = (l / 2.0) as i64;
    if dx > half_l {
        dx -= l as i64;
    }
    if dy > half_l {
        dy -= l as i64;
    }

    let denom = (sum_sq_a * sum_sq_b).sqrt();
    let amp = if denom > 1e-15 { peak_val / denom } else { 0.0 };

    trace!(dx, dy, amp, "block correlated");

    Ok(CorrelationResult { dx, dy, amp })
}

/// Separable window: Tukey (tapered cosine) with `alpha = max(0.1, 10/l)`,
/// or all-ones for `Rectangular`.
fn build_window(h: usize, w: usize, method: WindowMethod, l: f64) -> Array2<f64> {
    match method {
        WindowMethod::Rectangular => Array2::ones((h, w)),
        WindowMethod::Tukey => {
            let alpha = (0.1_f64).max(10.0 / l);
            let row_window = tukey_1d(h, alpha);
            let col_window = tukey_1d(w, alpha);
            let mut out = Array2::<f64>::zeros((h, w));
            for r in 0..h {
                for c in 0..w {
                    out[[r, c]] = row_window[r] * col_window[c];
                }
            }
            out
        }
    }
}

/// 1-D Tukey (tapered cosine) window of length `n`.
fn tukey_1d(n: usize, alpha: f64) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    let alpha = alpha.clamp(0.0, 1.0);
    let nf = (n - 1) as f64;
    let taper_len = (alpha * nf / 2.0).floor();
    (0..n)
        .map(|i| {
            let x = i as f64;
            if x < taper_len {
                0.5 * (1.0 + (std::f64::consts::PI * (x / taper_len - 1.0)).cos())
            } else if x > nf - taper_len {
                0.5 * (1.0 + (std::f64::consts::PI * ((x - nf) / taper_len + 1.0)).cos())
            } else {
                1.0
            }
        })
        .collect()
}

/// Apply the window and subtract the mean, zeroing the DC component.
fn center(tile: &Array2<f64>, window: &Array2<f64>) -> Array2<f64> {
    let windowed = tile * window;
    let mean = windowed.mean().unwrap_or(0.0);
    windowed.mapv(|v| v - mean)
}

/// Forward 2-D FFT: rows then columns.
fn fft2d_forward(input: &Array2<f64>) -> Array2<Complex64> {
    let (h, w) = input.dim();
    let mut planner = FftPlanner::<f64>::new();
    let row_fft = planner.plan_fft_forward(w);
    let col_fft = planner.plan_fft_forward(h);

    let mut data: Array2<Complex64> = input.mapv(|v| Complex64::new(v, 0.0));

    for mut row in data.rows_mut() {
        let mut buf: Vec<Complex64> = row.iter().copied().collect();
        row_fft.process(&mut buf);
        for (dst, src) in row.iter_mut().zip(buf) {
            *dst = src;
        }
    }

    for mut col in data.columns_mut() {
        let mut buf: Vec<Complex64> = col.iter().copied().collect();
        col_fft.process(&mut buf);
        for (dst, src) in col.iter_mut().zip(buf) {
            *dst = src;
        }
    }

    data
}

/// Inverse 2-D FFT: rows then columns, normalized by `1/(h*w)`.
fn ifft2d_inverse(input: &Array2<Complex64>) -> Array2<Complex64> {
    let (h, w) = input.dim();
    let mut planner = FftPlanner::<f64>::new();
    let row_fft = planner.plan_fft_inverse(w);
    let col_fft = planner.plan_fft_inverse(h);

    let mut data = input.clone();

    for mut row in data.rows_mut() {
        let mut buf: Vec<Complex64> = row.iter().copied().collect();
        row_fft.process(&mut buf);
        for (dst, src) in row.iter_mut().zip(buf) {
            *dst = src;
        }
    }

    for mut col in data.columns_mut() {
        let mut buf: Vec<Complex64> = col.iter().copied().collect();
        col_fft.process(&mut buf);
        for (dst, src) in col.iter_mut().zip(buf) {
            *dst = src;
        }
    }

    let scale = 1.0 / (h * w) as f64;
    data.mapv(|v| v * scale)
}
