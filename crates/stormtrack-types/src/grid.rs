//! Grid type aliases and the connectivity kernel used by the labeler.

use ndarray::Array2;

/// A scalar field grid, row-major with shape `(height, width)`.
pub type FieldGrid = Array2<f64>;

/// An integer label grid with shape `(height, width)`. `0` is background;
/// `1..N` identify distinct objects within one snapshot.
pub type LabelGrid = Array2<i32>;

/// A dense per-pixel displacement field (same shape as the grid it applies to).
pub type DisplacementGrid = Array2<f64>;

/// Per-pixel persistent identity (`was`) assignment, `0` where no object covers the pixel.
pub type IdGrid = Array2<i64>;

/// Per-pixel object lifetime (`life`) assignment, `0` where no object covers the pixel.
pub type LifeGrid = Array2<u32>;

/// Connectivity kernel for connected-component labeling.
///
/// Must be centrosymmetric: `kernel[i][j] == kernel[h-1-i][w-1-j]` for every
/// cell, so that "is A connected to B" is the same question regardless of
/// which of the two cells you start from.
#[derive(Debug, Clone, PartialEq)]
pub struct Connectivity(Array2<bool>);

impl Connectivity {
    /// Build a connectivity kernel from a boolean mask. The mask's center
    /// cell (which must exist, i.e. both dimensions odd) is ignored.
    pub fn new(mask: Array2<bool>) -> Option<Self> {
        let kernel = Connectivity(mask);
        if kernel.is_centrosymmetric() {
            Some(kernel)
        } else {
            None
        }
    }

    /// The classic 4-neighbour (Manhattan / rook) kernel.
    pub fn four_connected() -> Self {
        let mask = Array2::from_shape_vec(
            (3, 3),
            vec![
                false, true, false, //
                true, true, true, //
                false, true, false,
            ],
        )
        .expect("fixed 3x3 shape");
        Connectivity(mask)
    }

    /// The 8-neighbour (chessboard / queen) kernel.
    pub fn eight_connected() -> Self {
        Connectivity(Array2::from_elem((3, 3), true))
    }

    /// Offsets `(row_delta, col_delta)` of the neighbours this kernel connects,
    /// relative to the kernel's center, excluding the center itself.
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let (h, w) = self.0.dim();
        let cr = (h / 2) as isize;
        let cc = (w / 2) as isize;
        let mut out = Vec::new();
        for ((r, c), &connected) in self.0.indexed_iter() {
            if !connected {
                continue;
            }
            let (r, c) = (r as isize, c as isize);
            if r == cr && c == cc {
                continue;
            }
            out.push((r - cr, c - cc));
        }
        out
    }

    fn is_centrosymmetric(&self) -> bool {
        let (h, w) = self.0.dim();
        for ((r, c), &v) in self.0.indexed_iter() {
            if v != self.0[[h - 1 - r, w - 1 - c]] {
                return false;
            }
        }
        true
    }
}
