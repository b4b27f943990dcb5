//! Connected-component labeling of a thresholded scalar field.

use ndarray::Array2;
use stormtrack_types::{Connectivity, FieldGrid, LabelGrid};
use tracing::debug;

/// Threshold `field` and label the connected components of the resulting
/// mask, dropping any component smaller than `minarea` and densely
/// relabeling the survivors from 1.
///
/// The search is an iterative stack-based flood fill rather than a
/// recursive one, so a single contiguous region spanning the whole grid
/// cannot blow the call stack.
pub fn label(
    field: &FieldGrid,
    minarea: u32,
    threshold: f64,
    connectivity: &Connectivity,
    under_threshold: bool,
) -> LabelGrid {
    let span = tracing::debug_span!("label", threshold, minarea, under_threshold);
    let _enter = span.enter();

    let (h, w) = field.dim();
    let mask = field.mapv(|v| {
        if under_threshold {
            v < threshold
        } else {
            v > threshold
        }
    });

    let offsets = connectivity.offsets();
    let mut raw_labels: Array2<i32> = Array2::zeros((h, w));
    let mut visited = vec![false; h * w];
    let mut component_id = 0i32;
    let mut component_sizes: Vec<usize> = Vec::new();

    for start_row in 0..h {
        for start_col in 0..w {
            let start_idx = start_row * w + start_col;
            if visited[start_idx] || !mask[[start_row, start_col]] {
                continue;
            }

            component_id += 1;
            let mut stack: Vec<(usize, usize)> = vec![(start_row, start_col)];
            let mut size = 0usize;

            while let Some((r, c)) = stack.pop() {
                let idx = r * w + c;
                if visited[idx] {
                    continue;
                }
                visited[idx] = true;
                if !mask[[r, c]] {
                    continue;
                }

                raw_labels[[r, c]] = component_id;
                size += 1;

                for &(dr, dc) in &offsets {
                    let nr = r as isize + dr;
                    let nc = c as isize + dc;
                    if nr < 0 || nc < 0 || nr as usize >= h || nc as usize >= w {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    if !visited[nr * w + nc] {
                        stack.push((nr, nc));
                    }
                }
            }

            component_sizes.push(size);
        }
    }

    // Dense relabel: components surviving the area filter get consecutive
    // ids starting from 1, in order of first discovery.
    let mut remap = vec![0i32; component_sizes.len() + 1];
    let mut next_label = 0i32;
    for (old_id, &size) in component_sizes.iter().enumerate() {
        if size >= minarea as usize {
            next_label += 1;
            remap[old_id + 1] = next_label;
        }
    }

    let output = raw_labels.mapv(|v| if v == 0 { 0 } else { remap[v as usize] });

    debug!(
        components_found = component_sizes.len(),
        components_kept = next_label,
        "labeling complete"
    );

    output
}
