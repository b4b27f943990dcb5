//! Fractional-overlap identity resolution between current-frame labels and
//! advected prior labels, with a halo fallback for near-misses.

use std::collections::HashMap;

use stormtrack_types::{FieldGrid, IdGrid, LabelGrid, LifeGrid, ObjectRecord};
use tracing::debug;

use crate::advector::AdvectedSummary;

/// Resolve identity for every object in `new_objects` against the advected
/// prior frame, mutating each record's `was`/`life`/`wasdist`/`accreted` in
/// place and returning the per-pixel `wasarray`/`lifearray` side effects.
///
/// `new_objects` must already carry `storm`/`area`/`centroid_x`/`centroid_y`
/// from the current frame's labeling pass; `was`/`life`/`wasdist`/`accreted`
/// are overwritten here. Objects are visited in ascending `storm` order so
/// the outcome is independent of the caller's ordering.
#[allow(clippy::too_many_arguments)]
pub fn resolve(
    new_labels: &LabelGrid,
    new_objects: &mut [ObjectRecord],
    advected_labels: &LabelGrid,
    advected_summary: &HashMap<i64, AdvectedSummary>,
    prior_objects_by_storm: &HashMap<i64, &ObjectRecord>,
    xmat: &FieldGrid,
    ymat: &FieldGrid,
    overlap_threshold: f64,
    halo_sq: f64,
    next_persistent_id: &mut i64,
) -> (IdGrid, LifeGrid) {
    let (h, w) = new_labels.dim();
    let mut wasarray = IdGrid::zeros((h, w));
    let mut lifearray = LifeGrid::zeros((h, w));

    let mut order: Vec<usize> = (0..new_objects.len()).collect();
    order.sort_by_key(|&i| new_objects[i].storm);

    for idx in order {
        let jj = new_objects[idx].storm;
        let area_n = new_objects[idx].area as f64;
        let centroid_x = new_objects[idx].centroid_x;
        let centroid_y = new_objects[idx].centroid_y;

        let mask_cells: Vec<(usize, usize)> = new_labels
            .indexed_iter()
            .filter(|&(_, &v)| v as i64 == jj)
            .map(|(idx, _)| idx)
            .collect();

        let counts_direct = count_by_label(advected_labels, &mask_cells);
        let q_direct = overlap_fractions(&counts_direct, area_n, advected_summary);
        let max_direct = max_value(&q_direct);

        let (final_q, used_halo) = if max_direct < overlap_threshold {
            let halo_cells = halo_mask(xmat, ymat, centroid_x, centroid_y, halo_sq);
            let counts_halo = count_by_label(advected_labels, &halo_cells);
            (overlap_fractions(&counts_halo, area_n, advected_summary), true)
        } else {
            (q_direct, false)
        };

        let max_final = max_value(&final_q);

        if max_final >= overlap_threshold {
            let mut matches: Vec<i32> = final_q
                .iter()
                .filter(|&(_, &q)| q >= overlap_threshold)
                .map(|(&k, _)| k)
                .collect();
            matches.sort_unstable();

            let k_star = if matches.len() > 1 {
                // Largest overlap pixel count wins; ties broken by smallest
                // centroid distance, further ties by smallest k.
                let mut best = matches[0];
                let mut best_lap = *counts_direct.get(&best).unwrap_or(&0);
                let mut best_dist =
                    centroid_distance_sq(centroid_x, centroid_y, best, advected_summary);
                for &k in &matches[1..] {
                    let lap = *counts_direct.get(&k).unwrap_or(&0);
                    let dist = centroid_distance_sq(centroid_x, centroid_y, k, advected_summary);
                    let better = match lap.cmp(&best_lap) {
                        std::cmp::Ordering::Greater => true,
                        std::cmp::Ordering::Less => false,
                        std::cmp::Ordering::Equal => match dist.partial_cmp(&best_dist) {
                            Some(std::cmp::Ordering::Less) => true,
                            Some(std::cmp::Ordering::Greater) => false,
                            _ => k < best,
                        },
                    };
                    if better {
                        best = k;
                        best_lap = lap;
                        best_dist = dist;
                    }
                }
                best
            } else {
                matches[0]
            };

            let sectlap = *counts_direct.get(&k_star).unwrap_or(&0);
            let prior = prior_objects_by_storm
                .get(&(k_star as i64))
                .expect("k_star must reference a known prior object");

            new_objects[idx].was = prior.was;
            new_objects[idx].life = prior.life + 1;
            new_objects[idx].wasdist = Some(sectlap);

            for &k in &matches {
                if k == k_star {
                    continue;
                }
                if let Some(accreted_prior) = prior_objects_by_storm.get(&(k as i64)) {
                    new_objects[idx].accreted.push(accreted_prior.was);
                }
            }

            debug!(
                storm = jj,
                was = new_objects[idx].was,
                life = new_objects[idx].life,
                used_halo,
                "inherited identity"
            );
        } else {
            new_objects[idx].was = *next_persistent_id;
            new_objects[idx].life = 1;
            new_objects[idx].wasdist = None;
            *next_persistent_id += 1;

            debug!(storm = jj, was = new_objects[idx].was, "allocated fresh identity");
        }

        let was = new_objects[idx].was;
        let life = new_objects[idx].life;
        for &(r, c) in &mask_cells {
            wasarray[[r, c]] = was;
            lifearray[[r, c]] = life;
        }
    }

    (wasarray, lifearray)
}

fn count_by_label(advected_labels: &LabelGrid, cells: &[(usize, usize)]) -> HashMap<i32, u32> {
    let mut counts = HashMap::new();
    for &(r, c) in cells {
        let k = advected_labels[[r, c]];
        if k == 0 {
            continue;
        }
        *counts.entry(k).or_insert(0) += 1;
    }
    counts
}

fn overlap_fractions(
    counts: &HashMap<i32, u32>,
    area_n: f64,
    advected_summary: &HashMap<i64, AdvectedSummary>,
) -> HashMap<i32, f64> {
    counts
        .iter()
        .map(|(&k, &count)| {
            let a_k = advected_summary
                .get(&(k as i64))
                .map(|s| s.area)
                .filter(|&a| a > 0)
                .unwrap_or(1) as f64;
            let q = count as f64 * (1.0 / area_n + 1.0 / a_k);
            (k, q)
        })
        .collect()
}

fn max_value(q: &HashMap<i32, f64>) -> f64 {
    q.values().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn halo_mask(
    xmat: &FieldGrid,
    ymat: &FieldGrid,
    centroid_x: f64,
    centroid_y: f64,
    halo_sq: f64,
) -> Vec<(usize, usize)> {
    let (h, w) = xmat.dim();
    let mut cells = Vec::new();
    for r in 0..h {
        for c in 0..w {
            let dx = xmat[[r, c]] - centroid_x;
            let dy = ymat[[r, c]] - centroid_y;
            if dx * dx + dy * dy <= halo_sq {
                cells.push((r, c));
            }
        }
    }
    cells
}

fn centroid_distance_sq(
    centroid_x: f64,
    centroid_y: f64,
    k: i32,
    advected_summary: &HashMap<i64, AdvectedSummary>,
) -> f64 {
    match advected_summary.get(&(k as i64)) {
        Some(summary) => {
            let dx = centroid_x - summary.centroid_x;
            let dy = centroid_y - summary.centroid_y;
            dx * dx + dy * dy
        }
        None => f64::INFINITY,
    }
}
