//! Multi-inheritance collision detection and lineage bookkeeping.

use std::collections::{HashMap, HashSet};

use stormtrack_types::{IdGrid, LabelGrid, ObjectRecord};
use tracing::debug;

/// Detect objects that independently inherited the same prior identity and
/// reassign all but one (the "parent") a fresh identity, recording the
/// split in `parent`/`child`. Then sanitize every object's `accreted` list
/// against the final set of live identities.
///
/// Must run after `identity::resolve` has set `was`/`life`/`wasdist` on
/// every object in `new_objects`.
pub fn reconcile(
    new_objects: &mut [ObjectRecord],
    wasarray: &mut IdGrid,
    new_labels: &LabelGrid,
    next_persistent_id: &mut i64,
) {
    let mut groups: HashMap<i64, Vec<usize>> = HashMap::new();
    for (idx, obj) in new_objects.iter().enumerate() {
        if obj.wasdist.is_some() {
            groups.entry(obj.was).or_default().push(idx);
        }
    }

    let mut collision_keys: Vec<i64> = groups
        .iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(&was, _)| was)
        .collect();
    collision_keys.sort_unstable();

    for was in collision_keys {
        let mut members = groups[&was].clone();
        members.sort_by_key(|&idx| new_objects[idx].storm);

        let parent_idx = *members
            .iter()
            .reduce(|best, candidate| {
                let best_wasdist = new_objects[*best].wasdist.unwrap_or(0);
                let candidate_wasdist = new_objects[*candidate].wasdist.unwrap_or(0);
                if candidate_wasdist > best_wasdist {
                    candidate
                } else {
                    best
                }
            })
            .expect("members is non-empty");

        let parent_was = new_objects[parent_idx].was;
        let parent_life = new_objects[parent_idx].life;

        for &idx in &members {
            if idx == parent_idx {
                continue;
            }

            let child_storm = new_objects[idx].storm;
            let old_was = new_objects[idx].was;
            let new_was = *next_persistent_id;
            *next_persistent_id += 1;

            new_objects[idx].child = Some(parent_was);
            new_objects[idx].was = new_was;
            new_objects[idx].life = parent_life;
            new_objects[idx].wasdist = None;

            for ((r, c), &label) in new_labels.indexed_iter() {
                if label as i64 == child_storm {
                    wasarray[[r, c]] = new_was;
                }
            }

            new_objects[parent_idx].parent.push(new_was);

            debug!(
                was = old_was,
                reassigned_to = new_was,
                parent = parent_was,
                "resolved multi-inheritance collision"
            );
        }
    }

    let live: HashSet<i64> = new_objects.iter().map(|o| o.was).collect();
    for obj in new_objects.iter_mut() {
        obj.accreted.retain(|id| !live.contains(id));
    }
}
