//! Way deduplication (identical or coordinate-equal ways), §4.9.3.

use std::collections::HashSet;

use crate::changeset::entity::WayEntity;
use crate::changeset::{BackRef, ChangeSet};
use crate::store::Store;
use crate::types::{BBox, EntityType};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WayDedupStats {
    pub deduplicated_ways: usize,
}

fn way_bbox(way: &WayEntity, base: &Store) -> BBox {
    let mut bbox = BBox::empty();
    for &id in &way.refs {
        let idx = base.nodes().ids().get_index_from_id(id);
        if idx >= 0 {
            let (lon, lat) = base.nodes().get_lonlat(idx as u32);
            bbox.expand_with_point(lon, lat);
        }
    }
    bbox
}

fn way_coordinates(way: &WayEntity, base: &Store) -> Option<Vec<(f64, f64)>> {
    way.refs
        .iter()
        .map(|&id| {
            let idx = base.nodes().ids().get_index_from_id(id);
            if idx < 0 {
                None
            } else {
                Some(base.nodes().get_lonlat(idx as u32))
            }
        })
        .collect()
}

pub fn dedupe_ways(changeset: &mut ChangeSet, base: &Store, patch: &[WayEntity]) -> WayDedupStats {
    let mut stats = WayDedupStats::default();
    let mut considered_pairs: HashSet<(i64, i64)> = HashSet::new();

    for w in patch {
        let bbox = way_bbox(w, base);
        let candidates = base.ways().intersects(&bbox, None);

        // Losers of a dedup pair scheduled for deletion this round, keyed
        // by the winner's BackRef, so a way can only lose to one pairing.
        let mut patch_loses: Vec<BackRef> = Vec::new();
        let mut base_losers: Vec<(i64, BackRef)> = Vec::new();

        for idx in candidates {
            let o_id = base.ways().ids().at(idx);
            if o_id == w.id {
                continue;
            }
            let pair_key = if o_id < w.id { (o_id, w.id) } else { (w.id, o_id) };
            if !considered_pairs.insert(pair_key) {
                continue;
            }

            let o = crate::changeset::entity::way_entity(base, idx);

            let tags_refs_equal = o.tags == w.tags && o.refs == w.refs;
            let is_duplicate = tags_refs_equal || {
                match (way_coordinates(w, base), way_coordinates(&o, base)) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            };

            if !is_duplicate {
                continue;
            }

            if tags_refs_equal {
                patch_loses.push(BackRef { entity_type: EntityType::Way, id: o_id, osm_id: Some(base.id.clone()) });
                continue;
            }

            // Coordinate-equal but not identical: break the tie by version.
            // If the base way is strictly newer, neither side is deleted —
            // the patch way just loses this pairing, not the base way.
            let w_version = crate::changeset::entity::Entity::Way(w.clone()).version();
            let o_version = crate::changeset::entity::Entity::Way(o.clone()).version();

            match w_version.cmp(&o_version) {
                std::cmp::Ordering::Less => {
                    patch_loses.push(BackRef { entity_type: EntityType::Way, id: o_id, osm_id: Some(base.id.clone()) });
                }
                std::cmp::Ordering::Equal => {
                    if w.tags.len() > o.tags.len() {
                        base_losers.push((o_id, BackRef { entity_type: EntityType::Way, id: w.id, osm_id: None }));
                    } else {
                        patch_loses.push(BackRef { entity_type: EntityType::Way, id: o_id, osm_id: Some(base.id.clone()) });
                    }
                }
                std::cmp::Ordering::Greater => continue,
            }
        }

        if !patch_loses.is_empty() {
            changeset.delete(EntityType::Way, w.id, patch_loses);
            stats.deduplicated_ways += 1;
        }
        for (o_id, winner) in base_losers {
            changeset.delete(EntityType::Way, o_id, vec![winner]);
            stats.deduplicated_ways += 1;
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_with_way() -> Store {
        let mut store = Store::new("base");
        store.add_node(1, 0.0, 0.0, &[]);
        store.add_node(2, 1.0, 1.0, &[]);
        store.add_way(10, &[1, 2], &[("highway", "residential")]);
        store.finalize(true);
        store
    }

    #[test]
    fn identical_way_is_deduplicated() {
        let base = base_with_way();
        let patch = vec![WayEntity {
            id: 20,
            refs: vec![1, 2],
            tags: vec![("highway".to_string(), "residential".to_string())],
        }];
        let mut changeset = ChangeSet::new();
        let stats = dedupe_ways(&mut changeset, &base, &patch);
        assert_eq!(stats.deduplicated_ways, 1);
        assert!(changeset.is_deleted(EntityType::Way, 20));
    }

    #[test]
    fn older_base_version_is_not_a_duplicate() {
        // o.version (1) < w.version (2): per the tie-break rule this is not
        // a duplicate at all, so neither way is scheduled for deletion.
        let mut base = Store::new("base");
        base.add_node(1, 0.0, 0.0, &[]);
        base.add_node(2, 1.0, 1.0, &[]);
        base.add_way(10, &[1, 2], &[("highway", "residential"), ("ext:osm_version", "1")]);
        base.finalize(true);

        let patch = vec![WayEntity {
            id: 20,
            refs: vec![1, 2],
            tags: vec![
                ("highway".to_string(), "residential".to_string()),
                ("ext:osm_version".to_string(), "2".to_string()),
                ("surface".to_string(), "asphalt".to_string()),
            ],
        }];
        let mut changeset = ChangeSet::new();
        let stats = dedupe_ways(&mut changeset, &base, &patch);
        assert_eq!(stats.deduplicated_ways, 0);
        assert!(!changeset.is_deleted(EntityType::Way, 10));
        assert!(!changeset.is_deleted(EntityType::Way, 20));
    }

    #[test]
    fn newer_base_version_wins_over_patch() {
        let mut base = Store::new("base");
        base.add_node(1, 0.0, 0.0, &[]);
        base.add_node(2, 1.0, 1.0, &[]);
        base.add_way(10, &[1, 2], &[("highway", "residential"), ("ext:osm_version", "2")]);
        base.finalize(true);

        let patch = vec![WayEntity {
            id: 20,
            refs: vec![1, 2],
            tags: vec![
                ("highway".to_string(), "residential".to_string()),
                ("ext:osm_version".to_string(), "1".to_string()),
            ],
        }];
        let mut changeset = ChangeSet::new();
        let stats = dedupe_ways(&mut changeset, &base, &patch);
        assert_eq!(stats.deduplicated_ways, 1);
        assert!(changeset.is_deleted(EntityType::Way, 20));
        assert!(!changeset.is_deleted(EntityType::Way, 10));
    }

    #[test]
    fn distinct_way_is_not_deduplicated() {
        let mut base = Store::new("base");
        base.add_node(1, 0.0, 0.0, &[]);
        base.add_node(2, 1.0, 1.0, &[]);
        base.add_node(3, 5.0, 5.0, &[]);
        base.add_way(10, &[1, 2], &[("highway", "residential")]);
        base.finalize(true);

        // different node refs: genuinely different geometry, not just
        // different tags on the same nodes.
        let patch = vec![WayEntity {
            id: 20,
            refs: vec![2, 3],
            tags: vec![("highway".to_string(), "primary".to_string())],
        }];
        let mut changeset = ChangeSet::new();
        let stats = dedupe_ways(&mut changeset, &base, &patch);
        assert_eq!(stats.deduplicated_ways, 0);
    }
}
