//! Node deduplication (coordinate-exact duplicates), §4.9.2.

use std::collections::HashSet;

use crate::changeset::entity::{node_entity, way_entity, Entity, NodeEntity};
use crate::changeset::{BackRef, ChangeSet};
use crate::store::Store;
use crate::types::EntityType;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeDedupStats {
    pub deduplicated_nodes: usize,
    pub deduplicated_nodes_replaced: usize,
}

/// For each node in `patch`, finds coordinate-exact duplicates already in
/// `base` and schedules way/relation ref rewrites plus the duplicate's
/// deletion, unless a candidate way or relation contains *both* nodes (in
/// which case that dedup pair is aborted to avoid adjacent duplicate refs).
pub fn dedupe_nodes(changeset: &mut ChangeSet, base: &Store, patch: &[NodeEntity]) -> NodeDedupStats {
    let mut stats = NodeDedupStats::default();
    let mut considered_pairs: HashSet<(i64, i64)> = HashSet::new();

    for p in patch {
        if changeset.is_deleted(EntityType::Node, p.id) {
            continue;
        }

        let candidates = base.nodes().find_indexes_within_bbox(&crate::types::BBox::new(p.lon, p.lat, p.lon, p.lat));

        for idx in candidates {
            let e_id = base.nodes().ids().at(idx);
            if e_id == p.id {
                continue;
            }
            let pair_key = if e_id < p.id { (e_id, p.id) } else { (p.id, e_id) };
            if !considered_pairs.insert(pair_key) {
                continue;
            }

            if dedupe_pair(changeset, base, p, e_id) {
                stats.deduplicated_nodes += 1;
            }
        }
    }

    stats.deduplicated_nodes_replaced = count_replacements(changeset);
    stats
}

fn dedupe_pair(changeset: &mut ChangeSet, base: &Store, p: &NodeEntity, e_id: i64) -> bool {
    let mut candidate_ways = Vec::new();
    for idx in base.ways().neighbors(p.lon, p.lat, Some(20), Some(0.0)) {
        let refs = base.ways().get_ref_ids(idx);
        if refs.contains(&e_id) {
            if refs.contains(&p.id) {
                return false; // abort: would create adjacent duplicate refs
            }
            candidate_ways.push(idx);
        }
    }

    let mut candidate_relations = Vec::new();
    for r in 0..base.relations().len() as u32 {
        let contains_e = base.relations().includes_member(r, e_id, EntityType::Node, None);
        let contains_p = base.relations().includes_member(r, p.id, EntityType::Node, None);
        if contains_e {
            if contains_p {
                return false;
            }
            candidate_relations.push(r);
        }
    }

    for idx in candidate_ways {
        let way_id = base.ways().ids().at(idx);
        let base_way = way_entity(base, idx);
        changeset.modify(
            EntityType::Way,
            way_id,
            || Some(Entity::Way(base_way.clone())),
            move |entity| {
                let mut entity = entity;
                if let Some(way) = entity.as_way_mut() {
                    for r in way.refs.iter_mut() {
                        if *r == e_id {
                            *r = p.id;
                        }
                    }
                }
                entity
            },
        );
    }

    for r in candidate_relations {
        let relation_id = base.relations().ids().at(r);
        let base_relation = crate::changeset::entity::relation_entity(base, r);
        changeset.modify(
            EntityType::Relation,
            relation_id,
            || Some(Entity::Relation(base_relation.clone())),
            move |entity| {
                let mut entity = entity;
                if let Some(relation) = entity.as_relation_mut() {
                    for m in relation.members.iter_mut() {
                        if m.member_type == EntityType::Node && m.member_ref == e_id {
                            m.member_ref = p.id;
                        }
                    }
                }
                entity
            },
        );
    }

    changeset.delete(
        EntityType::Node,
        e_id,
        vec![BackRef { entity_type: EntityType::Node, id: p.id, osm_id: Some(base.id.clone()) }],
    );

    true
}

fn count_replacements(changeset: &ChangeSet) -> usize {
    changeset
        .entries
        .values()
        .filter(|e| matches!(e.change, crate::changeset::Change::Modify(_)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_with_two_nodes_and_a_way() -> Store {
        let mut store = Store::new("base");
        store.add_node(1, 0.0, 0.0, &[]);
        store.add_node(2, 1.0, 1.0, &[]);
        store.add_way(10, &[1, 2], &[]);
        store.finalize(true);
        store
    }

    #[test]
    fn exact_duplicate_node_triggers_way_rewrite_and_delete() {
        let base = base_with_two_nodes_and_a_way();
        let patch = vec![NodeEntity { id: 3, lon: 0.0, lat: 0.0, tags: vec![] }];
        let mut changeset = ChangeSet::new();
        let stats = dedupe_nodes(&mut changeset, &base, &patch);

        assert_eq!(stats.deduplicated_nodes, 1);
        assert!(changeset.is_deleted(EntityType::Node, 1));
        let modified_way = changeset.get(EntityType::Way, 10).unwrap();
        assert_eq!(modified_way.as_way().unwrap().refs, vec![3, 2]);
    }

    #[test]
    fn non_duplicate_node_is_left_alone() {
        let base = base_with_two_nodes_and_a_way();
        let patch = vec![NodeEntity { id: 4, lon: 50.0, lat: 50.0, tags: vec![] }];
        let mut changeset = ChangeSet::new();
        let stats = dedupe_nodes(&mut changeset, &base, &patch);
        assert_eq!(stats.deduplicated_nodes, 0);
        assert!(changeset.is_empty());
    }
}
