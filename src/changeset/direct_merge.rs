//! Direct-merge generation: turn an entire patch Store into create/modify
//! entries against a base, §4.9.5.

use crate::changeset::entity::{node_entity, relation_entity, way_entity, Entity};
use crate::changeset::ChangeSet;
use crate::store::Store;
use crate::types::EntityType;

fn dedup_adjacent_refs(refs: &[i64]) -> Vec<i64> {
    let mut out: Vec<i64> = Vec::with_capacity(refs.len());
    for &r in refs {
        if out.last() != Some(&r) {
            out.push(r);
        }
    }
    out
}

/// For each way, then node, then relation in `patch` (ways first so node
/// dedup has maximal context, per §4.9.5): schedules `create` if the id is
/// new to `base`, or `modify` if it exists and properties differ.
pub fn direct_merge(changeset: &mut ChangeSet, base: &Store, patch: &Store) {
    for idx in 0..patch.ways().len() as u32 {
        let mut way = way_entity(patch, idx);
        way.refs = dedup_adjacent_refs(&way.refs);

        let base_idx = base.ways().ids().get_index_from_id(way.id);
        if base_idx < 0 {
            changeset.create(base, Entity::Way(way), None, vec![]);
        } else {
            let base_way = way_entity(base, base_idx as u32);
            if base_way != way {
                changeset.modify(EntityType::Way, way.id, || Some(Entity::Way(base_way)), move |_| Entity::Way(way));
            }
        }
    }

    for idx in 0..patch.nodes().len() as u32 {
        let node = node_entity(patch, idx);
        let base_idx = base.nodes().ids().get_index_from_id(node.id);
        if base_idx < 0 {
            changeset.create(base, Entity::Node(node), None, vec![]);
        } else {
            let base_node = node_entity(base, base_idx as u32);
            if base_node != node {
                changeset.modify(EntityType::Node, node.id, || Some(Entity::Node(base_node)), move |_| {
                    Entity::Node(node)
                });
            }
        }
    }

    for idx in 0..patch.relations().len() as u32 {
        let relation = relation_entity(patch, idx);
        let base_idx = base.relations().ids().get_index_from_id(relation.id);
        if base_idx < 0 {
            changeset.create(base, Entity::Relation(relation), None, vec![]);
        } else {
            let base_relation = relation_entity(base, base_idx as u32);
            if base_relation != relation {
                changeset.modify(EntityType::Relation, relation.id, || Some(Entity::Relation(base_relation)), move |_| {
                    Entity::Relation(relation)
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_way_in_patch_is_scheduled_as_create() {
        let base = Store::new("base");
        let mut patch = Store::new("patch");
        patch.add_node(1, 0.0, 0.0, &[]);
        patch.add_node(2, 1.0, 1.0, &[]);
        patch.add_way(10, &[1, 2], &[]);
        patch.finalize(true);

        let mut changeset = ChangeSet::new();
        direct_merge(&mut changeset, &base, &patch);
        assert!(!changeset.is_empty());
    }

    #[test]
    fn unchanged_way_produces_no_entry() {
        let mut base = Store::new("base");
        base.add_node(1, 0.0, 0.0, &[]);
        base.add_node(2, 1.0, 1.0, &[]);
        base.add_way(10, &[1, 2], &[("highway", "residential")]);
        base.finalize(true);

        let mut patch = Store::new("patch");
        patch.add_node(1, 0.0, 0.0, &[]);
        patch.add_node(2, 1.0, 1.0, &[]);
        patch.add_way(10, &[1, 2], &[("highway", "residential")]);
        patch.finalize(true);

        let mut changeset = ChangeSet::new();
        direct_merge(&mut changeset, &base, &patch);
        assert!(changeset.is_empty());
    }
}
