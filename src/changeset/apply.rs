//! Applying a change-set to its base, producing a new Store, §4.9.6.

use crate::changeset::entity::{node_entity, relation_entity, way_entity, Entity, RelationMember};
use crate::changeset::{Change, ChangeSet};
use crate::relations::Member;
use crate::store::Store;
use crate::types::EntityType;

fn tag_refs(tags: &[(String, String)]) -> Vec<(&str, &str)> {
    tags.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

fn resolve_members(store: &mut Store, members: &[RelationMember]) -> Vec<Member> {
    members
        .iter()
        .map(|m| Member {
            member_type: m.member_type,
            member_ref: m.member_ref,
            role: if m.role.is_empty() { -1 } else { store.string_table_mut().add(&m.role) as i32 },
        })
        .collect()
}

fn write_node(store: &mut Store, n: &crate::changeset::entity::NodeEntity) {
    store.add_node(n.id, n.lon, n.lat, &tag_refs(&n.tags));
}

fn write_way(store: &mut Store, w: &crate::changeset::entity::WayEntity) {
    store.add_way(w.id, &w.refs, &tag_refs(&w.tags));
}

fn write_relation(store: &mut Store, r: &crate::changeset::entity::RelationEntity) {
    let members = resolve_members(store, &r.members);
    store.add_relation(r.id, &members, &tag_refs(&r.tags));
}

/// Visits every base entity in storage order, overlaying `changeset`
/// entries where present (consuming them), then writes any remaining
/// `create` entries. Any non-`create` entry remaining after the base pass,
/// or a `create` colliding with an existing base entity, is a programmer
/// error (invariant violation) and panics.
pub fn apply_changeset(changeset: ChangeSet, base: &Store, new_id: impl Into<String>) -> Store {
    let mut entries = changeset.entries;
    let mut new_store = Store::new(new_id);
    new_store.header = base.header.clone();

    for idx in 0..base.nodes().len() as u32 {
        let id = base.nodes().ids().at(idx);
        match entries.remove(&(EntityType::Node, id)) {
            None => write_node(&mut new_store, &node_entity(base, idx)),
            Some(entry) => apply_entry(&mut new_store, EntityType::Node, id, entry.change),
        }
    }

    for idx in 0..base.ways().len() as u32 {
        let id = base.ways().ids().at(idx);
        match entries.remove(&(EntityType::Way, id)) {
            None => write_way(&mut new_store, &way_entity(base, idx)),
            Some(entry) => apply_entry(&mut new_store, EntityType::Way, id, entry.change),
        }
    }

    for idx in 0..base.relations().len() as u32 {
        let id = base.relations().ids().at(idx);
        match entries.remove(&(EntityType::Relation, id)) {
            None => write_relation(&mut new_store, &relation_entity(base, idx)),
            Some(entry) => apply_entry(&mut new_store, EntityType::Relation, id, entry.change),
        }
    }

    let mut remaining: Vec<_> = entries.into_iter().collect();
    remaining.sort_by_key(|&((entity_type, id), _)| (entity_type as u8, id));

    for ((entity_type, id), entry) in remaining {
        match entry.change {
            Change::Create(entity) => write_new_entity(&mut new_store, entity),
            Change::Modify(_) | Change::Delete => {
                panic!("apply_changeset: non-create entry remaining for {entity_type:?} {id} after base pass")
            }
        }
    }

    new_store.finalize(true);
    new_store
}

fn apply_entry(store: &mut Store, entity_type: EntityType, id: i64, change: Change) {
    match change {
        Change::Delete => {}
        Change::Create(_) => {
            panic!("apply_changeset: create entry for existing base {entity_type:?} {id}")
        }
        Change::Modify(entity) => write_new_entity(store, entity),
    }
}

fn write_new_entity(store: &mut Store, entity: Entity) {
    match entity {
        Entity::Node(n) => write_node(store, &n),
        Entity::Way(w) => write_way(store, &w),
        Entity::Relation(r) => write_relation(store, &r),
    }
}
