//! The change-set engine: a sparse, base-relative overlay of create/modify/
//! delete entries, plus the dedup/intersection passes that populate one and
//! the apply pass that turns it into a new Store.

pub mod entity;

mod apply;
mod dedupe_nodes;
mod dedupe_ways;
mod direct_merge;
mod intersections;

pub use apply::apply_changeset;
pub use dedupe_nodes::{dedupe_nodes, NodeDedupStats};
pub use dedupe_ways::{dedupe_ways, WayDedupStats};
pub use direct_merge::direct_merge;
pub use intersections::{create_intersections, NodeIdAllocator};

use std::collections::HashMap;

use log::warn;

use crate::changeset::entity::Entity;
use crate::store::Store;
use crate::types::EntityType;

/// A cross-entity pointer recorded alongside a change-set entry, purely for
/// audit/visualization — it plays no role in `apply_changeset`.
#[derive(Clone, Debug, PartialEq)]
pub struct BackRef {
    pub entity_type: EntityType,
    pub id: i64,
    pub osm_id: Option<String>,
}

#[derive(Clone, Debug)]
enum Change {
    Create(Entity),
    Modify(Entity),
    Delete,
}

#[derive(Clone, Debug)]
struct ChangeEntry {
    change: Change,
    osm_id: Option<String>,
    back_refs: Vec<BackRef>,
}

/// A sparse map of pending entity changes, bound at construction to a base
/// Store the changes are relative to. The base is never mutated; applying
/// the change-set produces a new Store.
#[derive(Debug, Default)]
pub struct ChangeSet {
    entries: HashMap<(EntityType, i64), ChangeEntry>,
}

impl ChangeSet {
    pub fn new() -> ChangeSet {
        ChangeSet::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn exists_in_base(base: &Store, entity_type: EntityType, id: i64) -> bool {
        match entity_type {
            EntityType::Node => base.nodes().ids().has(id),
            EntityType::Way => base.ways().ids().has(id),
            EntityType::Relation => base.relations().ids().has(id),
        }
    }

    /// Requires `entity`'s id does not exist in `base`.
    pub fn create(&mut self, base: &Store, entity: Entity, osm_id: Option<String>, refs: Vec<BackRef>) {
        let key = (entity.entity_type(), entity.id());
        assert!(
            !Self::exists_in_base(base, key.0, key.1),
            "changeset create: {:?} id {} already exists in base",
            key.0,
            key.1
        );
        self.entries.insert(
            key,
            ChangeEntry { change: Change::Create(entity), osm_id, back_refs: refs },
        );
    }

    /// Applies `f` to the most recent in-flight entity (or the base entity,
    /// resolved via `current`), storing the result. A modify on top of a
    /// `delete` is refused (logged, ignored). A modify on top of `create`
    /// keeps the change-kind `create` but updates the entity.
    pub fn modify(
        &mut self,
        entity_type: EntityType,
        id: i64,
        current: impl FnOnce() -> Option<Entity>,
        f: impl FnOnce(Entity) -> Entity,
    ) {
        let key = (entity_type, id);
        match self.entries.get(&key) {
            Some(ChangeEntry { change: Change::Delete, .. }) => {
                warn!("ignoring modify of {entity_type:?} {id}: already scheduled for deletion");
            }
            Some(entry) => {
                let (kind_is_create, prev) = match &entry.change {
                    Change::Create(e) => (true, e.clone()),
                    Change::Modify(e) => (false, e.clone()),
                    Change::Delete => unreachable!("handled above"),
                };
                let updated = f(prev);
                let osm_id = entry.osm_id.clone();
                let back_refs = entry.back_refs.clone();
                let change = if kind_is_create { Change::Create(updated) } else { Change::Modify(updated) };
                self.entries.insert(key, ChangeEntry { change, osm_id, back_refs });
            }
            None => match current() {
                Some(base_entity) => {
                    let updated = f(base_entity);
                    self.entries.insert(
                        key,
                        ChangeEntry { change: Change::Modify(updated), osm_id: None, back_refs: Vec::new() },
                    );
                }
                None => warn!("ignoring modify of {entity_type:?} {id}: not found in base or change-set"),
            },
        }
    }

    pub fn delete(&mut self, entity_type: EntityType, id: i64, refs: Vec<BackRef>) {
        let key = (entity_type, id);
        self.entries
            .insert(key, ChangeEntry { change: Change::Delete, osm_id: None, back_refs: refs });
    }

    fn get(&self, entity_type: EntityType, id: i64) -> Option<&Entity> {
        match self.entries.get(&(entity_type, id))?.change {
            Change::Create(ref e) | Change::Modify(ref e) => Some(e),
            Change::Delete => None,
        }
    }

    fn is_deleted(&self, entity_type: EntityType, id: i64) -> bool {
        matches!(self.entries.get(&(entity_type, id)), Some(ChangeEntry { change: Change::Delete, .. }))
    }

    /// A snapshot of every pending entry, shaped for [`crate::osc::write_osc`].
    pub fn osc_entries(&self) -> Vec<crate::osc::OscEntry> {
        self.entries
            .iter()
            .map(|(&(entity_type, id), entry)| match &entry.change {
                Change::Create(e) => crate::osc::OscEntry::Create(e),
                Change::Modify(e) => crate::osc::OscEntry::Modify(e),
                Change::Delete => crate::osc::OscEntry::Delete { entity_type, id },
            })
            .collect()
    }
}
