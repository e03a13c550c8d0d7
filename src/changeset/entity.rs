//! Entity snapshots used while a change-set is in flight, independent of
//! any one Store's StringTable (tags are plain owned strings until the
//! change-set is applied and re-interned into the new Store).

use crate::store::Store;
use crate::types::EntityType;

#[derive(Clone, Debug, PartialEq)]
pub struct NodeEntity {
    pub id: i64,
    pub lon: f64,
    pub lat: f64,
    pub tags: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WayEntity {
    pub id: i64,
    pub refs: Vec<i64>,
    pub tags: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelationMember {
    pub member_type: EntityType,
    pub member_ref: i64,
    pub role: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelationEntity {
    pub id: i64,
    pub members: Vec<RelationMember>,
    pub tags: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Entity {
    Node(NodeEntity),
    Way(WayEntity),
    Relation(RelationEntity),
}

impl Entity {
    pub fn id(&self) -> i64 {
        match self {
            Entity::Node(n) => n.id,
            Entity::Way(w) => w.id,
            Entity::Relation(r) => r.id,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            Entity::Node(_) => EntityType::Node,
            Entity::Way(_) => EntityType::Way,
            Entity::Relation(_) => EntityType::Relation,
        }
    }

    pub fn tags(&self) -> &[(String, String)] {
        match self {
            Entity::Node(n) => &n.tags,
            Entity::Way(w) => &w.tags,
            Entity::Relation(r) => &r.tags,
        }
    }

    /// The integer value of `tags["ext:osm_version"]`, or 0 if absent or
    /// unparseable.
    pub fn version(&self) -> i64 {
        self.tags()
            .iter()
            .find(|(k, _)| k == "ext:osm_version")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(0)
    }

    pub fn as_node(&self) -> Option<&NodeEntity> {
        match self {
            Entity::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_way(&self) -> Option<&WayEntity> {
        match self {
            Entity::Way(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_way_mut(&mut self) -> Option<&mut WayEntity> {
        match self {
            Entity::Way(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_relation_mut(&mut self) -> Option<&mut RelationEntity> {
        match self {
            Entity::Relation(r) => Some(r),
            _ => None,
        }
    }
}

fn resolve_tags(store: &Store, kv: Option<Vec<(u32, u32)>>) -> Vec<(String, String)> {
    let table = store.string_table();
    kv.unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (table.get(k).to_string(), table.get(v).to_string()))
        .collect()
}

/// Snapshots node `idx` of `store` into an owned [`Entity`], re-materializing
/// its tags as plain strings (the snapshot no longer depends on `store`'s
/// StringTable).
pub fn node_entity(store: &Store, idx: u32) -> NodeEntity {
    let nodes = store.nodes();
    let (lon, lat) = nodes.get_lonlat(idx);
    NodeEntity {
        id: nodes.ids().at(idx),
        lon,
        lat,
        tags: resolve_tags(store, nodes.tags().get_tags(idx)),
    }
}

pub fn way_entity(store: &Store, idx: u32) -> WayEntity {
    let ways = store.ways();
    WayEntity {
        id: ways.ids().at(idx),
        refs: ways.get_ref_ids(idx).to_vec(),
        tags: resolve_tags(store, ways.tags().get_tags(idx)),
    }
}

pub fn relation_entity(store: &Store, idx: u32) -> RelationEntity {
    let relations = store.relations();
    let table = store.string_table();
    let members = relations
        .get_members(idx)
        .into_iter()
        .map(|m| RelationMember {
            member_type: m.member_type,
            member_ref: m.member_ref,
            role: if m.role < 0 { String::new() } else { table.get(m.role as u32).to_string() },
        })
        .collect();
    RelationEntity {
        id: relations.ids().at(idx),
        members,
        tags: resolve_tags(store, relations.tags().get_tags(idx)),
    }
}
