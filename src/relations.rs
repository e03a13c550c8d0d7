//! Relation storage: id/tag columns and a CSR of typed, named members.

use std::collections::{HashSet, VecDeque};

use crate::ids::Ids;
use crate::nodes::Nodes;
use crate::pbf::types::RelationRecord;
use crate::string_table::StringTable;
use crate::tags::Tags;
use crate::types::{BBox, EntityType};
use crate::ways::Ways;

/// Maximum recursion depth when resolving a relation's members that are
/// themselves relations (e.g. during bbox resolution).
const MAX_NESTING_DEPTH: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Member {
    pub member_type: EntityType,
    pub member_ref: i64,
    /// String-table index of the member's role, or `-1` if empty.
    pub role: i32,
}

/// A coarse geometric/semantic classification derived from the `type` tag
/// and member shape, used to pick a rendering or query strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    Area,
    Line,
    Point,
    Super,
    Logic,
}

#[derive(Debug, Default)]
pub struct Relations {
    ids: Ids,
    tags: Tags,
    member_start: Vec<u32>,
    member_count: Vec<u32>,
    member_types: Vec<EntityType>,
    member_refs: Vec<i64>,
    member_roles: Vec<i32>,
    finalized: bool,
}

impl Relations {
    pub fn new() -> Relations {
        Relations::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &Ids {
        &self.ids
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn add_relation(&mut self, id: i64, members: &[Member], tags: &[(u32, u32)]) -> u32 {
        assert!(!self.finalized, "Relations::add_relation called after finalize");
        let idx = self.ids.add(id);
        self.tags.add_tags(idx, tags);
        self.member_start.push(self.member_refs.len() as u32);
        self.member_count.push(members.len() as u32);
        for m in members {
            self.member_types.push(m.member_type);
            self.member_refs.push(m.member_ref);
            self.member_roles.push(m.role);
        }
        idx
    }

    /// Delta-decodes `memids` for each record (`memids[i] += memids[i-1]`,
    /// initial 0) and appends the relation. `filter`, if given, is applied
    /// to the fully-resolved member list; a relation whose members are all
    /// filtered out is still kept (relations are not dropped for losing
    /// members, only ways are — see `Ways::add_ways`).
    pub fn add_relations(
        &mut self,
        records: &[RelationRecord],
        string_map: &[u32],
        filter: Option<&dyn Fn(&Member) -> bool>,
    ) -> usize {
        assert!(!self.finalized, "Relations::add_relations called after finalize");
        let mut kept = 0;

        for record in records {
            let mut ref_sum: i64 = 0;
            let mut members = Vec::with_capacity(record.memids.len());
            for i in 0..record.memids.len() {
                ref_sum += record.memids[i];
                let member_type = match EntityType::from_member_type(record.types[i]) {
                    Some(t) => t,
                    None => continue,
                };
                let role_sid = record.roles_sid.get(i).copied().unwrap_or(-1);
                let role = if role_sid < 0 { -1 } else { string_map[role_sid as usize] as i32 };
                let m = Member { member_type, member_ref: ref_sum, role };
                if filter.map_or(true, |f| f(&m)) {
                    members.push(m);
                }
            }

            let kv: Vec<(u32, u32)> = record
                .keys
                .iter()
                .zip(record.vals.iter())
                .map(|(&k, &v)| (string_map[k as usize], string_map[v as usize]))
                .collect();

            self.add_relation(record.id, &members, &kv);
            kept += 1;
        }

        kept
    }

    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.ids.finalize();
        self.tags.finalize();
        self.member_refs.shrink_to_fit();
        self.member_types.shrink_to_fit();
        self.member_roles.shrink_to_fit();
        self.finalized = true;
    }

    pub fn get_members(&self, r: u32) -> Vec<Member> {
        let start = self.member_start[r as usize] as usize;
        let count = self.member_count[r as usize] as usize;
        (start..start + count)
            .map(|i| Member {
                member_type: self.member_types[i],
                member_ref: self.member_refs[i],
                role: self.member_roles[i],
            })
            .collect()
    }

    pub fn includes_member(&self, r: u32, member_ref: i64, member_type: EntityType, role: Option<i32>) -> bool {
        self.get_members(r).iter().any(|m| {
            m.member_ref == member_ref
                && m.member_type == member_type
                && role.map_or(true, |role| m.role == role)
        })
    }

    /// The union, over every relation, of member ids whose type is `Way`.
    pub fn get_way_member_ids(&self) -> HashSet<i64> {
        let mut out = HashSet::new();
        for i in 0..self.member_refs.len() {
            if self.member_types[i] == EntityType::Way {
                out.insert(self.member_refs[i]);
            }
        }
        out
    }

    /// Classifies a relation by its `type` tag, falling back to shape-based
    /// rules when the tag is absent or unrecognized.
    pub fn classify_kind(&self, r: u32, string_table: &mut StringTable) -> RelationKind {
        if let Some(kv) = self.tags.get_tags(r) {
            let type_idx = string_table.find("type");
            if type_idx >= 0 {
                if let Some(&(_, val)) = kv.iter().find(|&&(k, _)| k as i32 == type_idx) {
                    let value = string_table.get(val);
                    match value {
                        "multipolygon" | "boundary" | "site" => return RelationKind::Area,
                        "route" | "waterway" | "multilinestring" | "canal" => return RelationKind::Line,
                        "multipoint" => return RelationKind::Point,
                        "restriction" | "route_master" | "network" | "collection" => {
                            return RelationKind::Logic
                        }
                        _ => {}
                    }
                }
            }
        }

        if self.get_members(r).iter().any(|m| m.member_type == EntityType::Relation) {
            return RelationKind::Super;
        }
        RelationKind::Logic
    }

    /// The bbox-resolved envelope of a relation, by recursively resolving
    /// member ways/nodes/relations. Nested relations are bounded to depth
    /// [`MAX_NESTING_DEPTH`] and cycle-guarded.
    pub fn resolve_bbox(&self, r: u32, nodes: &Nodes, ways: &Ways) -> BBox {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back((r, 0u32));
        let mut bbox = BBox::empty();

        while let Some((relation_idx, depth)) = queue.pop_front() {
            if !visited.insert(relation_idx) || depth > MAX_NESTING_DEPTH {
                continue;
            }
            for m in self.get_members(relation_idx) {
                match m.member_type {
                    EntityType::Node => {
                        let idx = nodes.ids().get_index_from_id(m.member_ref);
                        if idx >= 0 {
                            let (lon, lat) = nodes.get_lonlat(idx as u32);
                            bbox.expand_with_point(lon, lat);
                        }
                    }
                    EntityType::Way => {
                        let idx = ways.ids().get_index_from_id(m.member_ref);
                        if idx >= 0 {
                            bbox.expand_with_bbox(&ways.bbox(idx as u32));
                        }
                    }
                    EntityType::Relation => {
                        let idx = self.ids.get_index_from_id(m.member_ref);
                        if idx >= 0 {
                            queue.push_back((idx as u32, depth + 1));
                        }
                    }
                }
            }
        }

        bbox
    }

    /// Relation indexes whose resolved bbox intersects `bbox`. `filter`, if
    /// given, short-circuits per candidate.
    pub fn intersects(
        &self,
        bbox: &BBox,
        nodes: &Nodes,
        ways: &Ways,
        filter: Option<&dyn Fn(u32) -> bool>,
    ) -> Vec<u32> {
        (0..self.len() as u32)
            .filter(|&r| filter.map_or(true, |f| f(r)))
            .filter(|&r| self.resolve_bbox(r, nodes, ways).intersects(bbox))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_members_and_includes_member_round_trip() {
        let mut relations = Relations::new();
        let members = [
            Member { member_type: EntityType::Way, member_ref: 10, role: 1 },
            Member { member_type: EntityType::Node, member_ref: 20, role: -1 },
        ];
        relations.add_relation(1, &members, &[]);
        relations.finalize();

        assert_eq!(relations.get_members(0), members.to_vec());
        assert!(relations.includes_member(0, 10, EntityType::Way, Some(1)));
        assert!(!relations.includes_member(0, 10, EntityType::Way, Some(99)));
        assert!(!relations.includes_member(0, 999, EntityType::Way, None));
    }

    #[test]
    fn get_way_member_ids_unions_across_relations() {
        let mut relations = Relations::new();
        relations.add_relation(
            1,
            &[Member { member_type: EntityType::Way, member_ref: 1, role: -1 }],
            &[],
        );
        relations.add_relation(
            2,
            &[
                Member { member_type: EntityType::Way, member_ref: 1, role: -1 },
                Member { member_type: EntityType::Way, member_ref: 2, role: -1 },
            ],
            &[],
        );
        relations.finalize();

        let ids = relations.get_way_member_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&1));
        assert!(ids.contains(&2));
    }

    #[test]
    fn classify_kind_reads_type_tag() {
        let mut string_table = StringTable::new();
        let k_type = string_table.add("type");
        let v_multipolygon = string_table.add("multipolygon");

        let mut relations = Relations::new();
        relations.add_relation(1, &[], &[(k_type, v_multipolygon)]);
        relations.finalize();

        assert_eq!(relations.classify_kind(0, &mut string_table), RelationKind::Area);
    }

    #[test]
    fn classify_kind_falls_back_to_super_for_relation_members() {
        let mut string_table = StringTable::new();
        let mut relations = Relations::new();
        relations.add_relation(
            1,
            &[Member { member_type: EntityType::Relation, member_ref: 2, role: -1 }],
            &[],
        );
        relations.finalize();

        assert_eq!(relations.classify_kind(0, &mut string_table), RelationKind::Super);
    }
}
