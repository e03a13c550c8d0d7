//! Bbox subset selection: builds a fresh Store containing only entities
//! that survive a bbox filter, via the ordinary fill/finalize path (§4.10).

use std::collections::HashSet;

use crate::store::Store;
use crate::types::BBox;

/// Which ways/relations survive an extract besides their directly-contained
/// nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractStrategy {
    /// A way is kept iff at least one of its refs lies in the bbox, and its
    /// ref list is trimmed to the surviving refs.
    Simple,
    /// Nodes are selected as in `Simple`, but any way whose bbox intersects
    /// the extract bbox is kept in full (every ref, even nodes outside the
    /// bbox), so geometry is never truncated.
    CompleteWays,
}

/// Extracts the subset of `source` relevant to `bbox`, building a new Store
/// named `new_id` via the ordinary fill/finalize path.
pub fn extract(source: &Store, bbox: &BBox, strategy: ExtractStrategy, new_id: impl Into<String>) -> Store {
    let mut kept_node_ids: HashSet<i64> = HashSet::new();
    for idx in source.nodes().find_indexes_within_bbox(bbox) {
        kept_node_ids.insert(source.nodes().ids().at(idx));
    }

    let mut out = Store::new(new_id);

    for idx in 0..source.nodes().len() as u32 {
        let id = source.nodes().ids().at(idx);
        if kept_node_ids.contains(&id) {
            let (lon, lat) = source.nodes().get_lonlat(idx);
            add_node_with_tags(&mut out, source, idx, id, lon, lat);
        }
    }

    let fully_kept_way_indexes: HashSet<u32> = match strategy {
        ExtractStrategy::Simple => HashSet::new(),
        ExtractStrategy::CompleteWays => source.ways().intersects(bbox, None).into_iter().collect(),
    };

    let mut kept_way_ids: HashSet<i64> = HashSet::new();

    for idx in 0..source.ways().len() as u32 {
        let refs = source.ways().get_ref_ids(idx);
        let fully_kept = fully_kept_way_indexes.contains(&idx);

        let surviving_refs: Vec<i64> = if fully_kept {
            refs.to_vec()
        } else {
            refs.iter().copied().filter(|id| kept_node_ids.contains(id)).collect()
        };

        if surviving_refs.is_empty() {
            continue;
        }

        // CompleteWays may pull in refs outside the originally-kept node
        // set; make sure those nodes exist in `out` too.
        for &ref_id in &surviving_refs {
            if kept_node_ids.insert(ref_id) {
                if let Some(src_idx) = present_in_source(source, ref_id) {
                    let (lon, lat) = source.nodes().get_lonlat(src_idx);
                    add_node_with_tags(&mut out, source, src_idx, ref_id, lon, lat);
                }
            }
        }

        let id = source.ways().ids().at(idx);
        let kv = tags_as_str_pairs(source.string_table(), source.ways().tags().get_tags(idx));
        if out.add_way(id, &surviving_refs, &kv).is_some() {
            kept_way_ids.insert(id);
        }
    }

    for idx in 0..source.relations().len() as u32 {
        let members = source.relations().get_members(idx);
        let surviving: Vec<crate::relations::Member> = members
            .into_iter()
            .filter(|m| match m.member_type {
                crate::types::EntityType::Node => kept_node_ids.contains(&m.member_ref),
                crate::types::EntityType::Way => kept_way_ids.contains(&m.member_ref),
                crate::types::EntityType::Relation => true,
            })
            .collect();

        if surviving.is_empty() {
            continue;
        }

        let id = source.relations().ids().at(idx);
        let kv = tags_as_str_pairs(source.string_table(), source.relations().tags().get_tags(idx));
        out.add_relation(id, &surviving, &kv);
    }

    out.finalize(true);
    out
}

fn present_in_source(source: &Store, node_id: i64) -> Option<u32> {
    let idx = source.nodes().ids().get_index_from_id(node_id);
    (idx >= 0).then_some(idx as u32)
}

fn add_node_with_tags(out: &mut Store, source: &Store, src_idx: u32, id: i64, lon: f64, lat: f64) {
    let kv = tags_as_str_pairs(source.string_table(), source.nodes().tags().get_tags(src_idx));
    out.add_node(id, lon, lat, &kv);
}

fn tags_as_str_pairs<'a>(
    table: &'a crate::string_table::StringTable,
    kv: Option<Vec<(u32, u32)>>,
) -> Vec<(&'a str, &'a str)> {
    kv.unwrap_or_default().into_iter().map(|(k, v)| (table.get(k), table.get(v))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Store {
        let mut store = Store::new("source");
        store.add_node(1, 0.0, 0.0, &[]);
        store.add_node(2, 5.0, 5.0, &[]);
        store.add_node(3, 10.0, 10.0, &[]);
        store.add_way(10, &[1, 2], &[("highway", "residential")]);
        store.add_way(20, &[2, 3], &[("highway", "residential")]);
        store.finalize(true);
        store
    }

    #[test]
    fn simple_trims_way_refs_to_the_bbox() {
        let source = sample();
        let bbox = BBox::new(-1.0, -1.0, 1.0, 1.0);
        let extracted = extract(&source, &bbox, ExtractStrategy::Simple, "extract");
        assert_eq!(extracted.nodes().len(), 1);
        assert_eq!(extracted.ways().len(), 1);
        assert_eq!(extracted.ways().get_ref_ids(0), &[1]);
    }

    #[test]
    fn complete_ways_keeps_full_geometry() {
        let source = sample();
        let bbox = BBox::new(-1.0, -1.0, 1.0, 1.0);
        let extracted = extract(&source, &bbox, ExtractStrategy::CompleteWays, "extract");
        assert_eq!(extracted.ways().len(), 1);
        assert_eq!(extracted.ways().get_ref_ids(0), &[1, 2]);
        // node 2 lies outside the bbox but is pulled in because its way
        // intersects it.
        assert!(extracted.nodes().ids().has(2));
    }
}
