//! The reader-agnostic PBF loader: drives a [`Store`] from a sequence of
//! decoded [`PrimitiveBlock`]s.

use log::warn;

use crate::error::{Error, ErrorKind, Result};
use crate::pbf::types::{PrimitiveBlock, PrimitiveGroup};
use crate::relations::Member;
use crate::store::Store;
use crate::types::{BBox, EntityType};

/// Running counts for one or more [`load_block`] calls.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoadStats {
    pub nodes_added: usize,
    pub ways_added: usize,
    pub relations_added: usize,
}

/// Feeds one decoded block into `store`. Strings are interned into the
/// shared StringTable first so the block-local `string_map` is available to
/// every group. If `extract_bbox` is given, dense nodes are filtered to it,
/// and ways/relations are implicitly trimmed by `Nodes`/`Ways` already only
/// containing the kept subset.
///
/// Per the ingest invariant, a non-dense node group is rejected fatally.
pub fn load_block(
    store: &mut Store,
    block: &PrimitiveBlock,
    extract_bbox: Option<BBox>,
    stats: &mut LoadStats,
) -> Result<()> {
    let (string_table, nodes, ways, relations) = store.fields_mut();

    let mut string_map = Vec::with_capacity(block.stringtable.len());
    for raw in &block.stringtable {
        string_map.push(string_table.add_bytes(raw)?);
    }

    for group in &block.groups {
        match group {
            PrimitiveGroup::DenseNodes(dense) => {
                let filter = extract_bbox
                    .map(|bbox| move |_id: i64, lon: f64, lat: f64| bbox.contains_point(lon, lat));
                let filter_ref: Option<&dyn Fn(i64, f64, f64) -> bool> =
                    filter.as_ref().map(|f| f as &dyn Fn(i64, f64, f64) -> bool);
                stats.nodes_added += nodes.add_dense(block, dense, &string_map, filter_ref);
            }
            PrimitiveGroup::Ways(records) => {
                nodes.finalize();
                let nodes_ref: &crate::nodes::Nodes = nodes;
                let way_filter = extract_bbox.map(|bbox| {
                    move |ref_id: i64| {
                        let idx = nodes_ref.ids().get_index_from_id(ref_id);
                        idx >= 0 && {
                            let (lon, lat) = nodes_ref.get_lonlat(idx as u32);
                            bbox.contains_point(lon, lat)
                        }
                    }
                });
                // Node existence is always enforced by `Ways::add_ways`
                // itself; the extract filter here only narrows further.
                let filter_ref: Option<&dyn Fn(i64) -> bool> =
                    way_filter.as_ref().map(|f| f as &dyn Fn(i64) -> bool);
                stats.ways_added += ways.add_ways(records, &string_map, nodes_ref, filter_ref);
            }
            PrimitiveGroup::Relations(records) => {
                ways.finalize(nodes);
                let nodes_ref: &crate::nodes::Nodes = nodes;
                let ways_ref: &crate::ways::Ways = ways;
                // Node/way members are dropped if their referent didn't
                // survive the same bbox filter; relation members are always
                // kept since sibling relations aren't filtered here.
                let relation_filter = extract_bbox.map(|_| {
                    move |m: &Member| match m.member_type {
                        EntityType::Node => nodes_ref.ids().has(m.member_ref),
                        EntityType::Way => ways_ref.ids().has(m.member_ref),
                        EntityType::Relation => true,
                    }
                });
                let filter_ref: Option<&dyn Fn(&Member) -> bool> =
                    relation_filter.as_ref().map(|f| f as &dyn Fn(&Member) -> bool);
                stats.relations_added += relations.add_relations(records, &string_map, filter_ref);
            }
            PrimitiveGroup::PlainNodes => {
                warn!("rejecting non-dense node group");
                return Err(Error::new(ErrorKind::NonDenseNodeBlock));
            }
        }
    }

    Ok(())
}
