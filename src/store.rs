//! The top-level façade wiring a StringTable to Nodes/Ways/Relations and
//! tracking the fill → finalize → query lifecycle.

use crate::nodes::Nodes;
use crate::relations::{Relations, RelationKind};
use crate::string_table::StringTable;
use crate::types::BBox;
use crate::ways::Ways;

/// Metadata carried unchanged across an ingest/emit round-trip, except for
/// `bbox` (optionally rewritten to an extract's bbox) and `writingprogram`/a
/// refreshed timestamp, which the emit pipeline overlays.
#[derive(Clone, Debug, Default)]
pub struct Header {
    pub bbox: Option<BBox>,
    pub writingprogram: Option<String>,
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
    pub source: Option<String>,
    pub osmosis_replication_timestamp: Option<i64>,
    pub osmosis_replication_sequence_number: Option<i64>,
    pub osmosis_replication_base_url: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Fill,
    Query,
}

/// A fully in-memory OSM dataset: a shared StringTable plus the three
/// columnar entity stores.
///
/// Fill-phase callers append via `add_node`/`add_way`/`add_relation` (or the
/// bulk PBF-shaped entry points on `nodes_mut`/`ways_mut`/`relations_mut`),
/// then call [`Store::finalize`] once. Every query method panics if called
/// before `finalize`, and every fill method panics if called after.
#[derive(Debug)]
pub struct Store {
    /// A caller-supplied label (e.g. a source filename), not interpreted.
    pub id: String,
    pub header: Header,
    string_table: StringTable,
    nodes: Nodes,
    ways: Ways,
    relations: Relations,
    phase: Phase,
}

impl Store {
    pub fn new(id: impl Into<String>) -> Store {
        Store {
            id: id.into(),
            header: Header::default(),
            string_table: StringTable::new(),
            nodes: Nodes::new(),
            ways: Ways::new(),
            relations: Relations::new(),
            phase: Phase::Fill,
        }
    }

    fn assert_fill_phase(&self, what: &str) {
        assert_eq!(self.phase, Phase::Fill, "Store::{what} called after finalize");
    }

    fn assert_query_phase(&self, what: &str) {
        assert_eq!(self.phase, Phase::Query, "Store::{what} called before finalize");
    }

    pub fn string_table(&self) -> &StringTable {
        &self.string_table
    }

    pub fn string_table_mut(&mut self) -> &mut StringTable {
        &mut self.string_table
    }

    pub fn nodes(&self) -> &Nodes {
        &self.nodes
    }

    pub fn ways(&self) -> &Ways {
        &self.ways
    }

    pub fn relations(&self) -> &Relations {
        &self.relations
    }

    pub fn nodes_mut(&mut self) -> &mut Nodes {
        self.assert_fill_phase("nodes_mut");
        &mut self.nodes
    }

    pub fn ways_mut(&mut self) -> &mut Ways {
        self.assert_fill_phase("ways_mut");
        &mut self.ways
    }

    pub fn relations_mut(&mut self) -> &mut Relations {
        self.assert_fill_phase("relations_mut");
        &mut self.relations
    }

    /// Disjoint mutable access to every column store plus the shared
    /// StringTable, for the PBF loader (which must interleave fills across
    /// all four while respecting their cross-references).
    pub(crate) fn fields_mut(
        &mut self,
    ) -> (&mut StringTable, &mut Nodes, &mut Ways, &mut Relations) {
        self.assert_fill_phase("fields_mut");
        (&mut self.string_table, &mut self.nodes, &mut self.ways, &mut self.relations)
    }

    /// Appends a node, resolving tag key/value strings through the shared
    /// StringTable.
    pub fn add_node(&mut self, id: i64, lon: f64, lat: f64, tags: &[(&str, &str)]) -> u32 {
        self.assert_fill_phase("add_node");
        let kv = self.resolve_tags(tags);
        self.nodes.add_node(id, lon, lat, &kv)
    }

    pub fn add_way(&mut self, id: i64, refs: &[i64], tags: &[(&str, &str)]) -> Option<u32> {
        self.assert_fill_phase("add_way");
        let kv = self.resolve_tags(tags);
        self.ways.add_way(id, refs, &kv)
    }

    pub fn add_relation(
        &mut self,
        id: i64,
        members: &[crate::relations::Member],
        tags: &[(&str, &str)],
    ) -> u32 {
        self.assert_fill_phase("add_relation");
        let kv = self.resolve_tags(tags);
        self.relations.add_relation(id, members, &kv)
    }

    fn resolve_tags(&mut self, tags: &[(&str, &str)]) -> Vec<(u32, u32)> {
        tags.iter().map(|&(k, v)| (self.string_table.add(k), self.string_table.add(v))).collect()
    }

    /// Compacts every column, builds the tag reverse index and id anchors,
    /// fills per-way bboxes, and — if `build_spatial_index` is set — the
    /// point and R-tree spatial indexes. Idempotent.
    pub fn finalize(&mut self, build_spatial_index: bool) {
        if self.phase == Phase::Query {
            return;
        }
        self.nodes.finalize();
        self.ways.finalize(&self.nodes);
        self.relations.finalize();
        if build_spatial_index {
            self.nodes.build_spatial_index();
            self.ways.build_spatial_index();
        }
        self.phase = Phase::Query;
    }

    pub fn is_finalized(&self) -> bool {
        self.phase == Phase::Query
    }

    pub fn classify_relation(&mut self, r: u32) -> RelationKind {
        self.assert_query_phase("classify_relation");
        self.relations.classify_kind(r, &mut self.string_table)
    }

    pub fn relation_bbox(&self, r: u32) -> BBox {
        self.assert_query_phase("relation_bbox");
        self.relations.resolve_bbox(r, &self.nodes, &self.ways)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_after_finalize_panics() {
        let mut store = Store::new("test");
        store.add_node(1, 0.0, 0.0, &[]);
        store.finalize(false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut store = store;
            store.add_node(2, 1.0, 1.0, &[]);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn fill_then_query_round_trip() {
        let mut store = Store::new("test");
        store.add_node(1, 13.0, 52.0, &[("highway", "traffic_signals")]);
        store.add_node(2, 13.1, 52.1, &[]);
        store.add_way(10, &[1, 2], &[("highway", "residential")]);
        store.finalize(true);

        assert!(store.is_finalized());
        assert_eq!(store.nodes().len(), 2);
        assert_eq!(store.ways().len(), 1);

        let hits = store.nodes().find_indexes_within_bbox(&BBox::new(12.0, 51.0, 14.0, 53.0));
        assert_eq!(hits.len(), 2);
    }
}
