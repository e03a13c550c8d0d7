//! Reader-agnostic intermediate shapes for a decoded PBF primitive block.
//!
//! These are what [`crate::nodes::Nodes::add_dense`], [`crate::ways::Ways::add_ways`],
//! and [`crate::relations::Relations::add_relations`] consume. A concrete
//! byte-level PBF decoder would produce them from real file bytes; tests and
//! alternative source formats can also construct them directly, since
//! nothing in this module depends on any particular decoder.

/// One decoded primitive block: a local string table plus coordinate
/// decoding parameters and a sequence of groups.
#[derive(Clone, Debug, Default)]
pub struct PrimitiveBlock {
    pub stringtable: Vec<Vec<u8>>,
    pub lon_offset: i64,
    pub lat_offset: i64,
    pub granularity: i64,
    pub groups: Vec<PrimitiveGroup>,
}

impl PrimitiveBlock {
    /// Default wire granularity: one unit is 1e-9 degrees (granularity in
    /// nanodegrees), matching the OSM PBF spec's default of 100.
    pub const DEFAULT_GRANULARITY: i64 = 100;

    pub fn decode_lon(&self, raw: i64) -> f64 {
        (self.lon_offset + self.granularity * raw) as f64 / 1_000_000_000.0
    }

    pub fn decode_lat(&self, raw: i64) -> f64 {
        (self.lat_offset + self.granularity * raw) as f64 / 1_000_000_000.0
    }
}

#[derive(Clone, Debug)]
pub enum PrimitiveGroup {
    DenseNodes(DenseNodeGroup),
    Ways(Vec<WayRecord>),
    Relations(Vec<RelationRecord>),
    /// A non-dense node group. §4.7 requires this be rejected fatally rather
    /// than silently ignored.
    PlainNodes,
}

/// Delta-encoded dense node columns, as they arrive on the wire.
#[derive(Clone, Debug, Default)]
pub struct DenseNodeGroup {
    pub id: Vec<i64>,
    pub lat: Vec<i64>,
    pub lon: Vec<i64>,
    /// Flattened (key, val) runs per node, each terminated by a 0 sentinel.
    /// A node with no tags contributes just the sentinel.
    pub keys_vals: Vec<i32>,
}

/// A single way, with delta-encoded `refs` relative to the previous ref in
/// the same way.
#[derive(Clone, Debug, Default)]
pub struct WayRecord {
    pub id: i64,
    pub refs: Vec<i64>,
    pub keys: Vec<u32>,
    pub vals: Vec<u32>,
}

/// A single relation, with delta-encoded `memids` relative to the previous
/// member id in the same relation.
#[derive(Clone, Debug, Default)]
pub struct RelationRecord {
    pub id: i64,
    pub memids: Vec<i64>,
    /// 0 = node, 1 = way, 2 = relation, per member.
    pub types: Vec<u8>,
    pub roles_sid: Vec<i32>,
    pub keys: Vec<u32>,
    pub vals: Vec<u32>,
}
