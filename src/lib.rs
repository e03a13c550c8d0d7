//! osmix is an in-memory indexing engine for OpenStreetMap data: columnar
//! node/way/relation stores with id and spatial indexes, a PBF ingest/emit
//! pipeline, a change-set engine for merging one store into another, bbox
//! extraction, and osmChange (`.osc`) serialization.
//!
//! The central type is [`Store`]: fill it via `add_node`/`add_way`/
//! `add_relation` or [`pbf::load_block`], call [`Store::finalize`] once, then
//! query it. A [`Store`] is immutable after `finalize`; merging data into one
//! goes through [`ChangeSet`] instead of further mutation.

mod error;
mod types;
mod string_table;
mod ids;
mod tags;
mod nodes;
mod ways;
mod relations;
mod store;
pub mod pbf;
pub mod changeset;
mod extract;
mod osc;
mod transport;

pub use error::{Error, ErrorKind, Result};
pub use types::{haversine_km, lat_to_micro, lon_to_micro, micro_to_deg, BBox, EntityType, COORD_PRECISION};
pub use string_table::StringTable;
pub use ids::Ids;
pub use tags::Tags;
pub use nodes::Nodes;
pub use ways::Ways;
pub use relations::{Member, RelationKind, Relations};
pub use store::{Header, Store};
pub use extract::{extract, ExtractStrategy};
pub use osc::{write_osc, OscEntry};
pub use changeset::{apply_changeset, BackRef, ChangeSet};
pub use transport::{ColumnBuffer, ColumnDType, ColumnDescriptor, NodeColumnTransport, export_node_columns};

#[cfg(feature = "mmap")]
pub use transport::MmapColumn;

pub use pbf::{emit, load_block, BlockSink, EmitError, LoadStats};
