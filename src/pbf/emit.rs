//! The reader-agnostic PBF emit pipeline: batches entities into
//! [`PrimitiveBlock`]s and hands them to a [`BlockSink`] collaborator for
//! byte-level (protobuf/zlib) encoding.

use std::fmt;

use crate::pbf::types::{PrimitiveBlock, PrimitiveGroup, RelationRecord, WayRecord};
use crate::store::Store;

/// Batch sizes used when grouping entities into blocks, matching common OSM
/// PBF writer defaults.
const NODES_PER_BLOCK: usize = 8_000;
const WAYS_PER_BLOCK: usize = 2_000;
const RELATIONS_PER_BLOCK: usize = 2_000;

/// An error surfaced by the concrete byte-level sink.
#[derive(Debug)]
pub struct EmitError(pub Box<dyn std::error::Error + Send + Sync + 'static>);

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PBF sink error: {}", self.0)
    }
}

impl std::error::Error for EmitError {}

/// The byte-level collaborator: given a fully-built block, write it to the
/// underlying stream. Implementors own framing, compression, and protobuf
/// encoding; this crate only ever constructs `PrimitiveBlock` values.
pub trait BlockSink {
    fn write_header(&mut self, header: &crate::store::Header) -> Result<(), EmitError>;
    fn write_block(&mut self, block: &PrimitiveBlock) -> Result<(), EmitError>;
}

/// Writes every entity in `store` to `sink`, in sorted-id order grouped by
/// type: nodes, then ways, then relations, each re-batched into blocks with
/// a fresh block-local string table.
pub fn emit(store: &Store, sink: &mut dyn BlockSink) -> Result<(), EmitError> {
    let mut header = store.header.clone();
    header.writingprogram = Some(format!("osmix {}", env!("CARGO_PKG_VERSION")));
    header.osmosis_replication_timestamp = Some(current_unix_timestamp());
    sink.write_header(&header)?;

    emit_nodes(store, sink)?;
    emit_ways(store, sink)?;
    emit_relations(store, sink)?;

    Ok(())
}

fn current_unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn sorted_indexes(len: usize, id_at: impl Fn(u32) -> i64) -> Vec<u32> {
    let mut order: Vec<u32> = (0..len as u32).collect();
    order.sort_by_key(|&i| id_at(i));
    order
}

fn emit_nodes(store: &Store, sink: &mut dyn BlockSink) -> Result<(), EmitError> {
    let nodes = store.nodes();
    let order = sorted_indexes(nodes.len(), |i| nodes.ids().at(i));

    for chunk in order.chunks(NODES_PER_BLOCK) {
        let mut strings: Vec<Vec<u8>> = vec![Vec::new()]; // index 0 reserved, matching wire convention
        let mut local_index = std::collections::HashMap::new();
        let mut dense = crate::pbf::types::DenseNodeGroup::default();

        let mut prev_id = 0i64;
        let mut prev_lat_raw = 0i64;
        let mut prev_lon_raw = 0i64;

        for &idx in chunk {
            let id = nodes.ids().at(idx);
            let (lon, lat) = nodes.get_lonlat(idx);
            let lat_raw = (lat * 1_000_000_000.0 / PrimitiveBlock::DEFAULT_GRANULARITY as f64).round() as i64;
            let lon_raw = (lon * 1_000_000_000.0 / PrimitiveBlock::DEFAULT_GRANULARITY as f64).round() as i64;

            dense.id.push(id - prev_id);
            dense.lat.push(lat_raw - prev_lat_raw);
            dense.lon.push(lon_raw - prev_lon_raw);
            prev_id = id;
            prev_lat_raw = lat_raw;
            prev_lon_raw = lon_raw;

            if let Some(kv) = nodes.tags().get_tags(idx) {
                for (k, v) in kv {
                    let k_local = intern_local(store, &mut strings, &mut local_index, k);
                    let v_local = intern_local(store, &mut strings, &mut local_index, v);
                    dense.keys_vals.push(k_local as i32);
                    dense.keys_vals.push(v_local as i32);
                }
            }
            dense.keys_vals.push(0);
        }

        let block = PrimitiveBlock {
            stringtable: strings,
            lon_offset: 0,
            lat_offset: 0,
            granularity: PrimitiveBlock::DEFAULT_GRANULARITY,
            groups: vec![PrimitiveGroup::DenseNodes(dense)],
        };
        sink.write_block(&block)?;
    }

    Ok(())
}

fn emit_ways(store: &Store, sink: &mut dyn BlockSink) -> Result<(), EmitError> {
    let ways = store.ways();
    let order = sorted_indexes(ways.len(), |i| ways.ids().at(i));

    for chunk in order.chunks(WAYS_PER_BLOCK) {
        let mut strings: Vec<Vec<u8>> = vec![Vec::new()];
        let mut local_index = std::collections::HashMap::new();
        let mut records = Vec::with_capacity(chunk.len());

        for &idx in chunk {
            let id = ways.ids().at(idx);
            let mut record = WayRecord { id, ..Default::default() };

            let mut prev = 0i64;
            for &r in ways.get_ref_ids(idx) {
                record.refs.push(r - prev);
                prev = r;
            }

            if let Some(kv) = ways.tags().get_tags(idx) {
                for (k, v) in kv {
                    record.keys.push(intern_local(store, &mut strings, &mut local_index, k));
                    record.vals.push(intern_local(store, &mut strings, &mut local_index, v));
                }
            }
            records.push(record);
        }

        let block = PrimitiveBlock {
            stringtable: strings,
            lon_offset: 0,
            lat_offset: 0,
            granularity: PrimitiveBlock::DEFAULT_GRANULARITY,
            groups: vec![PrimitiveGroup::Ways(records)],
        };
        sink.write_block(&block)?;
    }

    Ok(())
}

fn emit_relations(store: &Store, sink: &mut dyn BlockSink) -> Result<(), EmitError> {
    let relations = store.relations();
    let order = sorted_indexes(relations.len(), |i| relations.ids().at(i));

    for chunk in order.chunks(RELATIONS_PER_BLOCK) {
        let mut strings: Vec<Vec<u8>> = vec![Vec::new()];
        let mut local_index = std::collections::HashMap::new();
        let mut records = Vec::with_capacity(chunk.len());

        for &idx in chunk {
            let id = relations.ids().at(idx);
            let mut record = RelationRecord { id, ..Default::default() };

            let mut prev = 0i64;
            for m in relations.get_members(idx) {
                record.memids.push(m.member_ref - prev);
                prev = m.member_ref;
                record.types.push(m.member_type.as_member_type());
                let role_local = if m.role < 0 {
                    -1
                } else {
                    intern_local(store, &mut strings, &mut local_index, m.role as u32) as i32
                };
                record.roles_sid.push(role_local);
            }

            if let Some(kv) = relations.tags().get_tags(idx) {
                for (k, v) in kv {
                    record.keys.push(intern_local(store, &mut strings, &mut local_index, k));
                    record.vals.push(intern_local(store, &mut strings, &mut local_index, v));
                }
            }
            records.push(record);
        }

        let block = PrimitiveBlock {
            stringtable: strings,
            lon_offset: 0,
            lat_offset: 0,
            granularity: PrimitiveBlock::DEFAULT_GRANULARITY,
            groups: vec![PrimitiveGroup::Relations(records)],
        };
        sink.write_block(&block)?;
    }

    Ok(())
}

/// Interns a global StringTable index into the block-local string table
/// being built for emission, returning the block-local index.
fn intern_local(
    store: &Store,
    strings: &mut Vec<Vec<u8>>,
    local_index: &mut std::collections::HashMap<u32, u32>,
    global_idx: u32,
) -> u32 {
    if let Some(&local) = local_index.get(&global_idx) {
        return local;
    }
    let local = strings.len() as u32;
    strings.push(store.string_table().get(global_idx).as_bytes().to_vec());
    local_index.insert(global_idx, local);
    local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        header: Option<crate::store::Header>,
    }

    impl BlockSink for RecordingSink {
        fn write_header(&mut self, header: &crate::store::Header) -> Result<(), EmitError> {
            self.header = Some(header.clone());
            Ok(())
        }

        fn write_block(&mut self, _block: &PrimitiveBlock) -> Result<(), EmitError> {
            Ok(())
        }
    }

    #[test]
    fn emit_overlays_writingprogram_and_timestamp() {
        let mut store = Store::new("src");
        store.finalize(false);

        let mut sink = RecordingSink::default();
        emit(&store, &mut sink).unwrap();

        let header = sink.header.expect("write_header was called");
        assert_eq!(header.writingprogram.as_deref(), Some(concat!("osmix ", env!("CARGO_PKG_VERSION"))));
        assert!(header.osmosis_replication_timestamp.unwrap() > 0);
    }
}
