//! Way storage: id/tag columns, a CSR of node-ref ids, and a bbox R-tree.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::error::{Error, ErrorKind, Result};
use crate::ids::Ids;
use crate::nodes::Nodes;
use crate::pbf::types::WayRecord;
use crate::tags::Tags;
use crate::types::{haversine_km, BBox, EntityType};

#[derive(Clone, Copy, Debug)]
struct WayEnvelope {
    index: u32,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for WayEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

impl PointDistance for WayEnvelope {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        self.aabb.distance_2(point)
    }
}

#[derive(Debug, Default)]
pub struct Ways {
    ids: Ids,
    tags: Tags,
    ref_start: Vec<u32>,
    ref_count: Vec<u32>,
    refs: Vec<i64>,
    bboxes: Vec<BBox>,
    spatial_index: Option<RTree<WayEnvelope>>,
    finalized: bool,
}

impl Ways {
    pub fn new() -> Ways {
        Ways::default()
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

    /// Appends a single way with already-resolved (non-delta) ref ids.
    /// Returns `None` (and adds nothing) if `refs` is empty.
    pub fn add_way(&mut self, id: i64, refs: &[i64], tags: &[(u32, u32)]) -> Option<u32> {
        assert!(!self.finalized, "Ways::add_way called after finalize");
        if refs.is_empty() {
            return None;
        }
        let idx = self.ids.add(id);
        self.tags.add_tags(idx, tags);
        self.ref_start.push(self.refs.len() as u32);
        self.ref_count.push(refs.len() as u32);
        self.refs.extend_from_slice(refs);
        self.bboxes.push(BBox::empty());
        Some(idx)
    }

    /// Delta-decodes `refs` for each record (`refs[i] += refs[i-1]`, initial
    /// 0), keeping only refs present in `nodes`; an optional `filter` can
    /// reject ref ids further (e.g. an extract bbox narrower than "exists at
    /// all"). A way that loses every ref is dropped. Returns the number of
    /// ways kept.
    pub fn add_ways(
        &mut self,
        records: &[WayRecord],
        string_map: &[u32],
        nodes: &Nodes,
        filter: Option<&dyn Fn(i64) -> bool>,
    ) -> usize {
        assert!(!self.finalized, "Ways::add_ways called after finalize");
        let mut kept = 0;

        for record in records {
            let mut ref_sum: i64 = 0;
            let mut resolved = Vec::with_capacity(record.refs.len());
            for &delta in &record.refs {
                ref_sum += delta;
                if !nodes.ids().has(ref_sum) {
                    continue;
                }
                if let Some(f) = filter {
                    if !f(ref_sum) {
                        continue;
                    }
                }
                resolved.push(ref_sum);
            }

            if resolved.is_empty() {
                continue;
            }

            let kv: Vec<(u32, u32)> = record
                .keys
                .iter()
                .zip(record.vals.iter())
                .map(|(&k, &v)| (string_map[k as usize], string_map[v as usize]))
                .collect();

            if self.add_way(record.id, &resolved, &kv).is_some() {
                kept += 1;
            }
        }

        kept
    }

    pub fn get_ref_ids(&self, w: u32) -> &[i64] {
        let start = self.ref_start[w as usize] as usize;
        let count = self.ref_count[w as usize] as usize;
        &self.refs[start..start + count]
    }

    /// Dereferences each ref through `nodes`. A ref missing from `nodes`
    /// raises [`ErrorKind::MissingReference`].
    pub fn get_coordinates(&self, w: u32, nodes: &Nodes) -> Result<Vec<(f64, f64)>> {
        self.get_ref_ids(w)
            .iter()
            .map(|&id| {
                let idx = nodes.ids().get_index_from_id(id);
                if idx < 0 {
                    return Err(Error::new(ErrorKind::MissingReference {
                        entity_type: EntityType::Node,
                        id,
                    }));
                }
                Ok(nodes.get_lonlat(idx as u32))
            })
            .collect()
    }

    pub fn finalize(&mut self, nodes: &Nodes) {
        if self.finalized {
            return;
        }
        self.ids.finalize();
        self.tags.finalize();
        self.refs.shrink_to_fit();

        for w in 0..self.bboxes.len() {
            let mut bbox = BBox::empty();
            for &id in self.get_ref_ids(w as u32) {
                let idx = nodes.ids().get_index_from_id(id);
                if idx >= 0 {
                    let (lon, lat) = nodes.get_lonlat(idx as u32);
                    bbox.expand_with_point(lon, lat);
                }
            }
            self.bboxes[w] = bbox;
        }

        self.finalized = true;
    }

    pub fn build_spatial_index(&mut self) {
        assert!(self.finalized, "Ways::build_spatial_index called before finalize");
        let envelopes: Vec<WayEnvelope> = self
            .bboxes
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.is_empty())
            .map(|(i, b)| WayEnvelope {
                index: i as u32,
                aabb: AABB::from_corners([b.min_lon, b.min_lat], [b.max_lon, b.max_lat]),
            })
            .collect();
        self.spatial_index = Some(RTree::bulk_load(envelopes));
    }

    pub fn bbox(&self, w: u32) -> BBox {
        self.bboxes[w as usize]
    }

    pub fn intersects(&self, bbox: &BBox, filter: Option<&dyn Fn(u32) -> bool>) -> Vec<u32> {
        let index = self
            .spatial_index
            .as_ref()
            .expect("Ways::intersects called before build_spatial_index");
        let envelope = AABB::from_corners([bbox.min_lon, bbox.min_lat], [bbox.max_lon, bbox.max_lat]);
        index
            .locate_in_envelope_intersecting(&envelope)
            .map(|e| e.index)
            .filter(|&idx| filter.map_or(true, |f| f(idx)))
            .collect()
    }

    /// The `max_results` (if given) nearest ways to `(lon, lat)` by
    /// great-circle distance to the way's bbox center, optionally capped at
    /// `max_dist_km`.
    pub fn neighbors(
        &self,
        lon: f64,
        lat: f64,
        max_results: Option<usize>,
        max_dist_km: Option<f64>,
    ) -> Vec<u32> {
        let index = self
            .spatial_index
            .as_ref()
            .expect("Ways::neighbors called before build_spatial_index");

        let mut out = Vec::new();
        for env in index.nearest_neighbor_iter(&[lon, lat]) {
            let cx = (env.aabb.lower()[0] + env.aabb.upper()[0]) / 2.0;
            let cy = (env.aabb.lower()[1] + env.aabb.upper()[1]) / 2.0;
            let dist = haversine_km(lon, lat, cx, cy);
            if let Some(max) = max_dist_km {
                if dist > max {
                    break;
                }
            }
            out.push(env.index);
            if let Some(max) = max_results {
                if out.len() >= max {
                    break;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_nodes() -> Nodes {
        let mut nodes = Nodes::new();
        nodes.add_node(1, 0.0, 0.0, &[]);
        nodes.add_node(2, 1.0, 0.0, &[]);
        nodes.add_node(3, 1.0, 1.0, &[]);
        nodes.finalize();
        nodes.build_spatial_index();
        nodes
    }

    #[test]
    fn add_way_rejects_empty_refs() {
        let mut ways = Ways::new();
        assert_eq!(ways.add_way(1, &[], &[]), None);
        assert_eq!(ways.len(), 0);
    }

    #[test]
    fn bbox_and_coordinates_after_finalize() {
        let nodes = sample_nodes();
        let mut ways = Ways::new();
        ways.add_way(100, &[1, 2, 3], &[]);
        ways.finalize(&nodes);

        let bbox = ways.bbox(0);
        assert_eq!(bbox.min_lon, 0.0);
        assert_eq!(bbox.max_lon, 1.0);
        assert_eq!(bbox.max_lat, 1.0);

        let coords = ways.get_coordinates(0, &nodes).unwrap();
        assert_eq!(coords, vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]);
    }

    #[test]
    fn get_coordinates_reports_missing_reference() {
        let nodes = sample_nodes();
        let mut ways = Ways::new();
        ways.add_way(100, &[1, 999], &[]);
        ways.finalize(&nodes);

        let err = ways.get_coordinates(0, &nodes).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MissingReference { id: 999, .. }));
    }

    #[test]
    fn add_ways_drops_way_that_loses_all_refs() {
        let nodes = sample_nodes();
        let mut ways = Ways::new();
        let records = vec![WayRecord {
            id: 1,
            // delta-encoded refs resolving to a single id absent from `nodes`
            refs: vec![9999],
            keys: vec![],
            vals: vec![],
        }];
        let kept = ways.add_ways(&records, &[], &nodes, None);
        assert_eq!(kept, 0);
        assert_eq!(ways.len(), 0);
    }

    #[test]
    fn add_ways_delta_decodes_refs() {
        let nodes = sample_nodes();
        let mut ways = Ways::new();
        // delta-encoded: 1, then +1=2, then +1=3
        let records = vec![WayRecord {
            id: 1,
            refs: vec![1, 1, 1],
            keys: vec![],
            vals: vec![],
        }];
        ways.add_ways(&records, &[], &nodes, None);
        assert_eq!(ways.get_ref_ids(0), &[1, 2, 3]);
    }

    #[test]
    fn intersects_finds_way_overlapping_bbox() {
        let nodes = sample_nodes();
        let mut ways = Ways::new();
        ways.add_way(100, &[1, 2, 3], &[]);
        ways.finalize(&nodes);
        ways.build_spatial_index();

        let hits = ways.intersects(&BBox::new(0.5, -0.5, 1.5, 1.5), None);
        assert_eq!(hits, vec![0]);

        let misses = ways.intersects(&BBox::new(10.0, 10.0, 11.0, 11.0), None);
        assert!(misses.is_empty());
    }
}
