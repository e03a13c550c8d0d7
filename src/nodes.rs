//! Node storage: id/tag columns, microdegree coordinates, and a point
//! spatial index.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::ids::Ids;
use crate::pbf::types::{DenseNodeGroup, PrimitiveBlock};
use crate::tags::Tags;
use crate::types::{haversine_km, lat_to_micro, lon_to_micro, micro_to_deg, BBox};

#[derive(Clone, Copy, Debug)]
struct NodePoint {
    index: u32,
    lon: f64,
    lat: f64,
}

impl RTreeObject for NodePoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lon, self.lat])
    }
}

impl PointDistance for NodePoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.lon - point[0];
        let dy = self.lat - point[1];
        dx * dx + dy * dy
    }
}

#[derive(Debug, Default)]
pub struct Nodes {
    ids: Ids,
    tags: Tags,
    lon_micro: Vec<i32>,
    lat_micro: Vec<i32>,
    world_bbox: BBox,
    spatial_index: Option<RTree<NodePoint>>,
    finalized: bool,
}

impl Nodes {
    pub fn new() -> Nodes {
        Nodes {
            world_bbox: BBox::empty(),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn world_bbox(&self) -> BBox {
        self.world_bbox
    }

    /// Appends a single node, returning its local index.
    pub fn add_node(&mut self, id: i64, lon: f64, lat: f64, tags: &[(u32, u32)]) -> u32 {
        assert!(!self.finalized, "Nodes::add_node called after finalize");
        let idx = self.ids.add(id);
        self.tags.add_tags(idx, tags);
        self.lon_micro.push(lon_to_micro(lon));
        self.lat_micro.push(lat_to_micro(lat));
        self.world_bbox.expand_with_point(lon, lat);
        idx
    }

    /// Drives the dense-node delta-decoding state machine for one group:
    /// running sums for id/lat/lon, and 0-sentinel-terminated (k,v) runs in
    /// `keys_vals` translated through `string_map` (block-local -> global
    /// StringTable index). `filter`, if given, is evaluated after decoding
    /// so it can see the real id/lon/lat (e.g. an extract bbox test).
    pub fn add_dense(
        &mut self,
        block: &PrimitiveBlock,
        group: &DenseNodeGroup,
        string_map: &[u32],
        filter: Option<&dyn Fn(i64, f64, f64) -> bool>,
    ) -> usize {
        assert!(!self.finalized, "Nodes::add_dense called after finalize");

        let mut id_sum: i64 = 0;
        let mut lat_sum: i64 = 0;
        let mut lon_sum: i64 = 0;
        let mut kv_cursor: usize = 0;
        let mut added = 0;

        for i in 0..group.id.len() {
            id_sum += group.id[i];
            lat_sum += group.lat.get(i).copied().unwrap_or(0);
            lon_sum += group.lon.get(i).copied().unwrap_or(0);

            let lon_deg = block.decode_lon(lon_sum);
            let lat_deg = block.decode_lat(lat_sum);

            let mut kv = Vec::new();
            while kv_cursor < group.keys_vals.len() {
                let k = group.keys_vals[kv_cursor];
                kv_cursor += 1;
                if k == 0 {
                    break;
                }
                let v = group.keys_vals.get(kv_cursor).copied().unwrap_or(0);
                kv_cursor += 1;
                kv.push((string_map[k as usize], string_map[v as usize]));
            }

            if let Some(f) = filter {
                if !f(id_sum, lon_deg, lat_deg) {
                    continue;
                }
            }

            let idx = self.ids.add(id_sum);
            self.tags.add_tags(idx, &kv);
            self.lon_micro.push(lon_to_micro(lon_deg));
            self.lat_micro.push(lat_to_micro(lat_deg));
            self.world_bbox.expand_with_point(lon_deg, lat_deg);
            added += 1;
        }

        added
    }

    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.ids.finalize();
        self.tags.finalize();
        self.lon_micro.shrink_to_fit();
        self.lat_micro.shrink_to_fit();
        self.finalized = true;
    }

    pub fn build_spatial_index(&mut self) {
        assert!(self.finalized, "Nodes::build_spatial_index called before finalize");
        let points: Vec<NodePoint> = (0..self.lon_micro.len())
            .map(|i| {
                let (lon, lat) = self.get_lonlat(i as u32);
                NodePoint { index: i as u32, lon, lat }
            })
            .collect();
        self.spatial_index = Some(RTree::bulk_load(points));
    }

    pub fn ids(&self) -> &Ids {
        &self.ids
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn get_lonlat(&self, idx: u32) -> (f64, f64) {
        (micro_to_deg(self.lon_micro[idx as usize]), micro_to_deg(self.lat_micro[idx as usize]))
    }

    pub fn find_indexes_within_bbox(&self, bbox: &BBox) -> Vec<u32> {
        let index = self
            .spatial_index
            .as_ref()
            .expect("Nodes::find_indexes_within_bbox called before build_spatial_index");
        let envelope = AABB::from_corners([bbox.min_lon, bbox.min_lat], [bbox.max_lon, bbox.max_lat]);
        index.locate_in_envelope(&envelope).map(|p| p.index).collect()
    }

    pub fn find_indexes_within_radius_km(&self, lon: f64, lat: f64, radius_km: f64) -> Vec<u32> {
        let index = self
            .spatial_index
            .as_ref()
            .expect("Nodes::find_indexes_within_radius_km called before build_spatial_index");

        // Pad generously in degree space before filtering exactly by
        // great-circle distance, so the coarse envelope never discards a
        // true match.
        let lat_rad = lat.to_radians();
        let pad_lat = radius_km / 111.0 * 1.05;
        let pad_lon = radius_km / (111.0 * lat_rad.cos().abs().max(0.01)) * 1.05;
        let envelope = AABB::from_corners(
            [lon - pad_lon, lat - pad_lat],
            [lon + pad_lon, lat + pad_lat],
        );

        index
            .locate_in_envelope(&envelope)
            .filter(|p| haversine_km(lon, lat, p.lon, p.lat) <= radius_km)
            .map(|p| p.index)
            .collect()
    }

    /// A compact `(ids, flat xy)` pair for nodes within `bbox`, suitable for
    /// zero-copy transport to a caller that just wants positions.
    pub fn within_bbox(&self, bbox: &BBox, filter: Option<&dyn Fn(u32) -> bool>) -> (Vec<i64>, Vec<f64>) {
        let mut ids = Vec::new();
        let mut xy = Vec::new();
        for idx in self.find_indexes_within_bbox(bbox) {
            if let Some(f) = filter {
                if !f(idx) {
                    continue;
                }
            }
            ids.push(self.ids.at(idx));
            let (lon, lat) = self.get_lonlat(idx);
            xy.push(lon);
            xy.push(lat);
        }
        (ids, xy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Nodes {
        let mut nodes = Nodes::new();
        nodes.add_node(1, 13.377, 52.516, &[]);
        nodes.add_node(2, 13.38, 52.52, &[(1, 2)]);
        nodes.add_node(3, -0.1, 51.5, &[]);
        nodes.finalize();
        nodes.build_spatial_index();
        nodes
    }

    #[test]
    fn find_within_bbox_returns_only_contained_points() {
        let nodes = sample();
        let bbox = BBox::new(13.0, 52.0, 14.0, 53.0);
        let mut found = nodes.find_indexes_within_bbox(&bbox);
        found.sort_unstable();
        assert_eq!(found, vec![0, 1]);
    }

    #[test]
    fn find_within_radius_excludes_far_point() {
        let nodes = sample();
        let found = nodes.find_indexes_within_radius_km(13.377, 52.516, 5.0);
        assert_eq!(found, vec![0]);
    }

    #[test]
    fn add_dense_decodes_deltas_and_tags() {
        let block = PrimitiveBlock {
            stringtable: vec![],
            lon_offset: 0,
            lat_offset: 0,
            granularity: PrimitiveBlock::DEFAULT_GRANULARITY,
            groups: vec![],
        };
        // Two nodes: id 100 then +5=105; lon/lat deltas of 10 granularity
        // units each time. First node has tag (1,2), second has none.
        let group = DenseNodeGroup {
            id: vec![100, 5],
            lat: vec![10, 10],
            lon: vec![10, 10],
            keys_vals: vec![1, 2, 0, 0],
        };
        let string_map = [0u32, 1, 2];
        let mut nodes = Nodes::new();
        let added = nodes.add_dense(&block, &group, &string_map, None);
        assert_eq!(added, 2);
        assert_eq!(nodes.len(), 2);
        nodes.finalize();
        assert_eq!(nodes.ids().get_index_from_id(100), 0);
        assert_eq!(nodes.ids().get_index_from_id(105), 1);
        assert_eq!(nodes.tags().get_tags(0), Some(vec![(1, 2)]));
        assert_eq!(nodes.tags().get_tags(1), None);
    }

    #[test]
    fn add_dense_filter_excludes_nodes_outside_extract() {
        let block = PrimitiveBlock {
            granularity: PrimitiveBlock::DEFAULT_GRANULARITY,
            ..Default::default()
        };
        let group = DenseNodeGroup {
            id: vec![1, 1],
            lat: vec![0, 100_000_000],
            lon: vec![0, 100_000_000],
            keys_vals: vec![0, 0],
        };
        let mut nodes = Nodes::new();
        let filter = |_id: i64, lon: f64, _lat: f64| lon < 1.0;
        let added = nodes.add_dense(&block, &group, &[], Some(&filter));
        assert_eq!(added, 1);
    }
}
