//! Intersection-point creation between crossing ways, §4.9.4.
//!
//! Segment intersections are found by straightforward pairwise testing
//! rather than an event-queue sweep: at the way lengths this engine deals
//! with (a single OSM way rarely has more than a few hundred segments) the
//! pairwise cost is negligible, and a plain nested loop is far easier to
//! keep obviously correct than a Bentley-Ottmann implementation.

use std::collections::HashSet;

use crate::changeset::entity::{way_entity, Entity, NodeEntity, WayEntity};
use crate::changeset::ChangeSet;
use crate::store::Store;
use crate::types::{haversine_km, EntityType};

/// Tracks the next synthetic node id to hand out when an intersection needs
/// a brand new node.
pub struct NodeIdAllocator {
    next: i64,
}

impl NodeIdAllocator {
    pub fn new(base_max_node_id: i64, patch_max_node_id: i64) -> NodeIdAllocator {
        NodeIdAllocator { next: base_max_node_id.max(patch_max_node_id) + 1 }
    }

    pub fn next_node_id(&mut self) -> i64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

fn tag(tags: &[(String, String)], key: &str) -> Option<&str> {
    tags.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// A way is a crossing candidate if it carries a `highway` tag and is not a
/// tunnel or bridge (those cross grade-separated, not at-grade).
fn is_crossing_candidate(tags: &[(String, String)]) -> bool {
    tag(tags, "highway").is_some()
        && tag(tags, "tunnel") != Some("yes")
        && tag(tags, "bridge") != Some("yes")
}

/// Two ways should be connected only if both are at-grade crossing
/// candidates on the same layer.
fn ways_should_connect(a: &[(String, String)], b: &[(String, String)]) -> bool {
    if !is_crossing_candidate(a) || !is_crossing_candidate(b) {
        return false;
    }
    let layer = |tags: &[(String, String)]| tag(tags, "layer").unwrap_or("0").to_string();
    layer(a) == layer(b)
}

fn dedup_consecutive(coords: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut out: Vec<(f64, f64)> = Vec::with_capacity(coords.len());
    for &p in coords {
        if out.last() != Some(&p) {
            out.push(p);
        }
    }
    out
}

/// The intersection point of segments `(a0,a1)` and `(b0,b1)`, if they cross
/// within both segments' extent (standard 2D line-segment intersection).
fn segment_intersection(
    a0: (f64, f64),
    a1: (f64, f64),
    b0: (f64, f64),
    b1: (f64, f64),
) -> Option<(f64, f64)> {
    let (x1, y1) = a0;
    let (x2, y2) = a1;
    let (x3, y3) = b0;
    let (x4, y4) = b1;

    let denom = (x1 - x2) * (y3 - y4) - (y1 - y2) * (x3 - x4);
    if denom.abs() < 1e-15 {
        return None; // parallel or collinear
    }

    let t = ((x1 - x3) * (y3 - y4) - (y1 - y3) * (x3 - x4)) / denom;
    let u = ((x1 - x3) * (y1 - y2) - (y1 - y3) * (x1 - x2)) / denom;

    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some((x1 + t * (x2 - x1), y1 + t * (y2 - y1)))
    } else {
        None
    }
}

fn all_intersections(a: &[(f64, f64)], b: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut points = Vec::new();
    for seg_a in a.windows(2) {
        for seg_b in b.windows(2) {
            if let Some(p) = segment_intersection(seg_a[0], seg_a[1], seg_b[0], seg_b[1]) {
                if !points.iter().any(|&q: &(f64, f64)| q == p) {
                    points.push(p);
                }
            }
        }
    }
    points
}

/// The index of the nearest node on `way` (as resolved through `base`) to
/// `point`, if one lies within `max_meters`.
fn nearest_ref_within(
    way: &WayEntity,
    base: &Store,
    point: (f64, f64),
    max_meters: f64,
) -> Option<i64> {
    let max_km = max_meters / 1000.0;
    way.refs
        .iter()
        .filter_map(|&id| {
            let idx = base.nodes().ids().get_index_from_id(id);
            if idx < 0 {
                return None;
            }
            let coord = base.nodes().get_lonlat(idx as u32);
            let dist = haversine_km(point.0, point.1, coord.0, coord.1);
            (dist <= max_km).then_some((id, dist))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id)
}

/// Splices `node_id` into `way.refs` at the position between whichever pair
/// of adjacent refs forms the edge nearest to `point`.
fn splice_nearest_edge(way: &mut WayEntity, base: &Store, point: (f64, f64), node_id: i64) {
    if way.refs.contains(&node_id) {
        return;
    }

    let coords: Vec<(f64, f64)> = way
        .refs
        .iter()
        .map(|&id| {
            let idx = base.nodes().ids().get_index_from_id(id);
            if idx >= 0 { base.nodes().get_lonlat(idx as u32) } else { point }
        })
        .collect();

    let mut best_edge = 0;
    let mut best_dist = f64::INFINITY;
    for (i, pair) in coords.windows(2).enumerate() {
        let d = point_to_segment_distance(point, pair[0], pair[1]);
        if d < best_dist {
            best_dist = d;
            best_edge = i;
        }
    }

    way.refs.insert(best_edge + 1, node_id);
}

fn point_to_segment_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (abx, aby) = (b.0 - a.0, b.1 - a.1);
    let len2 = abx * abx + aby * aby;
    if len2 < 1e-20 {
        return haversine_km(p.0, p.1, a.0, a.1);
    }
    let t = (((p.0 - a.0) * abx + (p.1 - a.1) * aby) / len2).clamp(0.0, 1.0);
    let proj = (a.0 + t * abx, a.1 + t * aby);
    haversine_km(p.0, p.1, proj.0, proj.1)
}

fn set_crossing_tag(tags: &mut Vec<(String, String)>) {
    if !tags.iter().any(|(k, _)| k == "crossing") {
        tags.push(("crossing".to_string(), "yes".to_string()));
    }
}

/// For each crossing-candidate way in `patch`, finds other base ways it
/// should connect to, computes their polyline intersections, and splices in
/// shared or newly created nodes so the two ways share a ref at every
/// crossing point.
pub fn create_intersections(
    changeset: &mut ChangeSet,
    base: &Store,
    patch: &[WayEntity],
    allocator: &mut NodeIdAllocator,
) {
    let mut paired: HashSet<(i64, i64)> = HashSet::new();

    for w in patch {
        if !is_crossing_candidate(&w.tags) {
            continue;
        }

        let bbox = {
            let mut b = crate::types::BBox::empty();
            for &id in &w.refs {
                let idx = base.nodes().ids().get_index_from_id(id);
                if idx >= 0 {
                    let (lon, lat) = base.nodes().get_lonlat(idx as u32);
                    b.expand_with_point(lon, lat);
                }
            }
            b
        };

        let candidates = base.ways().intersects(&bbox, None);
        if candidates.is_empty() {
            continue;
        }

        let w_coords = match way_coordinates(w, base) {
            Some(c) => dedup_consecutive(&c),
            None => continue,
        };

        let mut w_mut = w.clone();

        for idx in candidates {
            let o_id = base.ways().ids().at(idx);
            if o_id == w.id {
                continue;
            }
            let pair_key = if o_id < w.id { (o_id, w.id) } else { (w.id, o_id) };
            if !paired.insert(pair_key) {
                continue;
            }

            let mut o = way_entity(base, idx);
            if !ways_should_connect(&w_mut.tags, &o.tags) {
                continue;
            }

            let o_coords = match way_coordinates(&o, base) {
                Some(c) => dedup_consecutive(&c),
                None => continue,
            };
            if o_coords == w_coords {
                continue;
            }

            for point in all_intersections(&w_coords, &o_coords) {
                let w_node = nearest_ref_within(&w_mut, base, point, 1.0);
                let o_node = nearest_ref_within(&o, base, point, 1.0);

                let shared_node = match (w_node, o_node) {
                    (Some(wn), Some(on)) if wn != on => {
                        for r in o.refs.iter_mut() {
                            if *r == on {
                                *r = wn;
                            }
                        }
                        set_crossing_tag(&mut w_mut.tags);
                        wn
                    }
                    (Some(wn), _) => {
                        splice_nearest_edge(&mut o, base, point, wn);
                        set_crossing_tag(&mut o.tags);
                        wn
                    }
                    (None, Some(on)) => {
                        splice_nearest_edge(&mut w_mut, base, point, on);
                        set_crossing_tag(&mut w_mut.tags);
                        on
                    }
                    (None, None) => {
                        let new_id = allocator.next_node_id();
                        let mut node = NodeEntity { id: new_id, lon: point.0, lat: point.1, tags: Vec::new() };
                        set_crossing_tag(&mut node.tags);
                        changeset.create(base, Entity::Node(node), None, vec![]);
                        splice_nearest_edge(&mut w_mut, base, point, new_id);
                        splice_nearest_edge(&mut o, base, point, new_id);
                        new_id
                    }
                };
                let _ = shared_node;
            }

            let o_entity = Entity::Way(o.clone());
            changeset.modify(EntityType::Way, o_id, move || Some(o_entity.clone()), move |_| Entity::Way(o));
        }

        let w_entity = Entity::Way(w_mut.clone());
        changeset.modify(EntityType::Way, w.id, move || Some(w_entity.clone()), move |_| Entity::Way(w_mut));
    }
}

fn way_coordinates(way: &WayEntity, base: &Store) -> Option<Vec<(f64, f64)>> {
    way.refs
        .iter()
        .map(|&id| {
            let idx = base.nodes().ids().get_index_from_id(id);
            if idx < 0 {
                None
            } else {
                Some(base.nodes().get_lonlat(idx as u32))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_intersection_finds_crossing_point() {
        let p = segment_intersection((0.0, 0.0), (2.0, 2.0), (0.0, 2.0), (2.0, 0.0));
        assert_eq!(p, Some((1.0, 1.0)));
    }

    #[test]
    fn segment_intersection_none_for_non_crossing_segments() {
        let p = segment_intersection((0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0));
        assert_eq!(p, None);
    }

    #[test]
    fn underpass_way_is_not_a_crossing_candidate() {
        let tunnel_tags = vec![
            ("highway".to_string(), "primary".to_string()),
            ("tunnel".to_string(), "yes".to_string()),
        ];
        assert!(!is_crossing_candidate(&tunnel_tags));
    }

    #[test]
    fn node_id_allocator_starts_above_both_maxima() {
        let mut alloc = NodeIdAllocator::new(100, 50);
        assert_eq!(alloc.next_node_id(), 101);
        assert_eq!(alloc.next_node_id(), 102);
    }
}
