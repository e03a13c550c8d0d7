//! Shared primitive types: entity kinds, coordinates, and bounding boxes.

/// The precision of a PBF coordinate: degrees × 10^7 (microdegrees).
pub const COORD_PRECISION: f64 = 1e7;

/// The three OSM primitive kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EntityType {
    Node,
    Way,
    Relation,
}

impl EntityType {
    /// Decodes the wire representation used by relation members
    /// (0 = node, 1 = way, 2 = relation).
    pub fn from_member_type(raw: u8) -> Option<EntityType> {
        match raw {
            0 => Some(EntityType::Node),
            1 => Some(EntityType::Way),
            2 => Some(EntityType::Relation),
            _ => None,
        }
    }

    pub fn as_member_type(self) -> u8 {
        match self {
            EntityType::Node => 0,
            EntityType::Way => 1,
            EntityType::Relation => 2,
        }
    }
}

/// Converts a floating-point degree value to a rounded microdegree integer,
/// clamped to the valid range for the given axis.
pub fn lon_to_micro(lon_deg: f64) -> i32 {
    (lon_deg.clamp(-180.0, 180.0) * COORD_PRECISION).round() as i32
}

pub fn lat_to_micro(lat_deg: f64) -> i32 {
    (lat_deg.clamp(-90.0, 90.0) * COORD_PRECISION).round() as i32
}

pub fn micro_to_deg(micro: i32) -> f64 {
    f64::from(micro) / COORD_PRECISION
}

/// An axis-aligned bounding box in degrees: (min_lon, min_lat, max_lon, max_lat).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BBox {
    pub const fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> BBox {
        BBox { min_lon, min_lat, max_lon, max_lat }
    }

    /// A bbox that contains nothing; expanding it with any point yields that
    /// point's degenerate (zero-area) bbox.
    pub const fn empty() -> BBox {
        BBox {
            min_lon: f64::INFINITY,
            min_lat: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            max_lat: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_lon > self.max_lon || self.min_lat > self.max_lat
    }

    pub fn expand_with_point(&mut self, lon: f64, lat: f64) {
        self.min_lon = self.min_lon.min(lon);
        self.min_lat = self.min_lat.min(lat);
        self.max_lon = self.max_lon.max(lon);
        self.max_lat = self.max_lat.max(lat);
    }

    pub fn expand_with_bbox(&mut self, other: &BBox) {
        if other.is_empty() {
            return;
        }
        self.min_lon = self.min_lon.min(other.min_lon);
        self.min_lat = self.min_lat.min(other.min_lat);
        self.max_lon = self.max_lon.max(other.max_lon);
        self.max_lat = self.max_lat.max(other.max_lat);
    }

    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }

    /// The envelope of a sequence of (lon, lat) points.
    pub fn from_points<I: IntoIterator<Item = (f64, f64)>>(points: I) -> BBox {
        let mut bbox = BBox::empty();
        for (lon, lat) in points {
            bbox.expand_with_point(lon, lat);
        }
        bbox
    }
}

/// Mean earth radius in kilometers, matching the value commonly used for OSM
/// great-circle queries.
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Great-circle (haversine) distance between two (lon, lat) points in degrees,
/// in kilometers.
pub fn haversine_km(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn microdegree_round_trip_is_within_precision() {
        let lon = -120.519_123_4;
        let micro = lon_to_micro(lon);
        assert_approx_eq::assert_approx_eq!(micro_to_deg(micro), lon, 1e-7);
    }

    #[test]
    fn bbox_expand_and_intersect() {
        let mut a = BBox::empty();
        assert!(a.is_empty());
        a.expand_with_point(0.0, 0.0);
        a.expand_with_point(2.0, 1.0);
        assert!(!a.is_empty());

        let b = BBox::new(1.0, 0.5, 3.0, 2.0);
        assert!(a.intersects(&b));

        let c = BBox::new(10.0, 10.0, 11.0, 11.0);
        assert!(!a.intersects(&c));
    }

    #[test]
    fn haversine_known_distance() {
        // Roughly one degree of longitude at the equator is ~111.3 km.
        let d = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.19).abs() < 1.0);
    }
}
