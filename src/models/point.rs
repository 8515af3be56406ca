//! Coordinates, address points and nearest-neighbour candidates.

use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

/// Geographic coordinate in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Finite and within lat ±90, lon ±180
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// `geo` point (x = lon, y = lat)
    pub fn to_point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    /// Great-circle distance in metres.
    ///
    /// Every distance stored on an [`Answer`](super::Answer) is produced by this
    /// function, so candidates from different filters stay comparable.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        Haversine.distance(self.to_point(), other.to_point())
    }

    /// Position on the unit sphere.
    ///
    /// Euclidean distance between these vectors is monotonic in great-circle
    /// distance, which lets a plain R-tree answer spherical nearest queries.
    pub fn to_unit_vector(&self) -> [f64; 3] {
        let lat = self.lat.to_radians();
        let lon = self.lon.to_radians();
        [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// Storage identifier of a house
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HouseId(pub i64);

impl std::fmt::Display for HouseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A known address location. Only the coordinates are kept in memory; the
/// full record is fetched on demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AddressPoint {
    pub id: HouseId,
    pub coordinates: Coordinate,
}

impl AddressPoint {
    pub fn new(id: i64, lat: f64, lon: f64) -> Self {
        Self {
            id: HouseId(id),
            coordinates: Coordinate::new(lat, lon),
        }
    }
}

/// Result of a nearest-point query
#[derive(Debug, Clone, PartialEq)]
pub struct NearestCandidate {
    pub point: AddressPoint,
    /// Distance from the query in metres
    pub distance: f64,
    /// Description of the index that produced the candidate, e.g. "houses (Sweden)"
    pub origin: String,
}

impl NearestCandidate {
    /// Strict improvement test against the answer's current best distance.
    pub fn is_closer_than(&self, current: f64) -> bool {
        self.distance < current
    }
}

impl std::fmt::Display for NearestCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "house {} at {} ({:.1} m, {})",
            self.point.id, self.point.coordinates, self.distance, self.origin
        )
    }
}
