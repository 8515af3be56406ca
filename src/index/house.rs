//! R-tree over house coordinates for one country.

use hashbrown::HashSet;
use rayon::prelude::*;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use tracing::{debug, info, warn};

use super::NearestIndex;
use crate::error::IndexError;
use crate::models::{AddressPoint, Coordinate, NearestCandidate};

/// Wrapper for R-tree indexing of a house on the unit sphere
#[derive(Debug, Clone)]
pub struct IndexedHouse {
    pub point: AddressPoint,
    position: [f64; 3],
}

impl IndexedHouse {
    pub fn new(point: AddressPoint) -> Self {
        Self {
            position: point.coordinates.to_unit_vector(),
            point,
        }
    }
}

impl RTreeObject for IndexedHouse {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for IndexedHouse {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        let dz = self.position[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

/// Chord length on the unit sphere (about 6 µm on the ground) within which
/// neighbours count as equidistant and are re-ranked by exact distance.
const TIE_TOLERANCE: f64 = 1e-12;

/// Spatial index of all known houses of one country
pub struct HouseIndex {
    tree: RTree<IndexedHouse>,
    origin: String,
}

impl HouseIndex {
    /// Build the index. Points with coordinates that are not finite or out
    /// of range, and points repeating an id already seen, are dropped.
    pub fn build(points: Vec<AddressPoint>, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        info!("Building house index for {} points ({})", points.len(), origin);

        let total = points.len();
        let valid: Vec<AddressPoint> = points
            .into_iter()
            .filter(|p| p.coordinates.is_valid())
            .collect();
        if valid.len() < total {
            warn!(
                "Dropped {} houses with invalid coordinates ({})",
                total - valid.len(),
                origin
            );
        }

        let mut seen = HashSet::with_capacity(valid.len());
        let total = valid.len();
        let unique: Vec<AddressPoint> = valid
            .into_iter()
            .filter(|p| seen.insert(p.id))
            .collect();
        if unique.len() < total {
            warn!(
                "Dropped {} houses with duplicate ids ({})",
                total - unique.len(),
                origin
            );
        }

        let indexed: Vec<IndexedHouse> = unique.into_par_iter().map(IndexedHouse::new).collect();
        let tree = RTree::bulk_load(indexed);

        info!("House index built with {} entries ({})", tree.size(), origin);

        Self { tree, origin }
    }

    /// Iterate over all indexed houses
    pub fn points(&self) -> impl Iterator<Item = &AddressPoint> {
        self.tree.iter().map(|h| &h.point)
    }
}

impl NearestIndex for HouseIndex {
    fn nearest(&self, query: &Coordinate) -> Result<NearestCandidate, IndexError> {
        let query_position = query.to_unit_vector();

        // The iterator yields in ascending chord length. Everything within
        // the tolerance of the first hit is ranked by great-circle distance,
        // then by id.
        let mut neighbours = self
            .tree
            .nearest_neighbor_iter_with_distance_2(&query_position)
            .peekable();
        let min_distance_2 = match neighbours.peek() {
            Some((_, d2)) => *d2,
            None => {
                return Err(IndexError::Empty {
                    origin: self.origin.clone(),
                })
            }
        };
        let cutoff = (min_distance_2.sqrt() + TIE_TOLERANCE).powi(2);

        let (distance, best) = neighbours
            .take_while(|(_, d2)| *d2 <= cutoff)
            .map(|(house, _)| (query.distance_to(&house.point.coordinates), house))
            .min_by(|(da, a), (db, b)| da.total_cmp(db).then(a.point.id.cmp(&b.point.id)))
            .ok_or_else(|| IndexError::Empty {
                origin: self.origin.clone(),
            })?;

        let candidate = NearestCandidate {
            point: best.point,
            distance,
            origin: self.origin.clone(),
        };
        debug!("Nearest to {}: {}", query, candidate);

        Ok(candidate)
    }

    fn len(&self) -> usize {
        self.tree.size()
    }
}
