//! Nearest-point indexes.
//!
//! Any spatial index able to answer "closest known feature to this
//! coordinate" implements [`NearestIndex`]; the resolution filter only
//! depends on this trait, so house, street and POI indexes share it.

mod house;

pub use house::{HouseIndex, IndexedHouse};

use crate::error::IndexError;
use crate::models::{Coordinate, NearestCandidate};

pub trait NearestIndex: Send + Sync {
    /// Closest point to `query`. Equal distances resolve to the lowest id.
    fn nearest(&self, query: &Coordinate) -> Result<NearestCandidate, IndexError>;

    /// Number of indexed points
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
