//! House resolver - nearest-address step of a reverse geocoder.
//!
//! For each country an in-memory R-tree of known house coordinates answers
//! "closest house to this point". When that house is strictly closer than
//! what the answer already holds, its full record is fetched and written
//! onto the answer.

pub mod config;
pub mod country;
pub mod error;
pub mod filter;
pub mod index;
pub mod locale;
pub mod models;
pub mod storage;

pub use country::{CountryLookup, CountryMap};
pub use error::{FilterError, IndexError, StorageError};
pub use filter::{HouseLocationFilter, Resolution, ResolutionFilter};
pub use index::{HouseIndex, NearestIndex};
pub use locale::{LocaleNormalizer, LocalePolicy, StripRule};
pub use models::{AddressPoint, AddressRecord, Answer, AnswerSink, Coordinate, CountryInfo};
