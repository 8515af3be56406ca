//! Core data models for nearest-house resolution.

pub mod answer;
pub mod country;
pub mod point;
pub mod record;

pub use answer::{Answer, AnswerField, AnswerSink};
pub use country::CountryInfo;
pub use point::{AddressPoint, Coordinate, HouseId, NearestCandidate};
pub use record::AddressRecord;
