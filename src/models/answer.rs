//! The answer accumulator that competing location filters write into.

use serde::{Deserialize, Serialize};

use super::{Coordinate, CountryInfo};

/// A value together with the distance (metres) of the candidate that set it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerField<T> {
    pub value: T,
    pub distance: f64,
}

impl<T> AnswerField<T> {
    pub fn new(value: T, distance: f64) -> Self {
        Self { value, distance }
    }
}

/// Write interface of an answer.
///
/// Setters overwrite unconditionally. Deciding whether a candidate is allowed
/// to write is the caller's job.
pub trait AnswerSink {
    /// Distance of the closest candidate committed so far, `f64::INFINITY` if none.
    fn distance_from_query(&self) -> f64;

    fn set_street(&mut self, street: String, distance: f64);
    fn set_number(&mut self, number: String, distance: f64);
    fn set_postal_code(&mut self, postal_code: String, distance: f64);
    fn set_country(&mut self, country: CountryInfo, distance: f64);
    fn set_place(&mut self, place: String, distance: f64);

    /// Coordinate of the feature the answer now describes.
    fn set_location(&mut self, _location: Coordinate) {}
}

/// Reverse geocoding answer for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<AnswerField<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<AnswerField<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<AnswerField<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<AnswerField<CountryInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<AnswerField<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Coordinate>,
}

impl Answer {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no filter has written anything yet
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn field_distances(&self) -> [Option<f64>; 5] {
        [
            self.street.as_ref().map(|f| f.distance),
            self.number.as_ref().map(|f| f.distance),
            self.postal_code.as_ref().map(|f| f.distance),
            self.country.as_ref().map(|f| f.distance),
            self.place.as_ref().map(|f| f.distance),
        ]
    }
}

impl AnswerSink for Answer {
    fn distance_from_query(&self) -> f64 {
        self.field_distances()
            .into_iter()
            .flatten()
            .fold(f64::INFINITY, f64::min)
    }

    fn set_street(&mut self, street: String, distance: f64) {
        self.street = Some(AnswerField::new(street, distance));
    }

    fn set_number(&mut self, number: String, distance: f64) {
        self.number = Some(AnswerField::new(number, distance));
    }

    fn set_postal_code(&mut self, postal_code: String, distance: f64) {
        self.postal_code = Some(AnswerField::new(postal_code, distance));
    }

    fn set_country(&mut self, country: CountryInfo, distance: f64) {
        self.country = Some(AnswerField::new(country, distance));
    }

    fn set_place(&mut self, place: String, distance: f64) {
        self.place = Some(AnswerField::new(place, distance));
    }

    fn set_location(&mut self, location: Coordinate) {
        self.location = Some(location);
    }
}
