//! Location filters: annotate an answer from the nearest known feature.
//!
//! A [`ResolutionFilter`] combines a [`NearestIndex`] with a [`RecordStore`].
//! It only writes to the answer when its candidate is strictly closer than
//! whatever the answer already holds, so filters for different countries or
//! feature kinds can be applied to the same answer in any order.

mod house;

pub use house::{HouseLocationFilter, HouseRecordStore};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::country::CountryLookup;
use crate::error::IndexError;
use crate::index::NearestIndex;
use crate::locale::LocaleNormalizer;
use crate::models::{AddressRecord, AnswerSink, Coordinate, CountryInfo, HouseId};

/// Fetches full records for candidates that won the distance comparison.
pub trait RecordStore: Send + Sync {
    /// `None` when the record is missing or could not be retrieved.
    fn fetch(&self, id: HouseId) -> impl Future<Output = Option<AddressRecord>> + Send;
}

/// What a single `resolve` call did to the answer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// Index is empty
    NoCandidate,
    /// Candidate was not strictly closer than the current answer
    NotCloser { distance: f64, current: f64 },
    /// Candidate was closer but its record could not be fetched in time
    RecordUnavailable { id: HouseId },
    Updated { distance: f64, place_written: bool },
}

impl Resolution {
    pub fn is_update(&self) -> bool {
        matches!(self, Resolution::Updated { .. })
    }
}

pub struct ResolutionFilter<I, R> {
    country: CountryInfo,
    kind: &'static str,
    index: I,
    records: R,
    countries: Arc<dyn CountryLookup>,
    normalizer: Arc<LocaleNormalizer>,
}

impl<I, R> ResolutionFilter<I, R>
where
    I: NearestIndex,
    R: RecordStore,
{
    pub fn new(
        country: CountryInfo,
        kind: &'static str,
        index: I,
        records: R,
        countries: Arc<dyn CountryLookup>,
        normalizer: Arc<LocaleNormalizer>,
    ) -> Self {
        Self {
            country,
            kind,
            index,
            records,
            countries,
            normalizer,
        }
    }

    pub fn country(&self) -> &CountryInfo {
        &self.country
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// e.g. "houses (Sweden)"
    pub fn description(&self) -> String {
        format!("{} ({})", self.kind, self.country.name)
    }

    /// Write the nearest feature's address onto `answer` if it is strictly
    /// closer than the answer's current best distance.
    ///
    /// Never fails: an empty index, a missing record or a fetch exceeding
    /// `fetch_timeout` all leave the answer untouched.
    pub async fn resolve<A>(
        &self,
        query: &Coordinate,
        answer: &mut A,
        fetch_timeout: Duration,
    ) -> Resolution
    where
        A: AnswerSink + ?Sized,
    {
        let candidate = match self.index.nearest(query) {
            Ok(candidate) => candidate,
            Err(IndexError::Empty { .. }) => return Resolution::NoCandidate,
        };

        let current = answer.distance_from_query();
        debug!(" Nearest: {}", candidate);
        debug!(" Current: {}", current);

        if !candidate.is_closer_than(current) {
            return Resolution::NotCloser {
                distance: candidate.distance,
                current,
            };
        }

        let id = candidate.point.id;
        let record = match tokio::time::timeout(fetch_timeout, self.records.fetch(id)).await {
            Ok(record) => record,
            Err(_) => {
                warn!(
                    "Cannot get house {} within {:?} ({})",
                    id,
                    fetch_timeout,
                    self.description()
                );
                None
            }
        };
        let Some(record) = record else {
            return Resolution::RecordUnavailable { id };
        };

        // Everything is derived before the first write so the commit cannot
        // stop halfway.
        let distance = candidate.distance;
        let country = self.countries.resolve_country(&record.country_code);
        let city = self.normalizer.normalize(&record.country_code, &record.city);

        answer.set_street(record.street, distance);
        answer.set_number(record.house_number, distance);
        answer.set_postal_code(record.postal_code, distance);
        answer.set_country(country, distance);
        if city.place_eligible {
            answer.set_place(city.city, distance);
        }
        answer.set_location(candidate.point.coordinates);

        Resolution::Updated {
            distance,
            place_written: city.place_eligible,
        }
    }
}

impl<I, R> std::fmt::Display for ResolutionFilter<I, R>
where
    I: NearestIndex,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} addresses in {}",
            format_count(self.index.len()),
            self.country.name
        )
    }
}

/// Thousands-separated count, e.g. `1,234,567`
pub fn format_count(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
