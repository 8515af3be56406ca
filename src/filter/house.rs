//! House filter: one country's known addresses.

use std::sync::Arc;

use tracing::{info, warn};

use super::{RecordStore, ResolutionFilter};
use crate::country::CountryLookup;
use crate::error::{FilterError, StorageError};
use crate::index::{HouseIndex, NearestIndex};
use crate::locale::LocaleNormalizer;
use crate::models::{AddressRecord, CountryInfo, HouseId};
use crate::storage::{open_scoped, HouseConnection, HouseDataSource};

/// Looks up house records on a fresh scoped connection per fetch
pub struct HouseRecordStore<D> {
    source: Arc<D>,
    country: CountryInfo,
}

impl<D: HouseDataSource> HouseRecordStore<D> {
    pub fn new(source: Arc<D>, country: CountryInfo) -> Self {
        Self { source, country }
    }

    async fn load(&self, id: HouseId) -> Result<Option<AddressRecord>, StorageError> {
        let mut conn = open_scoped(&*self.source, &self.country).await?;
        conn.load_record(id).await
    }
}

impl<D: HouseDataSource> RecordStore for HouseRecordStore<D> {
    async fn fetch(&self, id: HouseId) -> Option<AddressRecord> {
        match self.load(id).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                warn!("House {} not found in {}", id, self.country.name);
                None
            }
            Err(e) => {
                warn!("Cannot get house {} because of {}", id, e);
                None
            }
        }
    }
}

pub type HouseLocationFilter<D> = ResolutionFilter<HouseIndex, HouseRecordStore<D>>;

const KIND: &str = "houses";

async fn load_index<D>(source: &D, country: &CountryInfo) -> Result<HouseIndex, FilterError>
where
    D: HouseDataSource + ?Sized,
{
    let points = {
        let mut conn = open_scoped(source, country)
            .await
            .map_err(|e| FilterError::from_storage(&country.name, e))?;
        conn.load_coordinates()
            .await
            .map_err(|e| FilterError::from_storage(&country.name, e))?
    };

    Ok(HouseIndex::build(
        points,
        format!("{} ({})", KIND, country.name),
    ))
}

impl<D: HouseDataSource> ResolutionFilter<HouseIndex, HouseRecordStore<D>> {
    /// Read all house coordinates of `country` and build the filter.
    pub async fn load(
        country: CountryInfo,
        source: Arc<D>,
        countries: Arc<dyn CountryLookup>,
        normalizer: Arc<LocaleNormalizer>,
    ) -> Result<Self, FilterError> {
        let index = load_index(&*source, &country).await?;
        let records = HouseRecordStore::new(source, country.clone());
        let filter = Self::new(country, KIND, index, records, countries, normalizer);
        info!("Loaded {}", filter);
        Ok(filter)
    }

    /// Re-read the coordinates. On failure the previous index stays in use.
    pub async fn reload(&mut self) -> Result<usize, FilterError> {
        let index = load_index(&*self.records.source, &self.country).await?;
        self.index = index;
        info!("Reloaded {}", self);
        Ok(self.index.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::country::CountryMap;
    use crate::filter::Resolution;
    use crate::models::{AddressPoint, Answer, AnswerSink, Coordinate};
    use crate::storage::{FailureMode, MemoryDataSource};

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn record(street: &str, number: &str, postcode: &str, city: &str, cc: &str) -> AddressRecord {
        AddressRecord {
            street: street.into(),
            house_number: number.into(),
            postal_code: postcode.into(),
            city: city.into(),
            country_code: cc.into(),
        }
    }

    fn sweden() -> CountryInfo {
        CountryInfo::new("SE", "Sweden")
    }

    fn countries() -> Arc<dyn CountryLookup> {
        Arc::new(CountryMap::from_countries([
            CountryInfo::new("SE", "Sweden"),
            CountryInfo::new("CN", "China"),
            CountryInfo::new("NO", "Norway"),
        ]))
    }

    fn swedish_source() -> MemoryDataSource {
        MemoryDataSource::new()
            .with_house(
                "SE",
                AddressPoint::new(1, 59.3293, 18.0686),
                record("Drottninggatan", "1", "111 51", "Stockholms kommun", "SE"),
            )
            .with_house(
                "SE",
                AddressPoint::new(2, 59.8586, 17.6389),
                record("Kungsgatan", "12", "753 21", "Uppsala kommun", "SE"),
            )
    }

    async fn load(country: CountryInfo, source: &Arc<MemoryDataSource>) -> HouseLocationFilter<MemoryDataSource> {
        HouseLocationFilter::load(
            country,
            Arc::clone(source),
            countries(),
            Arc::new(LocaleNormalizer::default()),
        )
        .await
        .unwrap()
    }

    /// Records which setters were called
    #[derive(Default)]
    struct RecordingAnswer {
        inner: Answer,
        calls: Vec<&'static str>,
    }

    impl AnswerSink for RecordingAnswer {
        fn distance_from_query(&self) -> f64 {
            self.inner.distance_from_query()
        }
        fn set_street(&mut self, street: String, distance: f64) {
            self.calls.push("street");
            self.inner.set_street(street, distance);
        }
        fn set_number(&mut self, number: String, distance: f64) {
            self.calls.push("number");
            self.inner.set_number(number, distance);
        }
        fn set_postal_code(&mut self, postal_code: String, distance: f64) {
            self.calls.push("postal_code");
            self.inner.set_postal_code(postal_code, distance);
        }
        fn set_country(&mut self, country: CountryInfo, distance: f64) {
            self.calls.push("country");
            self.inner.set_country(country, distance);
        }
        fn set_place(&mut self, place: String, distance: f64) {
            self.calls.push("place");
            self.inner.set_place(place, distance);
        }
    }

    #[tokio::test]
    async fn test_improving_candidate_updates_all_fields() {
        let source = Arc::new(swedish_source());
        let filter = load(sweden(), &source).await;
        let query = Coordinate::new(59.33, 18.07);
        let mut answer = Answer::new();

        let outcome = filter.resolve(&query, &mut answer, TIMEOUT).await;

        let expected = query.distance_to(&Coordinate::new(59.3293, 18.0686));
        assert_eq!(
            outcome,
            Resolution::Updated {
                distance: expected,
                place_written: true
            }
        );
        assert_eq!(answer.street.as_ref().unwrap().value, "Drottninggatan");
        assert_eq!(answer.number.as_ref().unwrap().value, "1");
        assert_eq!(answer.postal_code.as_ref().unwrap().value, "111 51");
        assert_eq!(answer.country.as_ref().unwrap().value.name, "Sweden");
        // Both SE passes applied literally: "Stockholms kommun" -> "Stockholm"
        assert_eq!(answer.place.as_ref().unwrap().value, "Stockholm");
        assert_eq!(answer.location, Some(Coordinate::new(59.3293, 18.0686)));
        for distance in [
            answer.street.as_ref().unwrap().distance,
            answer.number.as_ref().unwrap().distance,
            answer.postal_code.as_ref().unwrap().distance,
            answer.country.as_ref().unwrap().distance,
            answer.place.as_ref().unwrap().distance,
        ] {
            assert_eq!(distance, expected);
        }
        assert_eq!(answer.distance_from_query(), expected);
    }

    #[tokio::test]
    async fn test_not_closer_leaves_answer_untouched() {
        let source = Arc::new(swedish_source());
        let filter = load(sweden(), &source).await;
        let stats = source.stats();

        let mut answer = Answer::new();
        answer.set_street("Already here".into(), 0.5);
        let before = answer.clone();

        let outcome = filter
            .resolve(&Coordinate::new(59.33, 18.07), &mut answer, TIMEOUT)
            .await;

        assert!(matches!(outcome, Resolution::NotCloser { .. }));
        assert_eq!(answer, before);
        assert_eq!(stats.records_fetched(), 0);
    }

    #[tokio::test]
    async fn test_equal_distance_is_not_an_improvement() {
        let source = Arc::new(swedish_source());
        let filter = load(sweden(), &source).await;
        let query = Coordinate::new(59.33, 18.07);
        let distance = query.distance_to(&Coordinate::new(59.3293, 18.0686));

        let mut answer = Answer::new();
        answer.set_place("Somewhere".into(), distance);
        let before = answer.clone();

        let outcome = filter.resolve(&query, &mut answer, TIMEOUT).await;
        assert!(matches!(outcome, Resolution::NotCloser { .. }));
        assert_eq!(answer, before);
        assert_eq!(source.stats().records_fetched(), 0);
    }

    #[tokio::test]
    async fn test_empty_index_is_no_candidate() {
        let source = Arc::new(swedish_source());
        let filter = load(CountryInfo::new("NO", "Norway"), &source).await;
        assert!(filter.is_empty());

        let mut answer = Answer::new();
        let outcome = filter
            .resolve(&Coordinate::new(60.0, 10.0), &mut answer, TIMEOUT)
            .await;
        assert_eq!(outcome, Resolution::NoCandidate);
        assert!(answer.is_empty());
    }

    #[tokio::test]
    async fn test_place_suppressed_for_china() {
        let source = Arc::new(MemoryDataSource::new().with_house(
            "CN",
            AddressPoint::new(7, 39.9042, 116.4074),
            record("Chang'an Avenue", "1", "100000", "Beijing", "CN"),
        ));
        let filter = load(CountryInfo::new("CN", "China"), &source).await;

        let mut answer = RecordingAnswer::default();
        let outcome = filter
            .resolve(&Coordinate::new(39.9, 116.4), &mut answer, TIMEOUT)
            .await;

        assert!(matches!(
            outcome,
            Resolution::Updated {
                place_written: false,
                ..
            }
        ));
        assert_eq!(answer.calls, vec!["street", "number", "postal_code", "country"]);
        assert!(answer.inner.place.is_none());
    }

    #[tokio::test]
    async fn test_record_failure_leaves_answer_untouched() {
        let source = Arc::new(swedish_source());
        source.fail_record(HouseId(1));
        let filter = load(sweden(), &source).await;

        let mut answer = Answer::new();
        let outcome = filter
            .resolve(&Coordinate::new(59.33, 18.07), &mut answer, TIMEOUT)
            .await;

        assert_eq!(outcome, Resolution::RecordUnavailable { id: HouseId(1) });
        assert!(answer.is_empty());
        assert_eq!(source.stats().records_fetched(), 1);
    }

    #[tokio::test]
    async fn test_missing_record_leaves_answer_untouched() {
        let source = Arc::new(
            MemoryDataSource::new().with_point("SE", AddressPoint::new(3, 59.0, 18.0)),
        );
        let filter = load(sweden(), &source).await;

        let mut answer = Answer::new();
        let outcome = filter
            .resolve(&Coordinate::new(59.0, 18.0), &mut answer, TIMEOUT)
            .await;
        assert_eq!(outcome, Resolution::RecordUnavailable { id: HouseId(3) });
        assert!(answer.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_record_unavailable() {
        let source = Arc::new(swedish_source().with_latency(Duration::from_millis(500)));
        let filter = load(sweden(), &source).await;

        let mut answer = Answer::new();
        let outcome = filter
            .resolve(
                &Coordinate::new(59.33, 18.07),
                &mut answer,
                Duration::from_millis(10),
            )
            .await;

        assert_eq!(outcome, Resolution::RecordUnavailable { id: HouseId(1) });
        assert!(answer.is_empty());
        let stats = source.stats();
        assert_eq!(stats.opened(), stats.closed());
    }

    #[tokio::test]
    async fn test_connections_always_closed() {
        let source = Arc::new(swedish_source());
        source.fail_record(HouseId(2));
        let filter = load(sweden(), &source).await;

        let mut answer = Answer::new();
        filter
            .resolve(&Coordinate::new(59.86, 17.64), &mut answer, TIMEOUT)
            .await;
        let mut answer = Answer::new();
        filter
            .resolve(&Coordinate::new(59.33, 18.07), &mut answer, TIMEOUT)
            .await;

        let stats = source.stats();
        assert_eq!(stats.opened(), 3);
        assert_eq!(stats.closed(), 3);
    }

    #[tokio::test]
    async fn test_construction_fails_when_storage_unavailable() {
        let source = Arc::new(swedish_source());
        source.fail_open(Some(FailureMode::Unavailable));

        let result = HouseLocationFilter::load(
            sweden(),
            Arc::clone(&source),
            countries(),
            Arc::new(LocaleNormalizer::default()),
        )
        .await;
        assert!(matches!(result, Err(FilterError::DataUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_construction_interrupted_closes_connection() {
        let source = Arc::new(swedish_source());
        source.fail_load(Some(FailureMode::Interrupted));

        let result = HouseLocationFilter::load(
            sweden(),
            Arc::clone(&source),
            countries(),
            Arc::new(LocaleNormalizer::default()),
        )
        .await;
        assert!(matches!(result, Err(FilterError::Interrupted { .. })));

        let stats = source.stats();
        assert_eq!(stats.opened(), 1);
        assert_eq!(stats.closed(), 1);
    }

    #[tokio::test]
    async fn test_reload_failure_keeps_previous_index() {
        let source = Arc::new(swedish_source());
        let mut filter = load(sweden(), &source).await;
        assert_eq!(filter.reload().await.unwrap(), 2);

        source.fail_load(Some(FailureMode::Unavailable));
        assert!(filter.reload().await.is_err());
        assert_eq!(filter.len(), 2);
    }

    #[tokio::test]
    async fn test_closest_country_wins_in_any_order() {
        let source = Arc::new(swedish_source().with_house(
            "NO",
            AddressPoint::new(100, 59.9139, 10.7522),
            record("Karl Johans gate", "1", "0154", "Oslo", "NO"),
        ));
        let se = load(sweden(), &source).await;
        let no = load(CountryInfo::new("NO", "Norway"), &source).await;
        // Near the border, closer to Oslo than to Stockholm
        let query = Coordinate::new(59.5, 11.5);

        let mut forward = Answer::new();
        se.resolve(&query, &mut forward, TIMEOUT).await;
        no.resolve(&query, &mut forward, TIMEOUT).await;

        let mut backward = Answer::new();
        no.resolve(&query, &mut backward, TIMEOUT).await;
        let second = se.resolve(&query, &mut backward, TIMEOUT).await;

        assert!(matches!(second, Resolution::NotCloser { .. }));
        assert_eq!(forward, backward);
        assert_eq!(forward.place.unwrap().value, "Oslo");
    }

    #[tokio::test]
    async fn test_display_and_description() {
        let source = Arc::new(swedish_source());
        let filter = load(sweden(), &source).await;
        assert_eq!(filter.to_string(), "2 addresses in Sweden");
        assert_eq!(filter.description(), "houses (Sweden)");
        assert_eq!(filter.country().code, "SE");
    }

    #[tokio::test]
    async fn test_resolve_from_csv_files() {
        use crate::storage::CsvDataSource;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("SE.csv")).unwrap();
        file.write_all(
            b"id,lat,lon,street,housenumber,postcode,city,country_code\n\
              1001,59.332580,18.064900,Drottninggatan,1,111 51,Stockholms kommun,SE\n\
              1002,NaN,NaN,Nowhere,0,000 00,Nowhere,SE\n\
              1003,59.858562,17.638927,Kungsgatan,12,753 21,Uppsala kommun,SE\n",
        )
        .unwrap();

        let source = Arc::new(CsvDataSource::open_dir(dir.path()).unwrap());
        let filter = HouseLocationFilter::load(
            sweden(),
            source,
            countries(),
            Arc::new(LocaleNormalizer::default()),
        )
        .await
        .unwrap();
        assert_eq!(filter.len(), 2);

        let mut answer = Answer::new();
        let outcome = filter
            .resolve(&Coordinate::new(59.86, 17.64), &mut answer, TIMEOUT)
            .await;
        assert!(outcome.is_update());
        assert_eq!(answer.street.unwrap().value, "Kungsgatan");
        assert_eq!(answer.place.unwrap().value, "Uppsala");
    }
}
