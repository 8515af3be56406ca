//! In-memory backend with injectable failures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use hashbrown::{HashMap, HashSet};
use tracing::debug;

use super::{HouseConnection, HouseDataSource};
use crate::error::StorageError;
use crate::models::{AddressPoint, AddressRecord, CountryInfo, HouseId};

/// How a simulated storage failure presents itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    Unavailable,
    Interrupted,
}

impl FailureMode {
    fn to_error(self, what: &str) -> StorageError {
        match self {
            FailureMode::Unavailable => {
                StorageError::unavailable(format!("simulated failure: {}", what))
            }
            FailureMode::Interrupted => StorageError::Interrupted,
        }
    }
}

/// Connection bookkeeping shared by a source and its connections
#[derive(Debug, Default)]
pub struct ConnectionStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    records_fetched: AtomicUsize,
}

impl ConnectionStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn records_fetched(&self) -> usize {
        self.records_fetched.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
struct CountryHouses {
    points: Vec<AddressPoint>,
    records: HashMap<HouseId, AddressRecord>,
}

#[derive(Debug, Default)]
struct Failures {
    open: Option<FailureMode>,
    load: Option<FailureMode>,
    records: HashSet<HouseId>,
}

#[derive(Debug, Default)]
pub struct MemoryDataSource {
    countries: HashMap<String, Arc<CountryHouses>>,
    failures: Arc<Mutex<Failures>>,
    latency: Option<Duration>,
    stats: Arc<ConnectionStats>,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a house with its record
    pub fn with_house(mut self, country_code: &str, point: AddressPoint, record: AddressRecord) -> Self {
        let houses = self
            .countries
            .entry(country_code.to_ascii_uppercase())
            .or_insert_with(|| Arc::new(CountryHouses::default()));
        let houses = Arc::make_mut(houses);
        houses.points.push(point);
        houses.records.insert(point.id, record);
        self
    }

    /// Add a coordinate without a record, so fetching it yields `None`
    pub fn with_point(mut self, country_code: &str, point: AddressPoint) -> Self {
        let houses = self
            .countries
            .entry(country_code.to_ascii_uppercase())
            .or_insert_with(|| Arc::new(CountryHouses::default()));
        Arc::make_mut(houses).points.push(point);
        self
    }

    /// Delay every record fetch
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fail_open(&self, mode: Option<FailureMode>) {
        self.lock_failures().open = mode;
    }

    pub fn fail_load(&self, mode: Option<FailureMode>) {
        self.lock_failures().load = mode;
    }

    pub fn fail_record(&self, id: HouseId) {
        self.lock_failures().records.insert(id);
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    fn lock_failures(&self) -> std::sync::MutexGuard<'_, Failures> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HouseDataSource for MemoryDataSource {
    type Connection = MemoryConnection;

    async fn open(&self, country: &CountryInfo) -> Result<MemoryConnection, StorageError> {
        let failure = self.lock_failures().open;
        if let Some(mode) = failure {
            return Err(mode.to_error("open"));
        }

        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        debug!("Opened memory connection for {}", country.code);

        Ok(MemoryConnection {
            houses: self.countries.get(&country.code).cloned().unwrap_or_default(),
            failures: Arc::clone(&self.failures),
            latency: self.latency,
            stats: Arc::clone(&self.stats),
        })
    }
}

pub struct MemoryConnection {
    houses: Arc<CountryHouses>,
    failures: Arc<Mutex<Failures>>,
    latency: Option<Duration>,
    stats: Arc<ConnectionStats>,
}

impl HouseConnection for MemoryConnection {
    async fn load_coordinates(&mut self) -> Result<Vec<AddressPoint>, StorageError> {
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .load;
        if let Some(mode) = failure {
            return Err(mode.to_error("load coordinates"));
        }
        Ok(self.houses.points.clone())
    }

    async fn load_record(&mut self, id: HouseId) -> Result<Option<AddressRecord>, StorageError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.stats.records_fetched.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .contains(&id);
        if failing {
            return Err(FailureMode::Unavailable.to_error("load record"));
        }

        Ok(self.houses.records.get(&id).cloned())
    }

    fn close(&mut self) {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }
}
