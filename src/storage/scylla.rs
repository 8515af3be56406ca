//! ScyllaDB backend.

use std::sync::Arc;

use ::scylla::client::session::Session;
use ::scylla::client::session_builder::SessionBuilder;
use futures::TryStreamExt;
use tracing::{debug, info};

use super::{HouseConnection, HouseDataSource, HouseRow};
use crate::error::StorageError;
use crate::models::{AddressPoint, AddressRecord, CountryInfo, HouseId};

type RecordRow = (
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

#[derive(Clone)]
pub struct ScyllaDataSource {
    session: Arc<Session>,
    keyspace: String,
}

impl ScyllaDataSource {
    pub async fn connect(uri: &str, keyspace: &str) -> Result<Self, StorageError> {
        info!("Connecting to ScyllaDB at {}...", uri);
        let session: Session = SessionBuilder::new()
            .known_node(uri)
            .build()
            .await
            .map_err(StorageError::unavailable)?;

        let source = Self {
            session: Arc::new(session),
            keyspace: keyspace.to_string(),
        };

        source.init_schema().await?;
        Ok(source)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        self.session
            .query_unpaged(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {} 
                     WITH REPLICATION = {{
                        'class' : 'SimpleStrategy',
                        'replication_factor' : 1
                     }}",
                    self.keyspace
                ),
                &[],
            )
            .await
            .map_err(StorageError::unavailable)?;

        // Partitioned by country so a coordinate load is one partition scan
        self.session
            .query_unpaged(
                format!(
                    "CREATE TABLE IF NOT EXISTS {}.houses (
                        country text,
                        id bigint,
                        lat double,
                        lon double,
                        street text,
                        housenumber text,
                        postcode text,
                        city text,
                        country_code text,
                        PRIMARY KEY ((country), id)
                    )",
                    self.keyspace
                ),
                &[],
            )
            .await
            .map_err(StorageError::unavailable)?;

        Ok(())
    }

    pub async fn upsert_house(&self, country_code: &str, row: &HouseRow) -> Result<(), StorageError> {
        self.session
            .query_unpaged(
                format!(
                    "INSERT INTO {}.houses (country, id, lat, lon, street, housenumber, postcode, city, country_code)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    self.keyspace
                ),
                (
                    country_code.to_ascii_uppercase(),
                    row.id,
                    row.lat,
                    row.lon,
                    &row.street,
                    &row.housenumber,
                    &row.postcode,
                    &row.city,
                    &row.country_code,
                ),
            )
            .await
            .map_err(StorageError::unavailable)?;
        Ok(())
    }
}

impl HouseDataSource for ScyllaDataSource {
    type Connection = ScyllaConnection;

    async fn open(&self, country: &CountryInfo) -> Result<ScyllaConnection, StorageError> {
        Ok(ScyllaConnection {
            session: Arc::clone(&self.session),
            keyspace: self.keyspace.clone(),
            country: country.code.clone(),
        })
    }
}

/// Country-scoped handle on the shared session
pub struct ScyllaConnection {
    session: Arc<Session>,
    keyspace: String,
    country: String,
}

impl HouseConnection for ScyllaConnection {
    async fn load_coordinates(&mut self) -> Result<Vec<AddressPoint>, StorageError> {
        let mut rows = self
            .session
            .query_iter(
                format!(
                    "SELECT id, lat, lon FROM {}.houses WHERE country = ?",
                    self.keyspace
                ),
                (self.country.as_str(),),
            )
            .await
            .map_err(StorageError::unavailable)?
            .rows_stream::<(i64, f64, f64)>()
            .map_err(StorageError::unavailable)?;

        let mut points = Vec::new();
        while let Some((id, lat, lon)) = rows.try_next().await.map_err(StorageError::unavailable)? {
            points.push(AddressPoint::new(id, lat, lon));
        }

        info!("Loaded {} house coordinates for {}", points.len(), self.country);
        Ok(points)
    }

    async fn load_record(&mut self, id: HouseId) -> Result<Option<AddressRecord>, StorageError> {
        let result = self
            .session
            .query_unpaged(
                format!(
                    "SELECT street, housenumber, postcode, city, country_code
                     FROM {}.houses WHERE country = ? AND id = ?",
                    self.keyspace
                ),
                (self.country.as_str(), id.0),
            )
            .await
            .map_err(StorageError::unavailable)?;

        let rows_result = result.into_rows_result().map_err(StorageError::unavailable)?;
        let row = rows_result
            .maybe_first_row::<RecordRow>()
            .map_err(StorageError::unavailable)?;

        Ok(row.map(|(street, housenumber, postcode, city, country_code)| AddressRecord {
            street: street.unwrap_or_default(),
            house_number: housenumber.unwrap_or_default(),
            postal_code: postcode.unwrap_or_default(),
            city: city.unwrap_or_default(),
            country_code: country_code.unwrap_or_default(),
        }))
    }

    fn close(&mut self) {
        debug!("Released ScyllaDB handle for {}", self.country);
    }
}
