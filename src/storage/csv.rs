//! CSV backend: one `<CODE>.csv` file per country.
//!
//! Expected header: `id,lat,lon,street,housenumber,postcode,city,country_code`.
//! Record lookups scan the file, so this backend suits extracts and import
//! staging rather than country-scale serving.

use std::fs::File;
use std::path::{Path, PathBuf};

use ::csv::{ReaderBuilder, StringRecord};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{HouseConnection, HouseDataSource};
use crate::error::StorageError;
use crate::models::{AddressPoint, AddressRecord, Coordinate, CountryInfo, HouseId};

/// One line of a house file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseRow {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub housenumber: String,
    #[serde(default)]
    pub postcode: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country_code: String,
}

impl HouseRow {
    pub fn point(&self) -> AddressPoint {
        AddressPoint {
            id: HouseId(self.id),
            coordinates: Coordinate::new(self.lat, self.lon),
        }
    }

    pub fn into_record(self) -> AddressRecord {
        AddressRecord {
            street: self.street,
            house_number: self.housenumber,
            postal_code: self.postcode,
            city: self.city,
            country_code: self.country_code,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CoordinateRow {
    id: i64,
    lat: f64,
    lon: f64,
}

#[derive(Debug, Clone)]
pub struct CsvDataSource {
    files: HashMap<String, PathBuf>,
}

impl CsvDataSource {
    /// Discover house files below `dir`, recursively.
    pub fn open_dir<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        info!("Scanning house files in {}", dir.display());

        let mut files = HashMap::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry.map_err(StorageError::unavailable)?;
            let path = entry.path();

            if !path.is_file() || path.extension().map_or(true, |e| e != "csv") {
                continue;
            }

            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                files.insert(stem.to_ascii_uppercase(), path.to_path_buf());
            }
        }

        info!("Found house files for {} countries", files.len());
        Ok(Self { files })
    }

    /// Country codes with a house file, sorted
    pub fn country_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.files.keys().cloned().collect();
        codes.sort();
        codes
    }

    pub fn path_for(&self, country_code: &str) -> Option<&Path> {
        self.files
            .get(country_code.to_ascii_uppercase().as_str())
            .map(PathBuf::as_path)
    }
}

impl HouseDataSource for CsvDataSource {
    type Connection = CsvConnection;

    async fn open(&self, country: &CountryInfo) -> Result<CsvConnection, StorageError> {
        let path = self.path_for(&country.code).ok_or_else(|| {
            StorageError::unavailable(format!("no house file for {}", country.code))
        })?;
        debug!("Opened house file {}", path.display());
        Ok(CsvConnection {
            path: path.to_path_buf(),
        })
    }
}

pub struct CsvConnection {
    path: PathBuf,
}

/// Run blocking file IO off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(StorageError::Interrupted),
        Err(e) => Err(StorageError::unavailable(e)),
    }
}

fn open_reader(path: &Path) -> Result<::csv::Reader<File>, StorageError> {
    let file = File::open(path)?;
    Ok(ReaderBuilder::new()
        .has_headers(true)
        .trim(::csv::Trim::All)
        .from_reader(file))
}

fn location(path: &Path, record: &StringRecord) -> String {
    match record.position() {
        Some(pos) => format!("{}:{}", path.display(), pos.line()),
        None => path.display().to_string(),
    }
}

/// Read all coordinates; rows that fail to parse are skipped.
pub(crate) fn read_coordinates(path: &Path) -> Result<Vec<AddressPoint>, StorageError> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(StorageError::unavailable)?.clone();

    let mut points = Vec::new();
    let mut skipped = 0usize;
    let mut record = StringRecord::new();

    while reader
        .read_record(&mut record)
        .map_err(StorageError::unavailable)?
    {
        match record.deserialize::<CoordinateRow>(Some(&headers)) {
            Ok(row) => points.push(AddressPoint::new(row.id, row.lat, row.lon)),
            Err(e) => {
                skipped += 1;
                debug!("Skipping {}: {}", location(path, &record), e);
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} malformed rows in {}", skipped, path.display());
    }

    Ok(points)
}

pub(crate) fn find_record(path: &Path, id: HouseId) -> Result<Option<AddressRecord>, StorageError> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(StorageError::unavailable)?.clone();
    let mut record = StringRecord::new();

    while reader
        .read_record(&mut record)
        .map_err(StorageError::unavailable)?
    {
        // Cheap id check before deserializing the whole row
        let matches = record
            .get(0)
            .and_then(|raw| raw.parse::<i64>().ok())
            .map_or(false, |raw_id| raw_id == id.0);
        if !matches {
            continue;
        }

        let row: HouseRow = record
            .deserialize(Some(&headers))
            .map_err(|e| StorageError::Malformed {
                location: location(path, &record),
                reason: e.to_string(),
            })?;
        return Ok(Some(row.into_record()));
    }

    Ok(None)
}

impl HouseConnection for CsvConnection {
    async fn load_coordinates(&mut self) -> Result<Vec<AddressPoint>, StorageError> {
        let path = self.path.clone();
        blocking(move || read_coordinates(&path)).await
    }

    async fn load_record(&mut self, id: HouseId) -> Result<Option<AddressRecord>, StorageError> {
        let path = self.path.clone();
        blocking(move || find_record(&path, id)).await
    }

    fn close(&mut self) {
        debug!("Closed house file {}", self.path.display());
    }
}
