//! Error types of the resolution core.

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures reported by a house storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("house storage unavailable: {0}")]
    Unavailable(#[source] BoxError),

    #[error("house storage operation was interrupted")]
    Interrupted,

    #[error("malformed house data in {location}: {reason}")]
    Malformed { location: String, reason: String },
}

impl StorageError {
    pub fn unavailable<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        StorageError::Unavailable(err.into())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::Interrupted {
            StorageError::Interrupted
        } else {
            StorageError::Unavailable(Box::new(err))
        }
    }
}

/// Nearest-point query failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("no address points loaded for {origin}")]
    Empty { origin: String },
}

/// Filter construction failures. A filter is never handed out after one of these.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("address data for {country} unavailable")]
    DataUnavailable {
        country: String,
        #[source]
        source: StorageError,
    },

    #[error("loading addresses for {country} was interrupted")]
    Interrupted { country: String },
}

impl FilterError {
    pub(crate) fn from_storage(country: &str, err: StorageError) -> Self {
        match err {
            StorageError::Interrupted => FilterError::Interrupted {
                country: country.to_string(),
            },
            other => FilterError::DataUnavailable {
                country: country.to_string(),
                source: other,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
