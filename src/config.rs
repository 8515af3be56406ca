//! TOML configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::country::CountryMap;
use crate::error::ConfigError;
use crate::locale::{LocaleNormalizer, LocalePolicy};
use crate::models::CountryInfo;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub countries: Vec<CountryInfo>,
    #[serde(default)]
    pub locales: Vec<LocaleConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Upper bound for one house record fetch
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_fetch_timeout_ms() -> u64 {
    2000
}

fn default_keyspace() -> String {
    "houses".to_string()
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    Csv {
        dir: PathBuf,
    },
    Scylla {
        scylla_url: String,
        #[serde(default = "default_keyspace")]
        keyspace: String,
    },
}

/// Locale policy override for one country
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LocaleConfig {
    pub code: String,
    #[serde(flatten)]
    pub policy: LocalePolicy,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.server.fetch_timeout_ms)
    }

    pub fn country_map(&self) -> CountryMap {
        CountryMap::from_countries(self.countries.iter().cloned())
    }

    /// Built-in locale table with the configured overrides applied
    pub fn locale_normalizer(&self) -> LocaleNormalizer {
        let mut normalizer = LocaleNormalizer::default();
        for locale in &self.locales {
            normalizer.set_policy(&locale.code, locale.policy.clone());
        }
        normalizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::CountryLookup;
    use crate::locale::StripRule;

    const SAMPLE: &str = r#"
[server]
listen = "127.0.0.1:8080"
fetch_timeout_ms = 500

[storage]
backend = "csv"
dir = "data/houses"

[[countries]]
code = "SE"
name = "Sweden"
currency = "SEK"

[[countries]]
code = "NO"
name = "Norway"

[[locales]]
code = "NO"
policy = "strip"
rules = [{ after_last = " kommune" }]

[[locales]]
code = "CN"
policy = "identity"
"#;

    #[test]
    fn test_parse_sample() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:8080");
        assert_eq!(config.fetch_timeout(), Duration::from_millis(500));
        assert_eq!(
            config.storage,
            StorageConfig::Csv {
                dir: PathBuf::from("data/houses")
            }
        );
        assert_eq!(config.countries.len(), 2);
        assert_eq!(config.countries[0].currency.as_deref(), Some("SEK"));
        assert_eq!(
            config.locales[0].policy,
            LocalePolicy::Strip {
                rules: vec![StripRule::AfterLast(" kommune".into())]
            }
        );
    }

    #[test]
    fn test_locale_overrides() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let normalizer = config.locale_normalizer();
        assert_eq!(normalizer.normalize("NO", "Bergen kommune").city, "Bergen");
        assert!(normalizer.normalize("CN", "Beijing").place_eligible);
        assert_eq!(normalizer.normalize("SE", "Ale kommun").city, "Ale");
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str(
            "[storage]\nbackend = \"scylla\"\nscylla_url = \"127.0.0.1\"\n",
        )
        .unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:3000");
        assert_eq!(config.fetch_timeout(), Duration::from_millis(2000));
        assert_eq!(
            config.storage,
            StorageConfig::Scylla {
                scylla_url: "127.0.0.1".into(),
                keyspace: "houses".into()
            }
        );
        assert_eq!(config.country_map().resolve_country("SE").name, "SE");
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load_from_file("/nonexistent/house-resolver.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
