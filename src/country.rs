//! Country lookup table.

use hashbrown::HashMap;

use crate::models::CountryInfo;

/// Resolves a country code to the entity attached to an answer.
pub trait CountryLookup: Send + Sync {
    fn resolve_country(&self, code: &str) -> CountryInfo;
}

/// In-memory code -> country table.
#[derive(Debug, Clone, Default)]
pub struct CountryMap {
    countries: HashMap<String, CountryInfo>,
}

impl CountryMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_countries<I>(countries: I) -> Self
    where
        I: IntoIterator<Item = CountryInfo>,
    {
        let mut map = Self::new();
        for country in countries {
            map.insert(country);
        }
        map
    }

    pub fn insert(&mut self, mut country: CountryInfo) {
        country.code = country.code.to_ascii_uppercase();
        self.countries.insert(country.code.clone(), country);
    }

    pub fn get(&self, code: &str) -> Option<&CountryInfo> {
        self.countries.get(code.to_ascii_uppercase().as_str())
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }

    /// All countries sorted by code
    pub fn countries(&self) -> Vec<&CountryInfo> {
        let mut all: Vec<&CountryInfo> = self.countries.values().collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        all
    }
}

impl CountryLookup for CountryMap {
    /// Unknown codes are passed through rather than rejected.
    fn resolve_country(&self, code: &str) -> CountryInfo {
        self.get(code)
            .cloned()
            .unwrap_or_else(|| CountryInfo::unknown(code))
    }
}
