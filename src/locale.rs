//! Country-specific cleanup of city names.
//!
//! Behaviour per country is data: a [`LocalePolicy`] in a lookup table keyed
//! by country code. Adding a country means adding a table entry (or a
//! `[[locales]]` block in the config file), never touching the filter.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One text trim applied to a city name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StripRule {
    /// Drop everything from the first occurrence of the pattern onward
    After(String),
    /// Drop everything from the last occurrence of the pattern onward
    AfterLast(String),
}

impl StripRule {
    pub fn apply<'a>(&self, text: &'a str) -> &'a str {
        let cut = match self {
            StripRule::After(pattern) => text.find(pattern.as_str()),
            StripRule::AfterLast(pattern) => text.rfind(pattern.as_str()),
        };
        match cut {
            Some(idx) => &text[..idx],
            None => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum LocalePolicy {
    /// Apply the rules in order; the place stays eligible
    Strip { rules: Vec<StripRule> },
    /// Never write a place for this country
    SuppressPlace,
    Identity,
}

static IDENTITY: LocalePolicy = LocalePolicy::Identity;

/// Normalized city text and whether it may be written as the answer's place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCity {
    pub city: String,
    pub place_eligible: bool,
}

#[derive(Debug, Clone)]
pub struct LocaleNormalizer {
    policies: HashMap<String, LocalePolicy>,
}

impl Default for LocaleNormalizer {
    /// Built-in table: Swedish municipality suffixes are trimmed, and Chinese
    /// and Taiwanese city data is not used as place.
    fn default() -> Self {
        let mut normalizer = Self::empty();
        normalizer.set_policy(
            "SE",
            LocalePolicy::Strip {
                rules: vec![
                    StripRule::After("s kommun".into()),
                    StripRule::AfterLast(" kommun".into()),
                ],
            },
        );
        normalizer.set_policy("CN", LocalePolicy::SuppressPlace);
        normalizer.set_policy("TW", LocalePolicy::SuppressPlace);
        normalizer
    }
}

impl LocaleNormalizer {
    /// Table without any entries: every country is `Identity`
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    /// Add or replace the policy of a country.
    pub fn set_policy(&mut self, country_code: &str, policy: LocalePolicy) {
        self.policies
            .insert(country_code.to_ascii_uppercase(), policy);
    }

    pub fn with_policy(mut self, country_code: &str, policy: LocalePolicy) -> Self {
        self.set_policy(country_code, policy);
        self
    }

    pub fn policy(&self, country_code: &str) -> &LocalePolicy {
        self.policies
            .get(country_code.to_ascii_uppercase().as_str())
            .unwrap_or(&IDENTITY)
    }

    pub fn normalize(&self, country_code: &str, city: &str) -> NormalizedCity {
        let normalized = match self.policy(country_code) {
            LocalePolicy::Strip { rules } => NormalizedCity {
                city: rules
                    .iter()
                    .fold(city, |text, rule| rule.apply(text))
                    .to_string(),
                place_eligible: true,
            },
            LocalePolicy::SuppressPlace => NormalizedCity {
                city: city.to_string(),
                place_eligible: false,
            },
            LocalePolicy::Identity => NormalizedCity {
                city: city.to_string(),
                place_eligible: true,
            },
        };

        if normalized.city != city {
            debug!(
                "Normalized city '{}' -> '{}' for {}",
                city, normalized.city, country_code
            );
        }

        normalized
    }
}
