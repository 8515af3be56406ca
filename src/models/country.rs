use serde::{Deserialize, Serialize};

/// Country entity attached to an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryInfo {
    /// ISO 3166-1 alpha-2 code, upper case
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl CountryInfo {
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_ascii_uppercase(),
            name: name.to_string(),
            currency: None,
        }
    }

    /// Placeholder for codes missing from the country table; the code is
    /// passed through as the name.
    pub fn unknown(code: &str) -> Self {
        Self::new(code, code)
    }
}
