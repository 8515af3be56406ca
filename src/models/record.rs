use serde::{Deserialize, Serialize};

/// Full address details of a house, fetched by id after a candidate wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub street: String,
    #[serde(rename = "housenumber")]
    pub house_number: String,
    #[serde(rename = "postcode")]
    pub postal_code: String,
    pub city: String,
    pub country_code: String,
}
