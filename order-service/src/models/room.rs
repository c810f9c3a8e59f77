use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Bookable room. Rooms are managed elsewhere; this service only reads them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

fn default_available() -> bool {
    true
}
