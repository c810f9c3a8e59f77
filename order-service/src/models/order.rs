//! Restaurant order model.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::PaymentStatus;

/// Prefix shared by every generated order identifier.
pub const ORDER_ID_PREFIX: &str = "ORD-";

/// Generate a new order identifier: `ORD-<unix-millis>-<0..999>`.
pub fn generate_order_id() -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..1000);
    format!(
        "{}{}-{}",
        ORDER_ID_PREFIX,
        Utc::now().timestamp_millis(),
        suffix
    )
}

/// Whether a token has the shape of an order identifier.
pub fn is_order_id(token: &str) -> bool {
    token.starts_with(ORDER_ID_PREFIX)
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    DineIn,
    Takeaway,
    Delivery,
}

impl FromStr for OrderType {
    type Err = String;

    /// Accepts the display forms clients send ("Dine In", "dine-in", "DINE_IN").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .trim()
            .to_lowercase()
            .split(|c: char| c.is_whitespace() || c == '-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_");
        match normalized.as_str() {
            "dine_in" => Ok(OrderType::DineIn),
            "takeaway" => Ok(OrderType::Takeaway),
            "delivery" => Ok(OrderType::Delivery),
            _ => Err(format!(
                "Invalid order type '{}'. Must be one of: Dine In, Takeaway, Delivery",
                s
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Cooking,
    Completed,
    Cancelled,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CookingStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Online,
    #[default]
    Cash,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Online => write!(f, "online"),
            PaymentMethod::Cash => write!(f, "cash"),
        }
    }
}

/// Owner snapshot taken when the order is first created.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderUser {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub menu_item: String,
    pub food_name: String,
    pub quantity: u32,
    pub food_price: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OrderPaymentDetails {
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub amount_paid: Decimal,
    pub transaction_id: Option<String>,
    pub external_payment_id: Option<String>,
    #[serde(default)]
    pub status: PaymentStatus,
    pub pay_url: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: String,
    pub order_id: String,
    pub order_type: OrderType,
    pub table_number: Option<String>,
    pub delivery_address: Option<String>,
    pub user: OrderUser,
    pub items: Vec<OrderItem>,
    pub order_total: Decimal,
    #[serde(default)]
    pub tax: Decimal,
    #[serde(default)]
    pub shipping: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub notes: Option<String>,
    #[serde(default)]
    pub order_status: OrderStatus,
    #[serde(default)]
    pub cooking_status: CookingStatus,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub payment_details: OrderPaymentDetails,
    #[serde(default)]
    pub version: i64,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Payment identifiers the provider may echo back for this order.
    pub fn payment_references(&self) -> PaymentReferences {
        PaymentReferences {
            id: self.order_id.clone(),
            transaction_id: self.payment_details.transaction_id.clone(),
            external_payment_id: self.payment_details.external_payment_id.clone(),
        }
    }
}

/// Identifier snapshot used when a webhook matches nothing.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReferences {
    pub id: String,
    pub transaction_id: Option<String>,
    pub external_payment_id: Option<String>,
}
