pub mod bookings;
pub mod orders;
pub mod payments;

pub use bookings::{CreateBookingRequest, UpdateBookingStatusRequest};
pub use orders::{
    CreateOrderRequest, OrderItemRequest, PaymentDetailsRequest, UpdateOrderStatusRequest,
};
pub use payments::{CreatePaymentBody, WebhookAck};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Success envelope shared by every domain route.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Clients send identifiers such as table numbers as either strings or
/// numbers.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number, found {}",
            other
        ))),
    }
}
