use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::services::CreatePaymentRequest;

/// Body of `POST /payment/create`. `orderId` names either an order
/// (`ORD-` prefix) or a room booking.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentBody {
    pub amount: Decimal,
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Order id is required"))]
    pub order_id: String,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub custom1: Option<String>,
}

impl From<CreatePaymentBody> for CreatePaymentRequest {
    fn from(body: CreatePaymentBody) -> Self {
        CreatePaymentRequest {
            amount: body.amount,
            first_name: body.first_name,
            last_name: body.last_name,
            phone: body.phone,
            email: body.email,
            transaction_id: body.order_id,
            street: body.street,
            city: body.city,
            state: body.state,
            country: body.country,
            postal_code: body.postal_code,
            custom1: body.custom1,
        }
    }
}

/// Acknowledgement returned for every webhook delivery.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}
