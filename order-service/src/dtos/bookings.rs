use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use crate::models::BookingStatus;
use crate::services::NewBooking;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    #[validate(length(min = 1, message = "Room is required"))]
    pub room: String,
    #[validate(length(min = 1, message = "Booking date is required"))]
    pub booking_date: String,
    #[validate(length(min = 1, message = "Start time is required"))]
    pub start_time: String,
    #[validate(length(min = 1, message = "End time is required"))]
    pub end_time: String,
    #[validate(length(min = 1, message = "Purpose is required"))]
    pub purpose: String,
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    #[validate(length(min = 1, message = "Customer phone is required"))]
    pub customer_phone: String,
    #[validate(email(message = "Invalid email format"))]
    pub customer_email: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
}

impl From<CreateBookingRequest> for NewBooking {
    fn from(request: CreateBookingRequest) -> Self {
        NewBooking {
            room: request.room,
            booking_date: request.booking_date,
            start_time: request.start_time,
            end_time: request.end_time,
            purpose: request.purpose,
            customer_name: request.customer_name,
            customer_phone: request.customer_phone,
            customer_email: request.customer_email,
            amount: request.amount,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingStatusRequest {
    pub status: BookingStatus,
}
