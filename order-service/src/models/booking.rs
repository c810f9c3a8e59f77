//! Room booking model and slot arithmetic.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{PaymentReferences, PaymentStatus};

/// Longest bookable window.
pub const MAX_BOOKING_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Completed,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BookingPaymentDetails {
    pub transaction_id: Option<String>,
    pub external_payment_id: Option<String>,
    #[serde(default)]
    pub status: PaymentStatus,
    pub amount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomBooking {
    #[serde(rename = "_id")]
    pub id: String,
    /// Caller that created the booking.
    pub user: String,
    pub room: String,
    /// Calendar day, `YYYY-MM-DD`.
    pub booking_date: String,
    pub start_time: String,
    pub end_time: String,
    pub purpose: String,
    #[serde(default)]
    pub status: BookingStatus,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: String,
    pub amount: Decimal,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub payment_details: BookingPaymentDetails,
    #[serde(default)]
    pub version: i64,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl RoomBooking {
    /// The booked interval; `None` only for records written with unparseable times.
    pub fn window(&self) -> Option<BookingWindow> {
        BookingWindow::parse(&self.booking_date, &self.start_time, &self.end_time).ok()
    }

    /// Put a failed payment back to pending so it can be retried.
    pub fn reopen_payment(&mut self) {
        self.payment_status = PaymentStatus::Pending;
        self.payment_details.status = PaymentStatus::Pending;
    }

    pub fn payment_references(&self) -> PaymentReferences {
        PaymentReferences {
            id: self.id.clone(),
            transaction_id: self.payment_details.transaction_id.clone(),
            external_payment_id: self.payment_details.external_payment_id.clone(),
        }
    }
}

/// Half-open booking interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl BookingWindow {
    /// Parse a window from a booking day and two times.
    ///
    /// Times are either time-of-day (`HH:MM`, `HH:MM:SS`) on `date`, or
    /// RFC 3339 instants which are taken as-is in UTC.
    pub fn parse(date: &str, start: &str, end: &str) -> Result<Self, String> {
        let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| format!("Invalid booking date '{}', expected YYYY-MM-DD", date))?;
        let start = parse_point(day, start)
            .ok_or_else(|| format!("Invalid start time format '{}'", start))?;
        let end =
            parse_point(day, end).ok_or_else(|| format!("Invalid end time format '{}'", end))?;

        if end <= start {
            return Err("End time must be after start time".to_string());
        }
        if end - start > Duration::hours(MAX_BOOKING_HOURS) {
            return Err(format!(
                "Booking duration cannot exceed {} hours",
                MAX_BOOKING_HOURS
            ));
        }

        Ok(Self { start, end })
    }

    pub fn overlaps(&self, other: &BookingWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// What to do with a booking request given the room's existing bookings
/// for the same day.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotPlan {
    /// No overlapping booking holds the slot.
    Insert,
    /// The caller's own pending booking for the exact slot; refresh its
    /// customer fields instead of creating a second record.
    Refresh(RoomBooking),
    /// Another booking holds an overlapping slot.
    Conflict(RoomBooking),
}

/// Decide between insert, in-place refresh and conflict.
///
/// Only bookings whose payment status still holds the slot take part.
/// Records with unparseable windows never conflict.
pub fn plan_slot(existing: &[RoomBooking], candidate: &RoomBooking) -> SlotPlan {
    let Some(window) = candidate.window() else {
        return SlotPlan::Insert;
    };

    let mut refresh = None;
    for booking in existing.iter().filter(|b| {
        b.id != candidate.id
            && b.room == candidate.room
            && b.booking_date == candidate.booking_date
            && b.payment_status.holds_slot()
    }) {
        let Some(other) = booking.window() else {
            continue;
        };
        if !window.overlaps(&other) {
            continue;
        }
        let same_slot = other == window;
        if same_slot
            && booking.user == candidate.user
            && booking.payment_status == PaymentStatus::Pending
            && refresh.is_none()
        {
            refresh = Some(booking.clone());
            continue;
        }
        return SlotPlan::Conflict(booking.clone());
    }

    match refresh {
        Some(booking) => SlotPlan::Refresh(booking),
        None => SlotPlan::Insert,
    }
}

fn parse_point(day: NaiveDate, value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map(|time| day.and_time(time))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|instant| instant.naive_utc())
        })
}
