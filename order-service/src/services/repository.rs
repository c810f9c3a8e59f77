//! Persistence seams. Every store has a MongoDB implementation
//! (`services::mongo`) and an in-memory one (`services::memory`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Order, PaymentReferences, Room, RoomBooking, UnmatchedWebhook};

/// Attempts made for an optimistic read-modify-write before giving up.
pub const MAX_WRITE_ATTEMPTS: usize = 5;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Record {0} was modified concurrently")]
    VersionConflict(String),

    #[error("Booking slot {0} is locked by another request")]
    SlotBusy(String),

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<mongodb::bson::ser::Error> for StoreError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<mongodb::bson::de::Error> for StoreError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result of placing a booking under the slot guard.
#[derive(Debug, Clone)]
pub enum SlotOutcome {
    Created(RoomBooking),
    /// The caller's pending booking for the same slot, refreshed in place.
    Updated(RoomBooking),
    /// The overlapping booking that holds the slot.
    Conflict(RoomBooking),
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order; `DuplicateKey` when the `orderId` is taken.
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Order>, StoreError>;

    /// Order whose `paymentDetails.transactionId` or
    /// `paymentDetails.externalPaymentId` equals `reference`.
    async fn find_by_payment_reference(&self, reference: &str)
        -> Result<Option<Order>, StoreError>;

    /// Newest first; `user_id` restricts to one owner.
    async fn list(&self, user_id: Option<&str>) -> Result<Vec<Order>, StoreError>;

    /// Replace the order if its stored version is still `expected_version`.
    /// Returns the order as written, with the bumped version.
    async fn replace(&self, order: Order, expected_version: i64) -> Result<Order, StoreError>;

    /// Recent payment identifiers, for unmatched-webhook diagnostics.
    async fn payment_references(&self, limit: i64) -> Result<Vec<PaymentReferences>, StoreError>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<RoomBooking>, StoreError>;

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<RoomBooking>, StoreError>;

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<RoomBooking>, StoreError>;

    /// Check the room's day for overlaps and insert or refresh, serialised
    /// per room and date so two requests cannot both pass the check.
    async fn place(&self, candidate: RoomBooking) -> Result<SlotOutcome, StoreError>;

    /// Return a booking whose payment failed to pending, provided no other
    /// booking took its slot meanwhile. Serialised with `place`.
    /// `Updated` carries the reopened booking, `Conflict` the slot holder.
    async fn reopen(&self, booking: RoomBooking) -> Result<SlotOutcome, StoreError>;

    async fn replace(
        &self,
        booking: RoomBooking,
        expected_version: i64,
    ) -> Result<RoomBooking, StoreError>;

    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    async fn payment_references(&self, limit: i64) -> Result<Vec<PaymentReferences>, StoreError>;
}

/// Read-only view of the room catalogue.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn find_room(&self, id: &str) -> Result<Option<Room>, StoreError>;
}

/// Dead-letter log for webhooks that were acknowledged but not applied.
#[async_trait]
pub trait WebhookLogStore: Send + Sync {
    async fn record(&self, entry: &UnmatchedWebhook) -> Result<(), StoreError>;

    /// Entries without `resolvedAt`, oldest first.
    async fn list_unresolved(&self) -> Result<Vec<UnmatchedWebhook>, StoreError>;

    async fn mark_resolved(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}
