//! MongoDB-backed stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions};
use mongodb::{Collection, Database, IndexModel};
use std::time::Duration;
use uuid::Uuid;

use super::repository::{
    BookingStore, OrderStore, RoomDirectory, SlotOutcome, StoreError, WebhookLogStore,
};
use crate::models::{
    plan_slot, Order, PaymentReferences, Room, RoomBooking, SlotPlan, UnmatchedWebhook,
};

const DUPLICATE_KEY_CODE: i32 = 11000;

/// How long a slot lease lives if its holder never releases it.
const SLOT_LEASE: Duration = Duration::from_secs(10);
const SLOT_ACQUIRE_ATTEMPTS: u32 = 40;
const SLOT_ACQUIRE_BACKOFF: Duration = Duration::from_millis(25);

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

fn payment_reference_filter(reference: &str) -> Document {
    doc! {
        "$or": [
            { "paymentDetails.transactionId": reference },
            { "paymentDetails.externalPaymentId": reference },
        ]
    }
}

fn newest_first(limit: Option<i64>) -> FindOptions {
    let mut options = FindOptions::builder()
        .sort(doc! { "createdAt": -1 })
        .build();
    options.limit = limit;
    options
}

fn index(keys: Document, name: &str, unique: bool) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(name.to_string())
                .unique(unique)
                .build(),
        )
        .build()
}

#[derive(Clone)]
pub struct MongoOrderStore {
    collection: Collection<Order>,
}

impl MongoOrderStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("orders"),
        }
    }

    pub async fn init_indexes(&self) -> Result<(), StoreError> {
        self.collection
            .create_indexes(
                [
                    index(doc! { "orderId": 1 }, "order_id_unique", true),
                    index(
                        doc! { "paymentDetails.transactionId": 1 },
                        "order_transaction_idx",
                        false,
                    ),
                    index(
                        doc! { "paymentDetails.externalPaymentId": 1 },
                        "order_external_payment_idx",
                        false,
                    ),
                    index(
                        doc! { "user.userId": 1, "createdAt": -1 },
                        "order_user_idx",
                        false,
                    ),
                ],
                None,
            )
            .await?;

        tracing::info!("Order indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MongoOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        match self.collection.insert_one(order, None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::DuplicateKey(order.order_id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self
            .collection
            .find_one(doc! { "orderId": order_id }, None)
            .await?)
    }

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, StoreError> {
        Ok(self
            .collection
            .find_one(payment_reference_filter(reference), None)
            .await?)
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<Order>, StoreError> {
        let filter = match user_id {
            Some(user_id) => doc! { "user.userId": user_id },
            None => doc! {},
        };
        let cursor = self.collection.find(filter, newest_first(None)).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn replace(&self, mut order: Order, expected_version: i64) -> Result<Order, StoreError> {
        order.version = expected_version + 1;
        let result = self
            .collection
            .replace_one(
                doc! { "orderId": &order.order_id, "version": expected_version },
                &order,
                None,
            )
            .await?;

        if result.matched_count == 0 {
            return Err(StoreError::VersionConflict(order.order_id));
        }
        Ok(order)
    }

    async fn payment_references(&self, limit: i64) -> Result<Vec<PaymentReferences>, StoreError> {
        let cursor = self
            .collection
            .find(doc! {}, newest_first(Some(limit)))
            .await?;
        let orders: Vec<Order> = cursor.try_collect().await?;
        Ok(orders.iter().map(Order::payment_references).collect())
    }
}

#[derive(Clone)]
pub struct MongoBookingStore {
    collection: Collection<RoomBooking>,
    guards: Collection<Document>,
}

impl MongoBookingStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("room_bookings"),
            guards: db.collection("booking_slot_guards"),
        }
    }

    pub async fn init_indexes(&self) -> Result<(), StoreError> {
        self.collection
            .create_indexes(
                [
                    index(
                        doc! { "room": 1, "bookingDate": 1 },
                        "booking_room_date_idx",
                        false,
                    ),
                    index(
                        doc! { "paymentDetails.transactionId": 1 },
                        "booking_transaction_idx",
                        false,
                    ),
                    index(
                        doc! { "paymentDetails.externalPaymentId": 1 },
                        "booking_external_payment_idx",
                        false,
                    ),
                    index(doc! { "user": 1, "createdAt": -1 }, "booking_user_idx", false),
                ],
                None,
            )
            .await?;

        // Abandoned leases are reaped by MongoDB once they expire.
        let lease_ttl = IndexModel::builder()
            .keys(doc! { "expiresAt": 1 })
            .options(
                IndexOptions::builder()
                    .name("slot_guard_ttl".to_string())
                    .expire_after(Duration::from_secs(0))
                    .build(),
            )
            .build();
        self.guards.create_index(lease_ttl, None).await?;

        tracing::info!("Room booking indexes initialized");
        Ok(())
    }

    fn slot_key(booking: &RoomBooking) -> String {
        format!("{}|{}", booking.room, booking.booking_date)
    }

    /// Take the lease for a room and date. An unexpired lease makes the
    /// upsert collide on `_id`, which is reported as a duplicate key.
    async fn acquire_slot(&self, key: &str) -> Result<String, StoreError> {
        let owner = Uuid::new_v4().to_string();
        let options = FindOneAndUpdateOptions::builder().upsert(true).build();

        for _ in 0..SLOT_ACQUIRE_ATTEMPTS {
            let now = Utc::now().timestamp_millis();
            let expires = now + SLOT_LEASE.as_millis() as i64;
            let result = self
                .guards
                .find_one_and_update(
                    doc! {
                        "_id": key,
                        "expiresAt": { "$lt": mongodb::bson::DateTime::from_millis(now) }
                    },
                    doc! {
                        "$set": {
                            "owner": &owner,
                            "expiresAt": mongodb::bson::DateTime::from_millis(expires)
                        }
                    },
                    options.clone(),
                )
                .await;

            match result {
                Ok(_) => return Ok(owner),
                Err(e) if is_duplicate_key(&e) => {
                    tokio::time::sleep(SLOT_ACQUIRE_BACKOFF).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::SlotBusy(key.to_string()))
    }

    async fn release_slot(&self, key: &str, owner: &str) {
        if let Err(e) = self
            .guards
            .delete_one(doc! { "_id": key, "owner": owner }, None)
            .await
        {
            tracing::warn!(slot = %key, error = %e, "Failed to release booking slot lease");
        }
    }

    /// Bookings on the candidate's room and day that still hold a slot.
    async fn holding_same_day(
        &self,
        candidate: &RoomBooking,
    ) -> Result<Vec<RoomBooking>, StoreError> {
        let cursor = self
            .collection
            .find(
                doc! {
                    "room": &candidate.room,
                    "bookingDate": &candidate.booking_date,
                    "paymentStatus": { "$in": ["pending", "paid"] }
                },
                None,
            )
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn reopen_locked(&self, mut booking: RoomBooking) -> Result<SlotOutcome, StoreError> {
        let same_day = self.holding_same_day(&booking).await?;
        match plan_slot(&same_day, &booking) {
            SlotPlan::Insert => {
                let expected_version = booking.version;
                booking.reopen_payment();
                booking.updated_at = Utc::now();
                let updated = self.replace(booking, expected_version).await?;
                Ok(SlotOutcome::Updated(updated))
            }
            SlotPlan::Refresh(holder) | SlotPlan::Conflict(holder) => {
                Ok(SlotOutcome::Conflict(holder))
            }
        }
    }

    async fn place_locked(&self, candidate: RoomBooking) -> Result<SlotOutcome, StoreError> {
        let same_day = self.holding_same_day(&candidate).await?;

        match plan_slot(&same_day, &candidate) {
            SlotPlan::Insert => {
                self.collection.insert_one(&candidate, None).await?;
                Ok(SlotOutcome::Created(candidate))
            }
            SlotPlan::Refresh(mut existing) => {
                let expected_version = existing.version;
                existing.customer_name = candidate.customer_name;
                existing.customer_phone = candidate.customer_phone;
                existing.customer_email = candidate.customer_email;
                existing.updated_at = candidate.updated_at;
                let updated = self.replace(existing, expected_version).await?;
                Ok(SlotOutcome::Updated(updated))
            }
            SlotPlan::Conflict(existing) => Ok(SlotOutcome::Conflict(existing)),
        }
    }
}

#[async_trait]
impl BookingStore for MongoBookingStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<RoomBooking>, StoreError> {
        Ok(self.collection.find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<RoomBooking>, StoreError> {
        Ok(self
            .collection
            .find_one(payment_reference_filter(reference), None)
            .await?)
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<RoomBooking>, StoreError> {
        let filter = match user_id {
            Some(user_id) => doc! { "user": user_id },
            None => doc! {},
        };
        let cursor = self.collection.find(filter, newest_first(None)).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn place(&self, candidate: RoomBooking) -> Result<SlotOutcome, StoreError> {
        let key = Self::slot_key(&candidate);
        let owner = self.acquire_slot(&key).await?;
        let outcome = self.place_locked(candidate).await;
        self.release_slot(&key, &owner).await;
        outcome
    }

    async fn reopen(&self, booking: RoomBooking) -> Result<SlotOutcome, StoreError> {
        let key = Self::slot_key(&booking);
        let owner = self.acquire_slot(&key).await?;
        let outcome = self.reopen_locked(booking).await;
        self.release_slot(&key, &owner).await;
        outcome
    }

    async fn replace(
        &self,
        mut booking: RoomBooking,
        expected_version: i64,
    ) -> Result<RoomBooking, StoreError> {
        booking.version = expected_version + 1;
        let result = self
            .collection
            .replace_one(
                doc! { "_id": &booking.id, "version": expected_version },
                &booking,
                None,
            )
            .await?;

        if result.matched_count == 0 {
            return Err(StoreError::VersionConflict(booking.id));
        }
        Ok(booking)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = self.collection.delete_one(doc! { "_id": id }, None).await?;
        Ok(result.deleted_count > 0)
    }

    async fn payment_references(&self, limit: i64) -> Result<Vec<PaymentReferences>, StoreError> {
        let cursor = self
            .collection
            .find(doc! {}, newest_first(Some(limit)))
            .await?;
        let bookings: Vec<RoomBooking> = cursor.try_collect().await?;
        Ok(bookings.iter().map(RoomBooking::payment_references).collect())
    }
}

#[derive(Clone)]
pub struct MongoRoomDirectory {
    collection: Collection<Room>,
}

impl MongoRoomDirectory {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("rooms"),
        }
    }
}

#[async_trait]
impl RoomDirectory for MongoRoomDirectory {
    async fn find_room(&self, id: &str) -> Result<Option<Room>, StoreError> {
        Ok(self.collection.find_one(doc! { "_id": id }, None).await?)
    }
}

#[derive(Clone)]
pub struct MongoWebhookLog {
    collection: Collection<UnmatchedWebhook>,
}

impl MongoWebhookLog {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("unmatched_webhooks"),
        }
    }

    pub async fn init_indexes(&self) -> Result<(), StoreError> {
        self.collection
            .create_index(
                index(
                    doc! { "resolvedAt": 1, "receivedAt": 1 },
                    "unmatched_open_idx",
                    false,
                ),
                None,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl WebhookLogStore for MongoWebhookLog {
    async fn record(&self, entry: &UnmatchedWebhook) -> Result<(), StoreError> {
        self.collection.insert_one(entry, None).await?;
        Ok(())
    }

    async fn list_unresolved(&self) -> Result<Vec<UnmatchedWebhook>, StoreError> {
        let options = FindOptions::builder()
            .sort(doc! { "receivedAt": 1 })
            .build();
        let cursor = self
            .collection
            .find(doc! { "resolvedAt": mongodb::bson::Bson::Null }, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn mark_resolved(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.collection
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "resolvedAt": mongodb::bson::to_bson(&at)? } },
                None,
            )
            .await?;
        Ok(())
    }
}
