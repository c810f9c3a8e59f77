//! In-memory stores used by tests and local runs without MongoDB.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::repository::{
    BookingStore, OrderStore, RoomDirectory, SlotOutcome, StoreError, WebhookLogStore,
};
use crate::models::{
    plan_slot, Order, PaymentReferences, Room, RoomBooking, SlotPlan, UnmatchedWebhook,
};

fn matches_reference(
    transaction_id: Option<&str>,
    external_payment_id: Option<&str>,
    reference: &str,
) -> bool {
    transaction_id == Some(reference) || external_payment_id == Some(reference)
}

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<String, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.order_id) {
            return Err(StoreError::DuplicateKey(order.order_id.clone()));
        }
        orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(order_id).cloned())
    }

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, StoreError> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|o| {
                matches_reference(
                    o.payment_details.transaction_id.as_deref(),
                    o.payment_details.external_payment_id.as_deref(),
                    reference,
                )
            })
            .cloned())
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().await;
        let mut list: Vec<Order> = orders
            .values()
            .filter(|o| user_id.map_or(true, |u| o.user.user_id == u))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn replace(&self, mut order: Order, expected_version: i64) -> Result<Order, StoreError> {
        let mut orders = self.orders.write().await;
        match orders.get(&order.order_id) {
            Some(current) if current.version == expected_version => {
                order.version = expected_version + 1;
                orders.insert(order.order_id.clone(), order.clone());
                Ok(order)
            }
            _ => Err(StoreError::VersionConflict(order.order_id)),
        }
    }

    async fn payment_references(&self, limit: i64) -> Result<Vec<PaymentReferences>, StoreError> {
        let mut list = self.list(None).await?;
        list.truncate(limit.max(0) as usize);
        Ok(list.iter().map(Order::payment_references).collect())
    }
}

#[derive(Default)]
pub struct InMemoryBookingStore {
    bookings: RwLock<HashMap<String, RoomBooking>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<RoomBooking>, StoreError> {
        Ok(self.bookings.read().await.get(id).cloned())
    }

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<RoomBooking>, StoreError> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .values()
            .find(|b| {
                matches_reference(
                    b.payment_details.transaction_id.as_deref(),
                    b.payment_details.external_payment_id.as_deref(),
                    reference,
                )
            })
            .cloned())
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<RoomBooking>, StoreError> {
        let bookings = self.bookings.read().await;
        let mut list: Vec<RoomBooking> = bookings
            .values()
            .filter(|b| user_id.map_or(true, |u| b.user == u))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn place(&self, candidate: RoomBooking) -> Result<SlotOutcome, StoreError> {
        // The write lock spans check and insert.
        let mut bookings = self.bookings.write().await;
        let same_day: Vec<RoomBooking> = bookings
            .values()
            .filter(|b| b.room == candidate.room && b.booking_date == candidate.booking_date)
            .cloned()
            .collect();

        match plan_slot(&same_day, &candidate) {
            SlotPlan::Insert => {
                bookings.insert(candidate.id.clone(), candidate.clone());
                Ok(SlotOutcome::Created(candidate))
            }
            SlotPlan::Refresh(mut existing) => {
                existing.customer_name = candidate.customer_name;
                existing.customer_phone = candidate.customer_phone;
                existing.customer_email = candidate.customer_email;
                existing.updated_at = candidate.updated_at;
                existing.version += 1;
                bookings.insert(existing.id.clone(), existing.clone());
                Ok(SlotOutcome::Updated(existing))
            }
            SlotPlan::Conflict(existing) => Ok(SlotOutcome::Conflict(existing)),
        }
    }

    async fn reopen(&self, mut booking: RoomBooking) -> Result<SlotOutcome, StoreError> {
        let mut bookings = self.bookings.write().await;
        match bookings.get(&booking.id) {
            Some(current) if current.version == booking.version => {}
            _ => return Err(StoreError::VersionConflict(booking.id)),
        }
        let same_day: Vec<RoomBooking> = bookings
            .values()
            .filter(|b| b.room == booking.room && b.booking_date == booking.booking_date)
            .cloned()
            .collect();

        match plan_slot(&same_day, &booking) {
            SlotPlan::Insert => {
                booking.reopen_payment();
                booking.updated_at = Utc::now();
                booking.version += 1;
                bookings.insert(booking.id.clone(), booking.clone());
                Ok(SlotOutcome::Updated(booking))
            }
            SlotPlan::Refresh(holder) | SlotPlan::Conflict(holder) => {
                Ok(SlotOutcome::Conflict(holder))
            }
        }
    }

    async fn replace(
        &self,
        mut booking: RoomBooking,
        expected_version: i64,
    ) -> Result<RoomBooking, StoreError> {
        let mut bookings = self.bookings.write().await;
        match bookings.get(&booking.id) {
            Some(current) if current.version == expected_version => {
                booking.version = expected_version + 1;
                bookings.insert(booking.id.clone(), booking.clone());
                Ok(booking)
            }
            _ => Err(StoreError::VersionConflict(booking.id)),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.bookings.write().await.remove(id).is_some())
    }

    async fn payment_references(&self, limit: i64) -> Result<Vec<PaymentReferences>, StoreError> {
        let mut list = self.list(None).await?;
        list.truncate(limit.max(0) as usize);
        Ok(list.iter().map(RoomBooking::payment_references).collect())
    }
}

#[derive(Default)]
pub struct InMemoryRoomDirectory {
    rooms: RwLock<HashMap<String, Room>>,
}

impl InMemoryRoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, room: Room) {
        self.rooms.write().await.insert(room.id.clone(), room);
    }
}

#[async_trait]
impl RoomDirectory for InMemoryRoomDirectory {
    async fn find_room(&self, id: &str) -> Result<Option<Room>, StoreError> {
        Ok(self.rooms.read().await.get(id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryWebhookLog {
    entries: RwLock<Vec<UnmatchedWebhook>>,
}

impl InMemoryWebhookLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookLogStore for InMemoryWebhookLog {
    async fn record(&self, entry: &UnmatchedWebhook) -> Result<(), StoreError> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_unresolved(&self) -> Result<Vec<UnmatchedWebhook>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.resolved_at.is_none())
            .cloned()
            .collect())
    }

    async fn mark_resolved(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.resolved_at = Some(at);
        }
        Ok(())
    }
}
