use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use super::error::ServiceError;
use super::repository::{BookingStore, RoomDirectory, SlotOutcome, StoreError, MAX_WRITE_ATTEMPTS};
use super::{authorize, ensure_owner, Saved};
use crate::models::{
    Action, BookingPaymentDetails, BookingStatus, BookingWindow, Caller, CapabilityTable,
    PaymentStatus, RoomBooking,
};

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub room: String,
    pub booking_date: String,
    pub start_time: String,
    pub end_time: String,
    pub purpose: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: String,
    /// Falls back to the room price.
    pub amount: Option<Decimal>,
}

impl NewBooking {
    fn validate(&self) -> Result<BookingWindow, ServiceError> {
        for (name, value) in [
            ("room", &self.room),
            ("purpose", &self.purpose),
            ("customerName", &self.customer_name),
            ("customerPhone", &self.customer_phone),
            ("customerEmail", &self.customer_email),
        ] {
            if value.trim().is_empty() {
                return Err(ServiceError::Validation(format!("{} is required", name)));
            }
        }
        if self.amount.is_some_and(|a| a < Decimal::ZERO) {
            return Err(ServiceError::Validation(
                "Amount cannot be negative".to_string(),
            ));
        }
        BookingWindow::parse(&self.booking_date, &self.start_time, &self.end_time)
            .map_err(ServiceError::Validation)
    }
}

#[derive(Clone)]
pub struct BookingService {
    bookings: Arc<dyn BookingStore>,
    rooms: Arc<dyn RoomDirectory>,
    capabilities: Arc<CapabilityTable>,
}

impl BookingService {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        rooms: Arc<dyn RoomDirectory>,
        capabilities: Arc<CapabilityTable>,
    ) -> Self {
        Self {
            bookings,
            rooms,
            capabilities,
        }
    }

    /// Book a room slot. A caller re-requesting their own pending slot gets
    /// the existing booking back with refreshed customer details.
    pub async fn create_room_booking(
        &self,
        caller: &Caller,
        data: NewBooking,
    ) -> Result<Saved<RoomBooking>, ServiceError> {
        authorize(&self.capabilities, caller, Action::CreateBooking)?;
        data.validate()?;

        let room = self
            .rooms
            .find_room(&data.room)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Room {} not found", data.room)))?;
        if !room.is_available {
            return Err(ServiceError::Validation(format!(
                "Room {} is not available for booking",
                room.name
            )));
        }

        let now = Utc::now();
        let candidate = RoomBooking {
            id: Uuid::new_v4().to_string(),
            user: caller.user_id.clone(),
            room: room.id.clone(),
            booking_date: data.booking_date.trim().to_string(),
            start_time: data.start_time.trim().to_string(),
            end_time: data.end_time.trim().to_string(),
            purpose: data.purpose,
            status: BookingStatus::Pending,
            customer_name: data.customer_name,
            customer_phone: data.customer_phone,
            customer_email: data.customer_email,
            amount: data.amount.unwrap_or(room.price),
            payment_status: PaymentStatus::Pending,
            payment_details: BookingPaymentDetails::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        };

        for _ in 0..MAX_WRITE_ATTEMPTS {
            match self.bookings.place(candidate.clone()).await {
                Ok(SlotOutcome::Created(booking)) => {
                    tracing::info!(booking_id = %booking.id, room = %booking.room, "Room booking created");
                    return Ok(Saved::Created(booking));
                }
                Ok(SlotOutcome::Updated(booking)) => {
                    tracing::info!(booking_id = %booking.id, "Pending room booking refreshed");
                    return Ok(Saved::Updated(booking));
                }
                Ok(SlotOutcome::Conflict(existing)) => {
                    tracing::info!(
                        room = %existing.room,
                        booking_date = %existing.booking_date,
                        conflicting_booking = %existing.id,
                        "Room booking slot conflict"
                    );
                    return Err(ServiceError::SlotConflict(format!(
                        "Room is already booked from {} to {} on {}",
                        existing.start_time, existing.end_time, existing.booking_date
                    )));
                }
                Err(StoreError::VersionConflict(_)) => continue,
                Err(StoreError::SlotBusy(_)) => {
                    return Err(ServiceError::SlotConflict(
                        "Room is being booked by another request, please retry".to_string(),
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::VersionConflict(candidate.id).into())
    }

    pub async fn get_booking(&self, caller: &Caller, id: &str) -> Result<RoomBooking, ServiceError> {
        let access = authorize(&self.capabilities, caller, Action::GetBooking)?;
        let booking = self.load(id).await?;
        ensure_owner(access, caller, &booking.user)?;
        Ok(booking)
    }

    pub async fn list_bookings(&self, caller: &Caller) -> Result<Vec<RoomBooking>, ServiceError> {
        let access = authorize(&self.capabilities, caller, Action::ListBookings)?;
        let owner = access.is_own_scoped().then_some(caller.user_id.as_str());
        Ok(self.bookings.list(owner).await?)
    }

    /// Operator transitions; allowed whatever the payment state.
    pub async fn update_booking_status(
        &self,
        caller: &Caller,
        id: &str,
        status: BookingStatus,
    ) -> Result<RoomBooking, ServiceError> {
        authorize(&self.capabilities, caller, Action::UpdateBookingStatus)?;
        let booking = self
            .update_with(id, |booking| {
                booking.status = status;
                Ok(())
            })
            .await?;
        tracing::info!(booking_id = %booking.id, status = ?booking.status, "Room booking status updated");
        Ok(booking)
    }

    pub async fn delete_booking(&self, caller: &Caller, id: &str) -> Result<(), ServiceError> {
        let access = authorize(&self.capabilities, caller, Action::DeleteBooking)?;
        let booking = self.load(id).await?;
        ensure_owner(access, caller, &booking.user)?;
        if access.is_own_scoped() && booking.payment_status.is_settled() {
            return Err(ServiceError::Validation(
                "Paid bookings cannot be deleted".to_string(),
            ));
        }

        if !self.bookings.delete(id).await? {
            return Err(ServiceError::NotFound(format!("Booking {} not found", id)));
        }
        tracing::info!(booking_id = %id, user_id = %caller.user_id, "Room booking deleted");
        Ok(())
    }

    pub async fn find_booking(&self, id: &str) -> Result<Option<RoomBooking>, ServiceError> {
        Ok(self.bookings.find_by_id(id).await?)
    }

    /// Make a booking whose payment failed payable again. The slot must
    /// still be free; a booking placed over it meanwhile wins.
    pub async fn reopen_payment(&self, id: &str) -> Result<RoomBooking, ServiceError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let booking = self.load(id).await?;
            if booking.payment_status != PaymentStatus::Failed {
                return Ok(booking);
            }

            match self.bookings.reopen(booking).await {
                Ok(SlotOutcome::Updated(booking)) | Ok(SlotOutcome::Created(booking)) => {
                    tracing::info!(booking_id = %booking.id, "Failed booking payment reopened");
                    return Ok(booking);
                }
                Ok(SlotOutcome::Conflict(existing)) => {
                    tracing::info!(
                        booking_id = %id,
                        conflicting_booking = %existing.id,
                        "Slot was rebooked after payment failed"
                    );
                    return Err(ServiceError::SlotConflict(format!(
                        "Room was booked from {} to {} on {} after this payment failed",
                        existing.start_time, existing.end_time, existing.booking_date
                    )));
                }
                Err(StoreError::VersionConflict(_)) => continue,
                Err(StoreError::SlotBusy(_)) => {
                    return Err(ServiceError::SlotConflict(
                        "Room is being booked by another request, please retry".to_string(),
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::VersionConflict(id.to_string()).into())
    }

    /// Store the provider reference returned when payment was initiated.
    pub async fn attach_payment(
        &self,
        id: &str,
        provider_payment_id: &str,
    ) -> Result<RoomBooking, ServiceError> {
        self.update_with(id, |booking| {
            booking.payment_details.transaction_id = Some(booking.id.clone());
            booking.payment_details.external_payment_id = Some(provider_payment_id.to_string());
            booking.payment_details.payment_method = Some("online".to_string());
            booking.payment_details.amount = Some(booking.amount);
            Ok(())
        })
        .await
    }

    async fn load(&self, id: &str) -> Result<RoomBooking, ServiceError> {
        self.bookings
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {} not found", id)))
    }

    async fn update_with<F>(&self, id: &str, mut change: F) -> Result<RoomBooking, ServiceError>
    where
        F: FnMut(&mut RoomBooking) -> Result<(), ServiceError>,
    {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let current = self.load(id).await?;
            let mut updated = current.clone();
            change(&mut updated)?;
            if updated == current {
                return Ok(current);
            }
            updated.updated_at = Utc::now();

            match self.bookings.replace(updated, current.version).await {
                Ok(booking) => return Ok(booking),
                Err(StoreError::VersionConflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::VersionConflict(id.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, Room};
    use crate::services::memory::{InMemoryBookingStore, InMemoryRoomDirectory};

    async fn service() -> BookingService {
        let rooms = Arc::new(InMemoryRoomDirectory::new());
        rooms
            .upsert(Room {
                id: "room-1".to_string(),
                name: "Boardroom".to_string(),
                capacity: 10,
                price: Decimal::new(7500, 2),
                is_available: true,
            })
            .await;
        rooms
            .upsert(Room {
                id: "room-closed".to_string(),
                name: "Attic".to_string(),
                capacity: 2,
                price: Decimal::ZERO,
                is_available: false,
            })
            .await;
        BookingService::new(
            Arc::new(InMemoryBookingStore::new()),
            rooms,
            Arc::new(CapabilityTable::standard()),
        )
    }

    fn request(start: &str, end: &str, phone: &str) -> NewBooking {
        NewBooking {
            room: "room-1".to_string(),
            booking_date: "2024-01-01".to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            purpose: "Planning".to_string(),
            customer_name: "Ada".to_string(),
            customer_phone: phone.to_string(),
            customer_email: "ada@example.com".to_string(),
            amount: None,
        }
    }

    #[tokio::test]
    async fn same_caller_same_slot_updates_in_place() {
        let service = service().await;
        let caller = Caller::user("u1");
        let Saved::Created(first) = service
            .create_room_booking(&caller, request("10:00", "11:00", "555-0100"))
            .await
            .unwrap()
        else {
            panic!("expected a new booking");
        };
        assert_eq!(first.amount, Decimal::new(7500, 2));

        let Saved::Updated(second) = service
            .create_room_booking(&caller, request("10:00", "11:00", "555-0199"))
            .await
            .unwrap()
        else {
            panic!("expected an in-place update");
        };
        assert_eq!(second.id, first.id);
        assert_eq!(second.customer_phone, "555-0199");
        assert_eq!(service.list_bookings(&caller).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn overlapping_slot_for_other_customer_conflicts() {
        let service = service().await;
        service
            .create_room_booking(&Caller::user("u1"), request("10:00", "11:00", "555"))
            .await
            .unwrap();

        let err = service
            .create_room_booking(&Caller::user("u2"), request("10:30", "11:30", "556"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::SlotConflict(_)));
    }

    #[tokio::test]
    async fn unknown_or_closed_rooms_are_rejected() {
        let service = service().await;
        let caller = Caller::user("u1");

        let mut missing = request("10:00", "11:00", "555");
        missing.room = "room-9".to_string();
        assert!(matches!(
            service.create_room_booking(&caller, missing).await,
            Err(ServiceError::NotFound(_))
        ));

        let mut closed = request("10:00", "11:00", "555");
        closed.room = "room-closed".to_string();
        assert!(matches!(
            service.create_room_booking(&caller, closed).await,
            Err(ServiceError::Validation(_))
        ));

        assert!(matches!(
            service
                .create_room_booking(&caller, request("11:00", "10:00", "555"))
                .await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn status_transitions_are_operator_only() {
        let service = service().await;
        let owner = Caller::user("u1");
        let Saved::Created(booking) = service
            .create_room_booking(&owner, request("10:00", "11:00", "555"))
            .await
            .unwrap()
        else {
            panic!("expected a new booking");
        };

        let err = service
            .update_booking_status(&owner, &booking.id, BookingStatus::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let admin = Caller::user("ops").with_role(Role::Admin);
        let approved = service
            .update_booking_status(&admin, &booking.id, BookingStatus::Approved)
            .await
            .unwrap();
        assert_eq!(approved.status, BookingStatus::Approved);
    }

    #[tokio::test]
    async fn failed_payment_cannot_reclaim_a_rebooked_slot() {
        let service = service().await;
        let admin = Caller::user("ops").with_role(Role::Admin);
        let Saved::Created(first) = service
            .create_room_booking(&Caller::user("u1"), request("10:00", "11:00", "555"))
            .await
            .unwrap()
        else {
            panic!("expected a new booking");
        };
        service
            .update_with(&first.id, |b| {
                b.payment_status = PaymentStatus::Failed;
                Ok(())
            })
            .await
            .unwrap();

        // Free again once the first payment failed.
        service
            .create_room_booking(&Caller::user("u2"), request("10:00", "11:00", "556"))
            .await
            .unwrap();

        let err = service.reopen_payment(&first.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::SlotConflict(_)));
        let stored = service.get_booking(&admin, &first.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn failed_payment_reopens_a_free_slot() {
        let service = service().await;
        let Saved::Created(booking) = service
            .create_room_booking(&Caller::user("u1"), request("10:00", "11:00", "555"))
            .await
            .unwrap()
        else {
            panic!("expected a new booking");
        };
        service
            .update_with(&booking.id, |b| {
                b.payment_status = PaymentStatus::Failed;
                b.payment_details.status = PaymentStatus::Failed;
                Ok(())
            })
            .await
            .unwrap();

        let reopened = service.reopen_payment(&booking.id).await.unwrap();
        assert_eq!(reopened.payment_status, PaymentStatus::Pending);
        assert_eq!(reopened.payment_details.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn only_owner_or_admin_may_delete() {
        let service = service().await;
        let Saved::Created(booking) = service
            .create_room_booking(&Caller::user("u1"), request("10:00", "11:00", "555"))
            .await
            .unwrap()
        else {
            panic!("expected a new booking");
        };

        let err = service
            .delete_booking(&Caller::user("u2"), &booking.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        service
            .delete_booking(&Caller::user("u1"), &booking.id)
            .await
            .unwrap();
        assert!(service.find_booking(&booking.id).await.unwrap().is_none());
    }
}
