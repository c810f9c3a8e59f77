//! Maps a provider-echoed identifier to the order or booking it belongs to.

use std::sync::Arc;

use super::repository::{BookingStore, OrderStore, StoreError};
use crate::models::order::is_order_id;
use crate::models::{Order, RoomBooking};

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedPaymentTarget {
    Order(Order),
    Booking(RoomBooking),
    NotFound,
}

impl ResolvedPaymentTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolvedPaymentTarget::Order(_) => "order",
            ResolvedPaymentTarget::Booking(_) => "booking",
            ResolvedPaymentTarget::NotFound => "not_found",
        }
    }
}

#[derive(Clone)]
pub struct IdentifierResolver {
    orders: Arc<dyn OrderStore>,
    bookings: Arc<dyn BookingStore>,
}

impl IdentifierResolver {
    pub fn new(orders: Arc<dyn OrderStore>, bookings: Arc<dyn BookingStore>) -> Self {
        Self { orders, bookings }
    }

    /// First match wins, in this order:
    /// order by `orderId` (only for `ORD-` tokens), booking by id, booking by
    /// payment reference, order by payment reference.
    pub async fn resolve(&self, token: &str) -> Result<ResolvedPaymentTarget, StoreError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(ResolvedPaymentTarget::NotFound);
        }

        if is_order_id(token) {
            if let Some(order) = self.orders.find_by_order_id(token).await? {
                return Ok(ResolvedPaymentTarget::Order(order));
            }
        }

        if let Some(booking) = self.bookings.find_by_id(token).await? {
            return Ok(ResolvedPaymentTarget::Booking(booking));
        }

        if let Some(booking) = self.bookings.find_by_payment_reference(token).await? {
            return Ok(ResolvedPaymentTarget::Booking(booking));
        }

        if let Some(order) = self.orders.find_by_payment_reference(token).await? {
            return Ok(ResolvedPaymentTarget::Order(order));
        }

        Ok(ResolvedPaymentTarget::NotFound)
    }

    /// Resolve each key in turn and return the first match.
    pub async fn resolve_any<'a, I>(&self, keys: I) -> Result<ResolvedPaymentTarget, StoreError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for key in keys {
            match self.resolve(key).await? {
                ResolvedPaymentTarget::NotFound => continue,
                found => return Ok(found),
            }
        }
        Ok(ResolvedPaymentTarget::NotFound)
    }
}
