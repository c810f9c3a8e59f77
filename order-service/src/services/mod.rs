pub mod bookings;
pub mod cache;
pub mod checkout;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod metrics;
pub mod mongo;
pub mod notifier;
pub mod orders;
pub mod reconciliation;
pub mod repository;
pub mod resolver;

pub use bookings::{BookingService, NewBooking};
pub use cache::{CachedRoomDirectory, TtlCache};
pub use checkout::{CheckoutService, PaymentInitiated};
pub use error::ServiceError;
pub use gateway::{CreatePaymentRequest, PaymentGateway, PaymentGatewayClient};
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{BroadcastNotifier, Notifier};
pub use orders::{NewOrder, OrderService, OrderStatusPatch, PaymentDetailsPatch};
pub use reconciliation::{ReconciliationEngine, ReplayReport, WebhookOutcome};
pub use repository::{BookingStore, OrderStore, RoomDirectory, StoreError, WebhookLogStore};
pub use resolver::{IdentifierResolver, ResolvedPaymentTarget};

use crate::models::{Access, Action, Caller, CapabilityTable};

/// Whether a create call made a new record or refreshed an existing one.
#[derive(Debug, Clone, PartialEq)]
pub enum Saved<T> {
    Created(T),
    Updated(T),
}

impl<T> Saved<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Saved::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Saved::Created(value) | Saved::Updated(value) => value,
        }
    }
}

pub(crate) fn authorize<'a>(
    table: &'a CapabilityTable,
    caller: &Caller,
    action: Action,
) -> Result<&'a Access, ServiceError> {
    let access = table.access(caller.role, action);
    if *access == Access::Denied {
        return Err(ServiceError::Forbidden(format!(
            "{:?} is not permitted for this caller",
            action
        )));
    }
    Ok(access)
}

pub(crate) fn ensure_owner(
    access: &Access,
    caller: &Caller,
    owner_id: &str,
) -> Result<(), ServiceError> {
    if access.permits(caller.owns(owner_id)) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "You can only access your own records".to_string(),
        ))
    }
}
