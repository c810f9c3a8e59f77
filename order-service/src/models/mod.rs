pub mod booking;
pub mod capability;
pub mod order;
pub mod room;
pub mod webhook;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use booking::{
    plan_slot, BookingPaymentDetails, BookingStatus, BookingWindow, RoomBooking, SlotPlan,
};
pub use capability::{Access, Action, Caller, CapabilityTable, OrderField, Role};
pub use order::{
    CookingStatus, Order, OrderItem, OrderPaymentDetails, OrderStatus, OrderType, OrderUser,
    PaymentMethod, PaymentReferences,
};
pub use room::Room;
pub use webhook::{ProviderStatus, UnmatchedReason, UnmatchedWebhook, WebhookPayload};

/// Payment state shared by orders and room bookings.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Paid and refunded payments lock the record against customer edits.
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Refunded)
    }

    /// Statuses that hold a booking slot.
    pub fn holds_slot(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Paid)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
