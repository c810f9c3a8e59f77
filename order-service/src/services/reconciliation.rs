//! Applies provider webhooks to orders and bookings.
//!
//! Every update is read, merge, compare-and-swap on `version`, retried on
//! conflict. A webhook whose effect is already visible on the record is not
//! written again, so redelivery changes nothing.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use super::gateway::PaymentGateway;
use super::metrics::record_webhook;
use super::notifier::{notify_order, Notifier, ORDER_STATUS_CHANGE_EVENT};
use super::repository::{
    BookingStore, OrderStore, StoreError, WebhookLogStore, MAX_WRITE_ATTEMPTS,
};
use super::resolver::{IdentifierResolver, ResolvedPaymentTarget};
use crate::models::{
    Order, PaymentStatus, RoomBooking, UnmatchedReason, UnmatchedWebhook, WebhookPayload,
};

/// How many recent records to log when a webhook matches nothing.
const DIAGNOSTIC_SNAPSHOT: i64 = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Applied {
        target: &'static str,
        id: String,
        status: PaymentStatus,
    },
    AlreadyApplied {
        target: &'static str,
        id: String,
        status: PaymentStatus,
    },
    /// Missing transaction identifier.
    Rejected(String),
    Unmatched,
    InvalidSignature,
    /// Matched but could not be persisted.
    Failed(String),
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied { .. } => "applied",
            WebhookOutcome::AlreadyApplied { .. } => "already_applied",
            WebhookOutcome::Rejected(_) => "rejected",
            WebhookOutcome::Unmatched => "unmatched",
            WebhookOutcome::InvalidSignature => "invalid_signature",
            WebhookOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub examined: usize,
    pub resolved: usize,
    pub still_unmatched: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    resolver: IdentifierResolver,
    orders: Arc<dyn OrderStore>,
    bookings: Arc<dyn BookingStore>,
    webhook_log: Arc<dyn WebhookLogStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
}

impl ReconciliationEngine {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        bookings: Arc<dyn BookingStore>,
        webhook_log: Arc<dyn WebhookLogStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            resolver: IdentifierResolver::new(orders.clone(), bookings.clone()),
            orders,
            bookings,
            webhook_log,
            gateway,
            notifier,
        }
    }

    /// Handle one provider callback. Never fails: every problem is logged,
    /// and anything that was not applied lands in the dead-letter log.
    pub async fn handle_webhook(
        &self,
        payload: WebhookPayload,
        signature: Option<&str>,
    ) -> WebhookOutcome {
        let outcome = if !self.gateway.verify_webhook_signature(&payload, signature) {
            tracing::warn!(
                transaction_id = ?payload.transaction_id,
                payment_id = ?payload.payment_id,
                "Webhook signature mismatch"
            );
            self.dead_letter(&payload, UnmatchedReason::InvalidSignature, None)
                .await;
            WebhookOutcome::InvalidSignature
        } else {
            match self.apply(&payload).await {
                Ok(WebhookOutcome::Unmatched) => {
                    self.log_candidates(&payload).await;
                    self.dead_letter(&payload, UnmatchedReason::Unmatched, None)
                        .await;
                    WebhookOutcome::Unmatched
                }
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(
                        payload = ?payload,
                        error = %e,
                        "Failed to persist webhook update"
                    );
                    self.dead_letter(
                        &payload,
                        UnmatchedReason::PersistenceFailed,
                        Some(e.to_string()),
                    )
                    .await;
                    WebhookOutcome::Failed(e.to_string())
                }
            }
        };

        record_webhook(outcome.label());
        tracing::info!(
            outcome = outcome.label(),
            transaction_id = ?payload.transaction_id,
            status_id = ?payload.status_code(),
            "Webhook processed"
        );
        outcome
    }

    /// Resolve the target and merge the webhook into it.
    pub async fn apply(&self, payload: &WebhookPayload) -> Result<WebhookOutcome, StoreError> {
        let Some(transaction_id) = payload.transaction_id() else {
            tracing::warn!(payload = ?payload, "Webhook without transaction id");
            return Ok(WebhookOutcome::Rejected(
                "Missing transaction identifier".to_string(),
            ));
        };
        let status = payload.provider_status().payment_status();

        let mut keys = vec![transaction_id];
        if let Some(payment_id) = payload.payment_id().filter(|p| *p != transaction_id) {
            keys.push(payment_id);
        }

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let result = match self.resolver.resolve_any(keys.clone()).await? {
                ResolvedPaymentTarget::Order(order) => {
                    self.apply_to_order(order, payload, status).await
                }
                ResolvedPaymentTarget::Booking(booking) => {
                    self.apply_to_booking(booking, payload, status).await
                }
                ResolvedPaymentTarget::NotFound => return Ok(WebhookOutcome::Unmatched),
            };

            match result {
                Err(StoreError::VersionConflict(id)) => {
                    tracing::debug!(record = %id, attempt, "Concurrent update, retrying webhook merge");
                }
                other => return other,
            }
        }

        Err(StoreError::VersionConflict(transaction_id.to_string()))
    }

    async fn apply_to_order(
        &self,
        order: Order,
        payload: &WebhookPayload,
        status: PaymentStatus,
    ) -> Result<WebhookOutcome, StoreError> {
        let expected_version = order.version;
        let Some(merged) = merge_order(&order, payload, status, Utc::now()) else {
            return Ok(WebhookOutcome::AlreadyApplied {
                target: "order",
                id: order.order_id,
                status,
            });
        };

        let written = self.orders.replace(merged, expected_version).await?;
        tracing::info!(
            order_id = %written.order_id,
            payment_status = %written.payment_status,
            "Order payment reconciled"
        );

        if matches!(status, PaymentStatus::Paid | PaymentStatus::Failed) {
            notify_order(self.notifier.as_ref(), ORDER_STATUS_CHANGE_EVENT, &written);
        }

        Ok(WebhookOutcome::Applied {
            target: "order",
            id: written.order_id,
            status,
        })
    }

    async fn apply_to_booking(
        &self,
        booking: RoomBooking,
        payload: &WebhookPayload,
        status: PaymentStatus,
    ) -> Result<WebhookOutcome, StoreError> {
        let expected_version = booking.version;
        let Some(merged) = merge_booking(&booking, payload, status, Utc::now()) else {
            return Ok(WebhookOutcome::AlreadyApplied {
                target: "booking",
                id: booking.id,
                status,
            });
        };

        let written = self.bookings.replace(merged, expected_version).await?;
        tracing::info!(
            booking_id = %written.id,
            payment_status = %written.payment_status,
            "Booking payment reconciled"
        );

        Ok(WebhookOutcome::Applied {
            target: "booking",
            id: written.id,
            status,
        })
    }

    /// Re-run every open dead-letter entry; entries that now apply are
    /// marked resolved. Signature failures are never replayed.
    pub async fn replay_unmatched(&self) -> Result<ReplayReport, StoreError> {
        let mut report = ReplayReport::default();

        for entry in self.webhook_log.list_unresolved().await? {
            report.examined += 1;
            if entry.reason == UnmatchedReason::InvalidSignature {
                report.skipped += 1;
                continue;
            }

            match self.apply(&entry.payload).await {
                Ok(WebhookOutcome::Applied { .. }) | Ok(WebhookOutcome::AlreadyApplied { .. }) => {
                    self.webhook_log.mark_resolved(&entry.id, Utc::now()).await?;
                    report.resolved += 1;
                }
                Ok(WebhookOutcome::Unmatched) => report.still_unmatched += 1,
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(entry_id = %entry.id, error = %e, "Replay failed");
                    report.still_unmatched += 1;
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            resolved = report.resolved,
            still_unmatched = report.still_unmatched,
            "Unmatched webhook replay finished"
        );
        Ok(report)
    }

    pub async fn unmatched(&self) -> Result<Vec<UnmatchedWebhook>, StoreError> {
        self.webhook_log.list_unresolved().await
    }

    async fn log_candidates(&self, payload: &WebhookPayload) {
        let orders = self.orders.payment_references(DIAGNOSTIC_SNAPSHOT).await;
        let bookings = self.bookings.payment_references(DIAGNOSTIC_SNAPSHOT).await;
        tracing::warn!(
            transaction_id = ?payload.transaction_id,
            payment_id = ?payload.payment_id,
            order_candidates = ?orders.unwrap_or_default(),
            booking_candidates = ?bookings.unwrap_or_default(),
            "Webhook matched no order or booking"
        );
    }

    async fn dead_letter(
        &self,
        payload: &WebhookPayload,
        reason: UnmatchedReason,
        detail: Option<String>,
    ) {
        let entry = UnmatchedWebhook {
            id: Uuid::new_v4().to_string(),
            payload: payload.clone(),
            reason,
            detail,
            received_at: Utc::now(),
            resolved_at: None,
        };
        if let Err(e) = self.webhook_log.record(&entry).await {
            tracing::error!(payload = ?payload, error = %e, "Failed to record unmatched webhook");
        }
    }
}

fn webhook_amount(payload: &WebhookPayload) -> Option<Decimal> {
    match payload.amount.as_ref()? {
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// The order with the webhook merged in, or `None` when nothing changes.
/// `user` and every field the webhook does not carry are kept.
pub fn merge_order(
    order: &Order,
    payload: &WebhookPayload,
    status: PaymentStatus,
    now: DateTime<Utc>,
) -> Option<Order> {
    let mut merged = order.clone();
    merged.payment_status = status;
    merged.payment_details.status = status;
    if let Some(transaction_id) = payload.transaction_id() {
        merged.payment_details.transaction_id = Some(transaction_id.to_string());
    }
    if let Some(payment_id) = payload.payment_id() {
        merged.payment_details.external_payment_id = Some(payment_id.to_string());
    }
    if status == PaymentStatus::Paid {
        if let Some(amount) = webhook_amount(payload) {
            merged.payment_details.amount_paid = amount;
        }
    }

    if merged == *order {
        return None;
    }
    merged.payment_details.payment_date = Some(now);
    merged.updated_at = now;
    Some(merged)
}

/// The booking with the webhook merged in, or `None` when nothing changes.
/// The paid amount always mirrors the booking amount.
pub fn merge_booking(
    booking: &RoomBooking,
    payload: &WebhookPayload,
    status: PaymentStatus,
    now: DateTime<Utc>,
) -> Option<RoomBooking> {
    let mut merged = booking.clone();
    merged.payment_status = status;
    merged.payment_details.status = status;
    if let Some(transaction_id) = payload.transaction_id() {
        merged.payment_details.transaction_id = Some(transaction_id.to_string());
    }
    if let Some(payment_id) = payload.payment_id() {
        merged.payment_details.external_payment_id = Some(payment_id.to_string());
    }
    merged.payment_details.payment_method = Some("online".to_string());
    merged.payment_details.amount = Some(booking.amount);

    if merged == *booking {
        return None;
    }
    merged.payment_details.payment_date = Some(now);
    merged.updated_at = now;
    Some(merged)
}
