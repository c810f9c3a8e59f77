//! Provider webhook payloads and the dead-letter record kept for the ones
//! that could not be applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PaymentStatus;

/// Callback body sent by the payment provider.
///
/// Every field is optional: a malformed callback must still be
/// acknowledged, so validation happens in the reconciliation engine.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct WebhookPayload {
    #[serde(rename = "PaymentId", default)]
    pub payment_id: Option<String>,
    #[serde(rename = "Amount", default)]
    pub amount: Option<Value>,
    #[serde(rename = "StatusId", default)]
    pub status_id: Option<Value>,
    #[serde(rename = "TransactionId", default)]
    pub transaction_id: Option<String>,
    #[serde(rename = "Custom1", default)]
    pub custom1: Option<String>,
    #[serde(rename = "VisaId", default)]
    pub visa_id: Option<String>,
}

impl WebhookPayload {
    pub fn transaction_id(&self) -> Option<&str> {
        non_empty(self.transaction_id.as_deref())
    }

    pub fn payment_id(&self) -> Option<&str> {
        non_empty(self.payment_id.as_deref())
    }

    /// Numeric status code; accepts `2` as well as `"2"`.
    pub fn status_code(&self) -> Option<i64> {
        match self.status_id.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn provider_status(&self) -> ProviderStatus {
        ProviderStatus(self.status_code())
    }

    /// Fields covered by the provider's webhook signature, in signing order.
    pub fn signed_fields(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            ("PaymentId", self.payment_id.clone()),
            ("Amount", self.amount.as_ref().and_then(value_text)),
            ("StatusId", self.status_id.as_ref().and_then(value_text)),
            ("TransactionId", self.transaction_id.clone()),
            ("Custom1", self.custom1.clone()),
            ("VisaId", self.visa_id.clone()),
        ]
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Provider status code as delivered in `StatusId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderStatus(pub Option<i64>);

impl ProviderStatus {
    /// Fixed provider-to-internal mapping. Unknown or missing codes map to
    /// pending.
    ///
    /// Code 7 is pending in the provider contract we integrate against; its
    /// meaning beyond 0 and 1 is undocumented.
    pub fn payment_status(&self) -> PaymentStatus {
        match self.0 {
            Some(0) | Some(1) | Some(7) => PaymentStatus::Pending,
            Some(2) => PaymentStatus::Paid,
            Some(3) | Some(4) | Some(5) | Some(8) => PaymentStatus::Failed,
            Some(6) => PaymentStatus::Refunded,
            _ => PaymentStatus::Pending,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    /// No order or booking carries any of the webhook identifiers.
    Unmatched,
    /// The record matched but could not be written.
    PersistenceFailed,
    /// Signature did not verify.
    InvalidSignature,
}

/// Webhook that was acknowledged but not applied.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedWebhook {
    #[serde(rename = "_id")]
    pub id: String,
    pub payload: WebhookPayload,
    pub reason: UnmatchedReason,
    pub detail: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub received_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
