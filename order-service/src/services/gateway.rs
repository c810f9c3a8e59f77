//! Payment provider client.
//!
//! Requests are signed with a base64 HMAC-SHA256 over a canonical
//! `Key=Value` list of the request fields. Optional fields that are empty
//! are left out of both the signed string and the body so the signature
//! stays reproducible.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Map, Value};
use service_core::utils::signature::{canonical_field_string, sign_base64, verify_base64};
use uuid::Uuid;

use super::error::ServiceError;
use crate::config::GatewayConfig;
use crate::models::WebhookPayload;

/// Fields needed to open a hosted payment page.
#[derive(Debug, Clone, Default)]
pub struct CreatePaymentRequest {
    pub amount: Decimal,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    /// Local order id or booking id, echoed back by the provider as
    /// `TransactionId`.
    pub transaction_id: String,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub custom1: Option<String>,
}

impl CreatePaymentRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.amount <= Decimal::ZERO {
            return Err(ServiceError::Validation(
                "Amount must be greater than 0".to_string(),
            ));
        }
        for (name, value) in [
            ("firstName", &self.first_name),
            ("lastName", &self.last_name),
            ("phone", &self.phone),
            ("email", &self.email),
            ("orderId", &self.transaction_id),
        ] {
            if value.trim().is_empty() {
                return Err(ServiceError::Validation(format!("{} is required", name)));
            }
        }
        Ok(())
    }
}

/// A request ready to send: ordered fields plus their signature.
#[derive(Debug, Clone)]
pub struct SignedPayment {
    pub fields: Vec<(&'static str, String)>,
    pub signature: String,
}

impl SignedPayment {
    pub fn body(&self) -> Value {
        let body: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
            .collect();
        Value::Object(body)
    }
}

/// `resultObj` of a successful payment creation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPayment {
    pub id: String,
    pub pay_url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderEnvelope {
    result_obj: Option<Value>,
    #[serde(default)]
    has_validation_error: bool,
    error_message: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<CreatedPayment, ServiceError>;

    /// Provider view of a payment, passed through unchanged.
    async fn verify_payment(&self, payment_id: &str) -> Result<Value, ServiceError>;

    /// Whether a webhook's `Authorization` header matches its payload.
    /// Always true when no webhook key is configured.
    fn verify_webhook_signature(&self, payload: &WebhookPayload, signature: Option<&str>)
        -> bool;
}

#[derive(Clone)]
pub struct PaymentGatewayClient {
    client: Client,
    config: GatewayConfig,
}

impl PaymentGatewayClient {
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }

    /// Ordered field list and signature for `request` under `uid`.
    pub fn sign(&self, uid: &str, request: &CreatePaymentRequest) -> Result<SignedPayment, ServiceError> {
        let fields = ordered_fields(uid, &self.config.key_id, request);
        let borrowed: Vec<(&str, Option<&str>)> =
            fields.iter().map(|(k, v)| (*k, Some(v.as_str()))).collect();
        let canonical = canonical_field_string(&borrowed);
        let signature = sign_base64(self.config.secret_key.expose_secret(), &canonical)
            .map_err(|e| ServiceError::PaymentProvider(e.to_string()))?;
        Ok(SignedPayment { fields, signature })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

/// Canonical field order. Empty optionals are dropped here so the body and
/// the signed string always carry the same set.
fn ordered_fields(
    uid: &str,
    key_id: &str,
    request: &CreatePaymentRequest,
) -> Vec<(&'static str, String)> {
    let optional = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let mut fields = vec![
        ("Uid", uid.to_string()),
        ("KeyId", key_id.to_string()),
        ("Amount", format!("{:.2}", request.amount.round_dp(2))),
        ("FirstName", request.first_name.trim().to_string()),
        ("LastName", request.last_name.trim().to_string()),
        ("Phone", request.phone.trim().to_string()),
        ("Email", request.email.trim().to_string()),
    ];
    for (key, value) in [
        ("Street", &request.street),
        ("City", &request.city),
        ("State", &request.state),
        ("Country", &request.country),
        ("PostalCode", &request.postal_code),
    ] {
        if let Some(v) = optional(value) {
            fields.push((key, v));
        }
    }
    fields.push(("TransactionId", request.transaction_id.trim().to_string()));
    if let Some(v) = optional(&request.custom1) {
        fields.push(("Custom1", v));
    }
    fields
}

fn provider_message(envelope: Option<&ProviderEnvelope>, body: &str) -> String {
    envelope
        .and_then(|e| e.error_message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl PaymentGateway for PaymentGatewayClient {
    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<CreatedPayment, ServiceError> {
        request.validate()?;

        let uid = Uuid::new_v4().to_string();
        let signed = self.sign(&uid, request)?;

        let response = self
            .client
            .post(self.url("/api/v1/payments"))
            .header("Authorization", &signed.signature)
            .header("X-Client-Id", &self.config.client_id)
            .json(&signed.body())
            .send()
            .await
            .map_err(|e| ServiceError::PaymentProvider(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::PaymentProvider(e.to_string()))?;

        tracing::debug!(status = %status, transaction_id = %request.transaction_id, "Payment create response");

        let envelope: Option<ProviderEnvelope> = serde_json::from_str(&body).ok();
        if !status.is_success() || envelope.as_ref().map_or(true, |e| e.has_validation_error) {
            let message = provider_message(envelope.as_ref(), &body);
            tracing::error!(
                status = %status,
                transaction_id = %request.transaction_id,
                error = %message,
                "Payment creation rejected by provider"
            );
            return Err(ServiceError::PaymentProvider(message));
        }

        let result = envelope
            .and_then(|e| e.result_obj)
            .ok_or_else(|| ServiceError::PaymentProvider("Missing resultObj".to_string()))?;
        let created: CreatedPayment = serde_json::from_value(result).map_err(|e| {
            ServiceError::PaymentProvider(format!("Malformed resultObj: {}", e))
        })?;

        tracing::info!(
            payment_id = %created.id,
            transaction_id = %request.transaction_id,
            "Provider payment created"
        );
        Ok(created)
    }

    async fn verify_payment(&self, payment_id: &str) -> Result<Value, ServiceError> {
        let response = self
            .client
            .get(self.url(&format!("/api/v1/payments/{}", payment_id)))
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| ServiceError::PaymentVerification(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::PaymentVerification(e.to_string()))?;

        let envelope: Option<ProviderEnvelope> = serde_json::from_str(&body).ok();
        if !status.is_success() {
            let message = provider_message(envelope.as_ref(), &body);
            tracing::warn!(status = %status, payment_id = %payment_id, error = %message, "Payment verification failed");
            return Err(ServiceError::PaymentVerification(message));
        }

        envelope.and_then(|e| e.result_obj).ok_or_else(|| {
            ServiceError::PaymentVerification("Missing resultObj".to_string())
        })
    }

    fn verify_webhook_signature(
        &self,
        payload: &WebhookPayload,
        signature: Option<&str>,
    ) -> bool {
        let Some(key) = self.config.webhook_key.as_ref() else {
            return true;
        };
        let Some(signature) = signature else {
            return false;
        };

        let fields = payload.signed_fields();
        let borrowed: Vec<(&str, Option<&str>)> =
            fields.iter().map(|(k, v)| (*k, v.as_deref())).collect();
        let canonical = canonical_field_string(&borrowed);

        verify_base64(key.expose_secret(), &canonical, signature).unwrap_or(false)
    }
}
