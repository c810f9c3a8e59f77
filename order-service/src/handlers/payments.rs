use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use serde_json::Value;
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{ApiResponse, CreatePaymentBody, WebhookAck};
use crate::models::{Action, Caller, UnmatchedWebhook, WebhookPayload};
use crate::services::metrics::record_webhook;
use crate::services::{authorize, PaymentInitiated, ReplayReport};
use crate::startup::AppState;

pub async fn create_payment(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<CreatePaymentBody>,
) -> Result<Json<ApiResponse<PaymentInitiated>>, AppError> {
    payload.validate()?;

    tracing::info!(
        user_id = %caller.user_id,
        order_id = %payload.order_id,
        amount = %payload.amount,
        "Initiating payment"
    );

    let initiated = state
        .checkout
        .initiate_payment(&caller, payload.into())
        .await?;
    Ok(Json(ApiResponse::ok(initiated)))
}

/// Provider lookup, returned as the provider sent it.
pub async fn verify_payment(
    State(state): State<AppState>,
    caller: Caller,
    Path(payment_id): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let result = state.checkout.verify_payment(&caller, &payment_id).await?;
    Ok(Json(ApiResponse::ok(result)))
}

/// Provider callback. Always acknowledged so the provider stops retrying;
/// anything that could not be applied is kept in the dead-letter log.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<WebhookAck> {
    let signature = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());

    match serde_json::from_slice::<WebhookPayload>(&body) {
        Ok(payload) => {
            state.reconciliation.handle_webhook(payload, signature).await;
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                body = %String::from_utf8_lossy(&body),
                "Malformed webhook body"
            );
            record_webhook("malformed");
        }
    }

    Json(WebhookAck { received: true })
}

pub async fn list_unmatched(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ApiResponse<Vec<UnmatchedWebhook>>>, AppError> {
    authorize(&state.capabilities, &caller, Action::ViewReconciliation)?;
    let entries = state
        .reconciliation
        .unmatched()
        .await
        .map_err(|e| AppError::DatabaseError(e.into()))?;
    Ok(Json(ApiResponse::ok(entries)))
}

pub async fn replay_unmatched(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ApiResponse<ReplayReport>>, AppError> {
    authorize(&state.capabilities, &caller, Action::ReplayReconciliation)?;
    tracing::info!(user_id = %caller.user_id, "Replaying unmatched webhooks");
    let report = state
        .reconciliation
        .replay_unmatched()
        .await
        .map_err(|e| AppError::DatabaseError(e.into()))?;
    Ok(Json(ApiResponse::ok(report)))
}
