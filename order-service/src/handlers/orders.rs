use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{ApiResponse, CreateOrderRequest, UpdateOrderStatusRequest};
use crate::models::{Caller, Order};
use crate::services::NewOrder;
use crate::startup::AppState;

/// Create an order, or resubmit one the caller created earlier.
/// Answers 201 for a new order and 200 for a resubmission.
pub async fn create_order(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Order>>), AppError> {
    payload.validate()?;
    let data = NewOrder::try_from(payload)?;

    tracing::info!(
        user_id = %caller.user_id,
        order_id = ?data.order_id,
        order_type = ?data.order_type,
        items = data.items.len(),
        "Creating order"
    );

    let saved = state.orders.create_order(&caller, data).await?;
    let status = if saved.is_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ApiResponse::ok(saved.into_inner()))))
}

pub async fn list_orders(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ApiResponse<Vec<Order>>>, AppError> {
    let orders = state.orders.list_orders(&caller).await?;
    Ok(Json(ApiResponse::ok(orders)))
}

pub async fn get_order(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<Order>>, AppError> {
    let order = state.orders.get_order(&caller, &order_id).await?;
    Ok(Json(ApiResponse::ok(order)))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_id): Path<String>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<Order>>, AppError> {
    payload.validate()?;

    tracing::info!(
        order_id = %order_id,
        user_id = %caller.user_id,
        order_status = ?payload.order_status,
        payment_status = ?payload.payment_status,
        "Updating order status"
    );

    let order = state
        .orders
        .update_order_status(&caller, &order_id, payload.into())
        .await?;
    Ok(Json(ApiResponse::ok(order)))
}
