use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{ApiResponse, CreateBookingRequest, UpdateBookingStatusRequest};
use crate::models::{Caller, RoomBooking};
use crate::startup::AppState;

/// Book a room slot. A caller repeating their own pending request gets the
/// existing booking back with 200.
pub async fn create_room_booking(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RoomBooking>>), AppError> {
    payload.validate()?;

    tracing::info!(
        user_id = %caller.user_id,
        room = %payload.room,
        booking_date = %payload.booking_date,
        start_time = %payload.start_time,
        end_time = %payload.end_time,
        "Creating room booking"
    );

    let saved = state
        .bookings
        .create_room_booking(&caller, payload.into())
        .await?;
    let status = if saved.is_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ApiResponse::ok(saved.into_inner()))))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ApiResponse<Vec<RoomBooking>>>, AppError> {
    let bookings = state.bookings.list_bookings(&caller).await?;
    Ok(Json(ApiResponse::ok(bookings)))
}

pub async fn get_booking(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<RoomBooking>>, AppError> {
    let booking = state.bookings.get_booking(&caller, &id).await?;
    Ok(Json(ApiResponse::ok(booking)))
}

pub async fn update_booking_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(payload): Json<UpdateBookingStatusRequest>,
) -> Result<Json<ApiResponse<RoomBooking>>, AppError> {
    let booking = state
        .bookings
        .update_booking_status(&caller, &id, payload.status)
        .await?;
    Ok(Json(ApiResponse::ok(booking)))
}

pub async fn delete_booking(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    state.bookings.delete_booking(&caller, &id).await?;
    Ok(Json(ApiResponse::ok(json!({ "id": id }))))
}
