use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use turnstile_core::models::{parse_date, Booking, SlotAvailability, TimeSlot};
use turnstile_core::repository::LedgerStore;
use turnstile_order::models::BookingRequest;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes<S: LedgerStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/api/bookings/create", post(create_booking::<S>))
        .route("/api/bookings/availability/{date}", get(check_availability::<S>))
        .route("/api/bookings", get(list_bookings::<S>))
        .route("/api/bookings/{booking_id}", get(get_booking::<S>))
}

async fn create_booking<S: LedgerStore>(
    State(state): State<AppState<S>>,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::ValidationError(e.body_text()))?;
    let receipt = state.reservations.create_booking(request).await?;

    Ok(Json(json!({
        "success": true,
        "booking_id": receipt.booking_id,
        "amount": receipt.amount,
    })))
}

async fn check_availability<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(date): Path<String>,
) -> Result<Json<Vec<SlotAvailability>>, AppError> {
    let date = parse_date(&date)?;
    let slots = state.slots.availability(date, state.today()).await?;
    Ok(Json(slots))
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

async fn list_bookings<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, AppError> {
    let raw = query
        .date
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| AppError::ValidationError("Date parameter is required".to_string()))?;
    let date = parse_date(&raw)?;

    let slots: Vec<SlotAvailability> = state
        .slots
        .get_or_create(date)
        .await?
        .iter()
        .map(TimeSlot::availability)
        .collect();
    let bookings = state.bookings.list_by_date(date).await?;

    Ok(Json(json!({
        "date": date,
        "slots": slots,
        "bookings": bookings,
    })))
}

async fn get_booking<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(booking_id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let booking_id = Uuid::parse_str(&booking_id)
        .map_err(|_| AppError::NotFoundError("Booking not found".to_string()))?;
    let booking = state.bookings.get_by_id(booking_id).await?;
    Ok(Json(booking))
}
