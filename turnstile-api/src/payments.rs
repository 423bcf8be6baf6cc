use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use turnstile_core::models::Payment;
use turnstile_core::repository::LedgerStore;
use turnstile_order::models::PaymentRequest;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes<S: LedgerStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/api/payments/initialize", post(initialize_payment::<S>))
        .route("/api/payments/{payment_id}/status", get(payment_status::<S>))
}

async fn initialize_payment<S: LedgerStore>(
    State(state): State<AppState<S>>,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::ValidationError(e.body_text()))?;
    let receipt = state.payments.initialize(request).await?;

    Ok(Json(json!({
        "success": true,
        "payment_id": receipt.payment_id,
        "status": receipt.status,
        "transaction_id": receipt.transaction_id,
    })))
}

async fn payment_status<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(payment_id): Path<String>,
) -> Result<Json<Payment>, AppError> {
    let payment_id: i64 = payment_id
        .parse()
        .map_err(|_| AppError::NotFoundError("Payment not found".to_string()))?;
    let payment = state.payments.status(payment_id).await?;
    Ok(Json(payment))
}
