use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;

use turnstile_core::models::DayAvailability;
use turnstile_core::repository::LedgerStore;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes<S: LedgerStore>() -> Router<AppState<S>> {
    Router::new().route("/api/calendar/monthly/{year}/{month}", get(monthly_calendar::<S>))
}

async fn monthly_calendar<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path((year, month)): Path<(String, String)>,
) -> Result<Json<BTreeMap<NaiveDate, DayAvailability>>, AppError> {
    let (Ok(year), Ok(month)) = (year.parse::<i32>(), month.parse::<u32>()) else {
        return Err(AppError::ValidationError("Year and month must be numbers".to_string()));
    };

    let calendar = state.calendar.monthly(year, month, state.today()).await?;
    Ok(Json(calendar))
}
