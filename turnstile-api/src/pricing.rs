use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use turnstile_core::models::{parse_date, PriceQuote};
use turnstile_core::repository::LedgerStore;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes<S: LedgerStore>() -> Router<AppState<S>> {
    Router::new().route("/api/pricing", get(get_pricing::<S>))
}

#[derive(Debug, Deserialize)]
struct PricingQuery {
    nationality: Option<String>,
    #[serde(rename = "ticketType")]
    ticket_type: Option<String>,
    date: Option<String>,
}

async fn get_pricing<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<PricingQuery>,
) -> Result<Json<PriceQuote>, AppError> {
    let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(nationality), Some(ticket_type), Some(date)) =
        (present(query.nationality), present(query.ticket_type), present(query.date))
    else {
        return Err(AppError::ValidationError("Missing required parameters".to_string()));
    };

    let date = parse_date(&date)?;
    let quote = state.pricing.lookup(&nationality, &ticket_type, date).await?;
    Ok(Json(quote))
}
