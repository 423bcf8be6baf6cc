use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayOutcome {
    Settled,
    Declined { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub booking_id: Uuid,
    pub transaction_id: Uuid,
    pub amount: Decimal,
    pub payment_method: String,
    pub requested_at: DateTime<Utc>,
}

/// What settling a payment does to slot occupancy.
///
/// `StatusOnly` leaves `booked_count` alone since the booking already reserved its seats.
/// `LegacyUnitIncrement` adds one more seat to the booking's slot, failing when the slot
/// is full or missing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPolicy {
    #[default]
    StatusOnly,
    LegacyUnitIncrement,
}

/// Settles money for a booking. Runs inside the payment transaction, so a decline
/// or an error leaves no payment behind.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn settle(
        &self,
        request: &SettlementRequest,
    ) -> Result<GatewayOutcome, Box<dyn std::error::Error + Send + Sync>>;
}
