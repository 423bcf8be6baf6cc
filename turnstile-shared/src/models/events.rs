use uuid::Uuid;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::Masked;

/// Payload handed to the confirmation mailer once a booking is paid.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingConfirmationMessage {
    pub to_email: Masked<String>,
    pub booking_id: Uuid,
    pub booking_details: BookingDetails,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetails {
    pub date: NaiveDate,
    pub time_slot: String,
    pub adults: u32,
    pub children: u32,
    pub amount: Decimal,
}

/// Logged after a payment settles and its booking is confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSettledEvent {
    pub booking_id: Uuid,
    pub payment_id: i64,
    pub transaction_id: Uuid,
    pub amount: Decimal,
    pub timestamp: i64,
}
