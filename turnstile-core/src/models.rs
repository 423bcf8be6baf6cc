use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use turnstile_shared::Masked;

use crate::CoreError;

/// Wire and storage format for every calendar date.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_date(raw: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| CoreError::ValidationError("Invalid date format. Use YYYY-MM-DD".to_string()))
}

// ============================================================================
// Time slots
// ============================================================================

/// Natural key of a bookable slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub slot_time: String,
    pub ticket_type: String,
}

impl SlotKey {
    pub fn new(date: NaiveDate, slot_time: impl Into<String>, ticket_type: impl Into<String>) -> Self {
        Self {
            date,
            slot_time: slot_time.into(),
            ticket_type: ticket_type.into(),
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.date.format(DATE_FORMAT), self.slot_time, self.ticket_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub date: NaiveDate,
    pub slot_time: String,
    pub ticket_type: String,
    pub capacity: i32,
    pub booked_count: i32,
}

impl TimeSlot {
    pub fn empty(key: &SlotKey, capacity: i32) -> Self {
        Self {
            date: key.date,
            slot_time: key.slot_time.clone(),
            ticket_type: key.ticket_type.clone(),
            capacity,
            booked_count: 0,
        }
    }

    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.date, self.slot_time.clone(), self.ticket_type.clone())
    }

    pub fn remaining(&self) -> i32 {
        self.capacity - self.booked_count
    }

    pub fn availability(&self) -> SlotAvailability {
        SlotAvailability {
            slot_time: self.slot_time.clone(),
            ticket_type: self.ticket_type.clone(),
            available: self.remaining(),
            capacity: self.capacity,
            booked: self.booked_count,
        }
    }
}

/// Read-only projection of a slot for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAvailability {
    #[serde(rename = "time")]
    pub slot_time: String,
    pub ticket_type: String,
    pub available: i32,
    pub capacity: i32,
    pub booked: i32,
}

/// Shape of the slots materialized for a date nobody has touched yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDefaults {
    pub capacity: i32,
    pub ticket_type: String,
    pub slot_times: Vec<String>,
}

impl Default for SlotDefaults {
    fn default() -> Self {
        Self {
            capacity: 50,
            ticket_type: "Regular".to_string(),
            slot_times: vec!["10:00 AM".to_string(), "2:00 PM".to_string()],
        }
    }
}

impl SlotDefaults {
    pub fn slots_for(&self, date: NaiveDate) -> Vec<TimeSlot> {
        self.slot_times
            .iter()
            .map(|time| TimeSlot::empty(&SlotKey::new(date, time.clone(), self.ticket_type.clone()), self.capacity))
            .collect()
    }
}

// ============================================================================
// Pricing
// ============================================================================

/// A date-ranged price record. Both interval ends are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub nationality: String,
    pub ticket_type: String,
    pub adult_price: Decimal,
    pub child_price: Decimal,
    pub effective_from: NaiveDate,
    pub effective_to: NaiveDate,
}

impl Pricing {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.effective_from <= date && date <= self.effective_to
    }

    pub fn quote(&self) -> PriceQuote {
        PriceQuote {
            adult_price: self.adult_price,
            child_price: self.child_price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub adult_price: Decimal,
    pub child_price: Decimal,
}

impl PriceQuote {
    pub fn total_for(&self, adults: u32, children: u32) -> Decimal {
        self.adult_price * Decimal::from(adults) + self.child_price * Decimal::from(children)
    }
}

/// Price record inserted at startup when the pricing table is empty.
/// Effective from the seeding day for `valid_days` days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingSeed {
    pub nationality: String,
    pub ticket_type: String,
    pub adult_price: Decimal,
    pub child_price: Decimal,
    #[serde(default = "default_valid_days")]
    pub valid_days: i64,
}

fn default_valid_days() -> i64 {
    365
}

impl PricingSeed {
    pub fn defaults() -> Vec<PricingSeed> {
        vec![
            PricingSeed {
                nationality: "Local".to_string(),
                ticket_type: "Regular".to_string(),
                adult_price: Decimal::from(20),
                child_price: Decimal::from(10),
                valid_days: default_valid_days(),
            },
            PricingSeed {
                nationality: "Foreign".to_string(),
                ticket_type: "Regular".to_string(),
                adult_price: Decimal::from(30),
                child_price: Decimal::from(15),
                valid_days: default_valid_days(),
            },
        ]
    }

    /// Price record valid from `today` for `valid_days` days.
    pub fn starting(&self, today: NaiveDate) -> Result<Pricing, CoreError> {
        let invalid = || {
            CoreError::ValidationError(format!(
                "pricing seed {}/{} has invalid valid_days {}",
                self.nationality, self.ticket_type, self.valid_days
            ))
        };
        if self.valid_days < 0 {
            return Err(invalid());
        }
        let effective_to = TimeDelta::try_days(self.valid_days)
            .and_then(|span| today.checked_add_signed(span))
            .ok_or_else(invalid)?;

        Ok(Pricing {
            nationality: self.nationality.clone(),
            ticket_type: self.ticket_type.clone(),
            adult_price: self.adult_price,
            child_price: self.child_price,
            effective_from: today,
            effective_to,
        })
    }
}

// ============================================================================
// Bookings & payments
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            other => Err(CoreError::TransactionFailure(format!("unknown booking status '{}'", other))),
        }
    }
}

/// Shared by a booking's `payment_status` and a payment row's `status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            other => Err(CoreError::TransactionFailure(format!("unknown payment status '{}'", other))),
        }
    }
}

/// One visit request against one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub booking_id: Uuid,
    pub date: NaiveDate,
    pub email: Masked<String>,
    pub nationality: String,
    pub adults: u32,
    pub children: u32,
    pub ticket_type: String,
    pub time_slot: String,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn visitor_count(&self) -> i32 {
        (self.adults + self.children) as i32
    }

    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(self.date, self.time_slot.clone(), self.ticket_type.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "payment_id")]
    pub id: i64,
    pub transaction_id: Uuid,
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub payment_method: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A payment row before the store has assigned its id.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub transaction_id: Uuid,
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub payment_method: String,
    pub status: PaymentStatus,
}

// ============================================================================
// Calendar
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DayStatus {
    Available,
    Limited,
    Full,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAvailability {
    pub status: DayStatus,
    pub slots: Vec<SlotAvailability>,
    pub total_available: i64,
    pub total_capacity: i64,
}

impl DayAvailability {
    pub fn unavailable() -> Self {
        Self {
            status: DayStatus::Unavailable,
            slots: Vec::new(),
            total_available: 0,
            total_capacity: 0,
        }
    }
}
