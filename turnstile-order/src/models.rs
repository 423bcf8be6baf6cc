use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use turnstile_core::models::SlotKey;
use turnstile_core::{CoreError, CoreResult};
use turnstile_shared::Masked;

/// Visitor counts arrive either as JSON numbers or as numeric strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Count {
    Number(i64),
    Text(String),
}

impl Count {
    pub fn parse(&self) -> Option<i64> {
        match self {
            Count::Number(n) => Some(*n),
            Count::Text(s) => s.trim().parse().ok(),
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, Count::Text(s) if s.trim().is_empty())
    }
}

/// Raw create-booking payload; every field may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub date: Option<String>,
    pub nationality: Option<String>,
    pub adults: Option<Count>,
    pub children: Option<Count>,
    pub ticket_type: Option<String>,
    pub time_slot: Option<String>,
    pub email: Option<Masked<String>>,
}

/// A booking request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingDraft {
    pub date: NaiveDate,
    pub email: Masked<String>,
    pub nationality: String,
    pub adults: u32,
    pub children: u32,
    pub ticket_type: String,
    pub time_slot: String,
}

impl BookingDraft {
    pub fn visitor_count(&self) -> i32 {
        (self.adults + self.children) as i32
    }

    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(self.date, self.time_slot.clone(), self.ticket_type.clone())
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn count(value: i64, what: &str) -> CoreResult<u32> {
    if value < 0 {
        return Err(CoreError::ValidationError(format!("Number of {} cannot be negative", what)));
    }
    u32::try_from(value).map_err(|_| CoreError::ValidationError("Invalid visitor numbers".to_string()))
}

impl BookingRequest {
    /// Names of required fields that are absent or empty, in wire spelling.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if present(&self.date).is_none() {
            missing.push("date");
        }
        if present(&self.nationality).is_none() {
            missing.push("nationality");
        }
        if self.adults.as_ref().map_or(true, Count::is_blank) {
            missing.push("adults");
        }
        if present(&self.ticket_type).is_none() {
            missing.push("ticketType");
        }
        if present(&self.time_slot).is_none() {
            missing.push("timeSlot");
        }
        if self.email.as_ref().map_or(true, |e| e.expose().trim().is_empty()) {
            missing.push("email");
        }
        missing
    }

    pub fn into_draft(self) -> CoreResult<BookingDraft> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(CoreError::ValidationError(format!(
                "Missing or empty required fields: {}",
                missing.join(", ")
            )));
        }

        let children = match &self.children {
            None => 0,
            Some(raw) => raw
                .parse()
                .ok_or_else(|| CoreError::ValidationError("Invalid children value".to_string()))?,
        };
        let adults = self
            .adults
            .as_ref()
            .and_then(Count::parse)
            .ok_or_else(|| CoreError::ValidationError("Invalid visitor numbers".to_string()))?;

        let adults = count(adults, "adults")?;
        let children = count(children, "children")?;
        let total = adults
            .checked_add(children)
            .filter(|total| i32::try_from(*total).is_ok())
            .ok_or_else(|| CoreError::ValidationError("Invalid visitor numbers".to_string()))?;
        if total == 0 {
            return Err(CoreError::ValidationError(
                "Total number of visitors must be greater than 0".to_string(),
            ));
        }

        let date = turnstile_core::models::parse_date(present(&self.date).unwrap_or_default())?;

        let field = |value: &Option<String>| present(value).unwrap_or_default().to_string();
        Ok(BookingDraft {
            date,
            email: Masked::new(self.email.as_ref().map(|e| e.expose().trim().to_string()).unwrap_or_default()),
            nationality: field(&self.nationality),
            adults,
            children,
            ticket_type: field(&self.ticket_type),
            time_slot: field(&self.time_slot),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingReceipt {
    pub booking_id: Uuid,
    pub amount: Decimal,
}

/// Raw payment-initialization payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentRequest {
    pub booking_id: Option<String>,
    pub amount: Option<Decimal>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub payment_id: i64,
    pub status: turnstile_core::models::PaymentStatus,
    pub transaction_id: Uuid,
}
