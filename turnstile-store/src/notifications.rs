use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use turnstile_core::models::Booking;
use turnstile_core::notify::Notifier;
use turnstile_shared::models::events::{BookingConfirmationMessage, BookingDetails};

pub fn confirmation_message(booking: &Booking) -> BookingConfirmationMessage {
    BookingConfirmationMessage {
        to_email: booking.email.clone(),
        booking_id: booking.booking_id,
        booking_details: BookingDetails {
            date: booking.date,
            time_slot: booking.time_slot.clone(),
            adults: booking.adults,
            children: booking.children,
            amount: booking.total_amount,
        },
    }
}

/// Records confirmations in the log instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_booking_confirmation(&self, booking: &Booking) -> bool {
        let message = confirmation_message(booking);
        info!(
            booking_id = %message.booking_id,
            recipient_domain = booking.email.domain_hint(),
            date = %message.booking_details.date,
            time_slot = %message.booking_details.time_slot,
            "Booking confirmation queued (log only)"
        );
        true
    }
}

/// Posts a [`BookingConfirmationMessage`] to an external mailer.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_booking_confirmation(&self, booking: &Booking) -> bool {
        let message = confirmation_message(booking);

        match self.client.post(&self.url).json(&message).send().await {
            Ok(response) if response.status().is_success() => {
                info!(booking_id = %booking.booking_id, "Booking confirmation delivered");
                true
            }
            Ok(response) => {
                warn!(booking_id = %booking.booking_id, status = %response.status(), "Mailer rejected booking confirmation");
                false
            }
            Err(e) => {
                warn!(booking_id = %booking.booking_id, error = %e, "Failed to reach mailer");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use turnstile_core::models::{BookingStatus, PaymentStatus};
    use turnstile_shared::Masked;
    use uuid::Uuid;

    fn booking() -> Booking {
        Booking {
            booking_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2026, 12, 24).unwrap(),
            email: Masked::new("visitor@example.com".to_string()),
            nationality: "Foreign".to_string(),
            adults: 2,
            children: 1,
            ticket_type: "Regular".to_string(),
            time_slot: "2:00 PM".to_string(),
            total_amount: Decimal::from(75),
            status: BookingStatus::Confirmed,
            payment_status: PaymentStatus::Completed,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_confirmation_payload_shape() {
        let booking = booking();
        let json = serde_json::to_value(confirmation_message(&booking)).unwrap();
        assert_eq!(json["to_email"], "visitor@example.com");
        assert_eq!(json["booking_id"], booking.booking_id.to_string());
        assert_eq!(json["booking_details"]["date"], "2026-12-24");
        assert_eq!(json["booking_details"]["timeSlot"], "2:00 PM");
        assert_eq!(json["booking_details"]["adults"], 2);
        assert_eq!(json["booking_details"]["children"], 1);
        assert_eq!(json["booking_details"]["amount"], 75.0);
    }

    #[tokio::test]
    async fn test_unreachable_mailer_reports_failure() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/send-confirmation").unwrap();
        assert!(!notifier.send_booking_confirmation(&booking()).await);
    }
}
