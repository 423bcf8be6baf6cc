use async_trait::async_trait;

use crate::models::Booking;

/// Outbound confirmation channel. Called after the payment transaction has committed;
/// a `false` return is logged by the caller and never undoes the payment.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_booking_confirmation(&self, booking: &Booking) -> bool;
}
