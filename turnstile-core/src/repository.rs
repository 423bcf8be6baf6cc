use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{Booking, BookingStatus, NewPayment, Payment, PaymentStatus, Pricing, SlotKey, TimeSlot};
use crate::CoreResult;

/// Unit-of-work boundary shared by every repository of a store.
///
/// A `Tx` that is dropped without being passed to [`Transactional::commit`] is rolled back,
/// together with every row lock it holds. Callers rely on this on every early return.
#[async_trait]
pub trait Transactional: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> CoreResult<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> CoreResult<()>;
}

/// Repository trait for price records
#[async_trait]
pub trait PricingRepository: Send + Sync {
    /// First record for the pair whose interval contains `date`.
    async fn find_pricing(
        &self,
        nationality: &str,
        ticket_type: &str,
        date: NaiveDate,
    ) -> CoreResult<Option<Pricing>>;

    async fn insert_pricing(&self, pricing: &Pricing) -> CoreResult<()>;

    async fn count_pricing(&self) -> CoreResult<i64>;
}

/// Repository trait for slot capacity rows
#[async_trait]
pub trait SlotRepository: Transactional {
    async fn slots_for_date(&self, date: NaiveDate) -> CoreResult<Vec<TimeSlot>>;

    /// Slots with `from <= date <= to`, ordered by date then creation.
    async fn slots_between(&self, from: NaiveDate, to: NaiveDate) -> CoreResult<Vec<TimeSlot>>;

    /// Inserts `defaults` only when `date` has no slot at all, then returns the date's slots.
    async fn create_slots_if_none(&self, date: NaiveDate, defaults: &[TimeSlot]) -> CoreResult<Vec<TimeSlot>>;

    /// Exclusive row lock on an existing slot.
    async fn lock_slot(&self, tx: &mut Self::Tx, key: &SlotKey) -> CoreResult<Option<TimeSlot>>;

    /// Exclusive row lock, inserting an empty slot with `capacity` first when absent.
    async fn lock_or_create_slot(&self, tx: &mut Self::Tx, key: &SlotKey, capacity: i32) -> CoreResult<TimeSlot>;

    /// Requires the row to be locked by `tx`.
    async fn set_booked_count(&self, tx: &mut Self::Tx, key: &SlotKey, booked_count: i32) -> CoreResult<()>;
}

/// Repository trait for bookings
#[async_trait]
pub trait BookingRepository: Transactional {
    async fn insert_booking(&self, tx: &mut Self::Tx, booking: &Booking) -> CoreResult<()>;

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>>;

    /// Exclusive row lock on a committed booking.
    async fn lock_booking(&self, tx: &mut Self::Tx, id: Uuid) -> CoreResult<Option<Booking>>;

    async fn update_booking_status(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        status: BookingStatus,
        payment_status: PaymentStatus,
    ) -> CoreResult<()>;

    /// Newest first.
    async fn bookings_for_date(&self, date: NaiveDate) -> CoreResult<Vec<Booking>>;
}

/// Repository trait for payments
#[async_trait]
pub trait PaymentRepository: Transactional {
    async fn insert_payment(&self, tx: &mut Self::Tx, payment: &NewPayment) -> CoreResult<Payment>;

    async fn update_payment_status(&self, tx: &mut Self::Tx, id: i64, status: PaymentStatus) -> CoreResult<()>;

    async fn get_payment(&self, id: i64) -> CoreResult<Option<Payment>>;
}

/// Everything the booking engine needs from a datastore.
pub trait LedgerStore:
    PricingRepository + SlotRepository + BookingRepository + PaymentRepository + 'static
{
}

impl<T> LedgerStore for T where
    T: PricingRepository + SlotRepository + BookingRepository + PaymentRepository + 'static
{
}
