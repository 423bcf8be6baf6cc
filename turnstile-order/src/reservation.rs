use std::sync::Arc;
use tracing::{info, Span};

use turnstile_catalog::{PricingCatalog, TimeSlotLedger};
use turnstile_core::repository::LedgerStore;
use turnstile_core::CoreResult;

use crate::manager::BookingLedger;
use crate::models::{BookingReceipt, BookingRequest};

/// Create-booking flow: price, reserve seats, record the booking. The reservation and the
/// booking row share one transaction.
pub struct ReservationDesk<S: LedgerStore> {
    store: Arc<S>,
    pricing: PricingCatalog<S>,
    slots: TimeSlotLedger<S>,
    bookings: BookingLedger<S>,
    span: Span,
}

impl<S: LedgerStore> ReservationDesk<S> {
    pub fn new(
        store: Arc<S>,
        pricing: PricingCatalog<S>,
        slots: TimeSlotLedger<S>,
        bookings: BookingLedger<S>,
        span: Span,
    ) -> Self {
        Self {
            store,
            pricing,
            slots,
            bookings,
            span,
        }
    }

    pub async fn create_booking(&self, request: BookingRequest) -> CoreResult<BookingReceipt> {
        let draft = self.bookings.validate(request)?;
        let quote = self
            .pricing
            .lookup(&draft.nationality, &draft.ticket_type, draft.date)
            .await?;

        let mut tx = self.store.begin().await?;
        let slot = self
            .slots
            .reserve(&mut tx, &draft.slot_key(), draft.visitor_count())
            .await?;
        let booking = self.bookings.create(&mut tx, draft, quote).await?;
        self.store.commit(tx).await?;

        info!(
            parent: &self.span,
            booking_id = %booking.booking_id,
            recipient_domain = booking.email.domain_hint(),
            remaining = slot.remaining(),
            "Reservation committed"
        );

        Ok(BookingReceipt {
            booking_id: booking.booking_id,
            amount: booking.total_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use turnstile_core::models::{BookingStatus, Pricing, PricingSeed, SlotDefaults};
    use turnstile_core::CoreError;
    use turnstile_core::repository::SlotRepository;
    use turnstile_store::MemoryStore;

    use crate::models::Count;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 11, 20).unwrap()
    }

    fn desk(store: Arc<MemoryStore>) -> ReservationDesk<MemoryStore> {
        ReservationDesk::new(
            store.clone(),
            PricingCatalog::new(store.clone(), Span::none()),
            TimeSlotLedger::new(store.clone(), SlotDefaults::default(), Span::none()),
            BookingLedger::new(store, Span::none()),
            Span::none(),
        )
    }

    fn seeded() -> Arc<MemoryStore> {
        let pricing: Vec<Pricing> = PricingSeed::defaults()
            .iter()
            .map(|seed| seed.starting(NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()).unwrap())
            .collect();
        Arc::new(MemoryStore::with_pricing(pricing))
    }

    fn request(nationality: &str, adults: i64, children: i64) -> BookingRequest {
        BookingRequest {
            date: Some("2026-11-20".to_string()),
            nationality: Some(nationality.to_string()),
            adults: Some(Count::Number(adults)),
            children: Some(Count::Number(children)),
            ticket_type: Some("Regular".to_string()),
            time_slot: Some("2:00 PM".to_string()),
            email: Some(turnstile_shared::Masked::new("visitor@example.com".to_string())),
        }
    }

    #[tokio::test]
    async fn test_booking_total_and_seats() {
        let store = seeded();
        let desk = desk(store.clone());

        let receipt = desk.create_booking(request("Foreign", 2, 1)).await.unwrap();
        assert_eq!(receipt.amount, Decimal::from(75));

        let booking = desk.bookings.get_by_id(receipt.booking_id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.time_slot, "2:00 PM");

        let slots = store.slots_for_date(day()).await.unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].booked_count, 3);
    }

    #[tokio::test]
    async fn test_capacity_rejection_creates_no_booking() {
        let store = seeded();
        let desk = desk(store.clone());

        desk.create_booking(request("Local", 48, 0)).await.unwrap();
        let err = desk.create_booking(request("Local", 2, 1)).await.unwrap_err();
        assert!(matches!(err, CoreError::CapacityExceeded { requested: 3, remaining: 2 }));

        assert_eq!(desk.bookings.list_by_date(day()).await.unwrap().len(), 1);
        assert_eq!(store.slots_for_date(day()).await.unwrap()[0].booked_count, 48);
    }

    #[tokio::test]
    async fn test_unpriced_request_reserves_nothing() {
        let store = seeded();
        let desk = desk(store.clone());

        let err = desk.create_booking(request("Martian", 1, 0)).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFoundError { entity: "Pricing", .. }));
        assert!(store.slots_for_date(day()).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_bookings_respect_capacity() {
        let store = seeded();
        let desk = Arc::new(desk(store.clone()));

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let desk = desk.clone();
                tokio::spawn(async move { desk.create_booking(request("Local", 5, 0)).await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(CoreError::CapacityExceeded { remaining, .. }) => assert!(remaining < 5),
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(accepted, 10);
        assert_eq!(store.slots_for_date(day()).await.unwrap()[0].booked_count, 50);
        assert_eq!(desk.bookings.list_by_date(day()).await.unwrap().len(), 10);
    }
}
