use chrono::{Local, NaiveDate};
use std::sync::Arc;
use tracing::info_span;

use turnstile_catalog::{CalendarAggregator, PricingCatalog, TimeSlotLedger};
use turnstile_core::notify::Notifier;
use turnstile_core::payment::PaymentGateway;
use turnstile_core::repository::LedgerStore;
use turnstile_order::{BookingLedger, PaymentProcessor, ReservationDesk};
use turnstile_store::app_config::BookingRules;

pub struct AppState<S: LedgerStore> {
    pub reservations: Arc<ReservationDesk<S>>,
    pub payments: Arc<PaymentProcessor<S>>,
    pub pricing: PricingCatalog<S>,
    pub slots: TimeSlotLedger<S>,
    pub bookings: BookingLedger<S>,
    pub calendar: CalendarAggregator<S>,
}

impl<S: LedgerStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            reservations: self.reservations.clone(),
            payments: self.payments.clone(),
            pricing: self.pricing.clone(),
            slots: self.slots.clone(),
            bookings: self.bookings.clone(),
            calendar: self.calendar.clone(),
        }
    }
}

impl<S: LedgerStore> AppState<S> {
    /// Wires every component over one store, each with its own logging span.
    pub fn new(
        store: Arc<S>,
        rules: &BookingRules,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let pricing = PricingCatalog::new(store.clone(), info_span!("pricing_catalog"));
        let slots = TimeSlotLedger::new(store.clone(), rules.slot_defaults(), info_span!("time_slot_ledger"));
        let bookings = BookingLedger::new(store.clone(), info_span!("booking_ledger"));
        let calendar = CalendarAggregator::new(slots.clone(), rules.limited_threshold, info_span!("calendar"));

        let reservations = ReservationDesk::new(
            store.clone(),
            pricing.clone(),
            slots.clone(),
            bookings.clone(),
            info_span!("reservation_desk"),
        );
        let payments = PaymentProcessor::new(
            store,
            slots.clone(),
            bookings.clone(),
            gateway,
            notifier,
            rules.settlement_policy,
            info_span!("payment_processor", policy = ?rules.settlement_policy),
        );

        Self {
            reservations: Arc::new(reservations),
            payments: Arc::new(payments),
            pricing,
            slots,
            bookings,
            calendar,
        }
    }

    /// Venue-local calendar day; decides which dates may be materialized.
    pub fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}
