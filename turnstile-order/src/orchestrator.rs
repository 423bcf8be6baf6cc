use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn, Span};
use uuid::Uuid;

use turnstile_catalog::TimeSlotLedger;
use turnstile_core::models::{BookingStatus, NewPayment, Payment, PaymentStatus};
use turnstile_core::notify::Notifier;
use turnstile_core::payment::{GatewayOutcome, PaymentGateway, SettlementPolicy, SettlementRequest};
use turnstile_core::repository::LedgerStore;
use turnstile_core::{CoreError, CoreResult};
use turnstile_shared::models::events::PaymentSettledEvent;

use crate::manager::BookingLedger;
use crate::models::{PaymentReceipt, PaymentRequest};

pub struct PaymentProcessor<S: LedgerStore> {
    store: Arc<S>,
    slots: TimeSlotLedger<S>,
    bookings: BookingLedger<S>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    policy: SettlementPolicy,
    span: Span,
}

impl<S: LedgerStore> PaymentProcessor<S> {
    pub fn new(
        store: Arc<S>,
        slots: TimeSlotLedger<S>,
        bookings: BookingLedger<S>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        policy: SettlementPolicy,
        span: Span,
    ) -> Self {
        Self {
            store,
            slots,
            bookings,
            gateway,
            notifier,
            policy,
            span,
        }
    }

    /// Settles a booking's payment and confirms the booking.
    ///
    /// The booking row stays locked from the `AlreadyPaid` check until commit, so concurrent
    /// calls for one booking serialize and only the first settles.
    pub async fn initialize(&self, request: PaymentRequest) -> CoreResult<PaymentReceipt> {
        let (booking_id, amount, payment_method) = validate(request)?;

        let mut tx = self.store.begin().await?;
        let booking = self
            .store
            .lock_booking(&mut tx, booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Booking", booking_id))?;

        if booking.payment_status == PaymentStatus::Completed {
            return Err(CoreError::AlreadyPaid(booking_id));
        }
        if amount != booking.total_amount {
            warn!(
                parent: &self.span,
                %booking_id,
                %amount,
                expected = %booking.total_amount,
                "Payment amount differs from booking total"
            );
        }

        let payment = self
            .store
            .insert_payment(
                &mut tx,
                &NewPayment {
                    transaction_id: Uuid::new_v4(),
                    booking_id,
                    amount,
                    payment_method: payment_method.clone(),
                    status: PaymentStatus::Pending,
                },
            )
            .await?;

        let settlement = SettlementRequest {
            booking_id,
            transaction_id: payment.transaction_id,
            amount,
            payment_method,
            requested_at: Utc::now(),
        };
        match self.gateway.settle(&settlement).await {
            Ok(GatewayOutcome::Settled) => {}
            Ok(GatewayOutcome::Declined { reason }) => {
                warn!(parent: &self.span, %booking_id, %reason, "Payment declined");
                return Err(CoreError::PaymentDeclined(reason));
            }
            Err(e) => return Err(CoreError::TransactionFailure(format!("payment gateway error: {}", e))),
        }

        self.store
            .update_payment_status(&mut tx, payment.id, PaymentStatus::Completed)
            .await?;
        let confirmed = self
            .bookings
            .transition(&mut tx, booking_id, BookingStatus::Confirmed, PaymentStatus::Completed)
            .await?;

        if self.policy == SettlementPolicy::LegacyUnitIncrement {
            self.slots.reserve_existing(&mut tx, &booking.slot_key(), 1).await?;
        }

        self.store.commit(tx).await?;

        let event = PaymentSettledEvent {
            booking_id,
            payment_id: payment.id,
            transaction_id: payment.transaction_id,
            amount,
            timestamp: Utc::now().timestamp(),
        };
        info!(parent: &self.span, event = ?event, "Payment settled");

        if !self.notifier.send_booking_confirmation(&confirmed).await {
            warn!(parent: &self.span, %booking_id, "Booking confirmation was not delivered");
        }

        Ok(PaymentReceipt {
            payment_id: payment.id,
            status: PaymentStatus::Completed,
            transaction_id: payment.transaction_id,
        })
    }

    pub async fn status(&self, payment_id: i64) -> CoreResult<Payment> {
        self.store
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Payment", payment_id))
    }
}

fn validate(request: PaymentRequest) -> CoreResult<(Uuid, Decimal, String)> {
    let method = request
        .payment_method
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());

    let mut missing = Vec::new();
    if request.booking_id.is_none() {
        missing.push("booking_id");
    }
    if request.amount.is_none() {
        missing.push("amount");
    }
    if method.is_none() {
        missing.push("payment_method");
    }

    match (request.booking_id, request.amount, method) {
        (Some(raw_id), Some(amount), Some(method)) => {
            if amount.is_sign_negative() {
                return Err(CoreError::ValidationError("amount cannot be negative".to_string()));
            }
            // Stored as NUMERIC(10,2).
            if amount.normalize().scale() > 2 {
                return Err(CoreError::ValidationError(
                    "amount cannot have more than 2 decimal places".to_string(),
                ));
            }
            if amount >= Decimal::from(100_000_000) {
                return Err(CoreError::ValidationError("amount is too large".to_string()));
            }
            // Ids are generated server side, so anything unparsable cannot exist.
            let booking_id = Uuid::parse_str(raw_id.trim()).map_err(|_| CoreError::not_found("Booking", raw_id))?;
            Ok((booking_id, amount, method))
        }
        _ => Err(CoreError::ValidationError(format!(
            "Missing required fields: {}",
            missing.join(", ")
        ))),
    }
}

/// Settles every request immediately.
pub struct InstantSettlementGateway;

#[async_trait]
impl PaymentGateway for InstantSettlementGateway {
    async fn settle(
        &self,
        _request: &SettlementRequest,
    ) -> Result<GatewayOutcome, Box<dyn std::error::Error + Send + Sync>> {
        Ok(GatewayOutcome::Settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use turnstile_catalog::PricingCatalog;
    use turnstile_core::models::{Booking, PricingSeed, SlotDefaults};
    use turnstile_core::repository::{BookingRepository, PaymentRepository, SlotRepository, Transactional};
    use turnstile_shared::Masked;
    use turnstile_store::MemoryStore;

    use crate::models::{BookingRequest, Count};
    use crate::reservation::ReservationDesk;

    struct CountingNotifier {
        sent: AtomicUsize,
        succeed: bool,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn send_booking_confirmation(&self, _booking: &Booking) -> bool {
            self.sent.fetch_add(1, Ordering::SeqCst);
            self.succeed
        }
    }

    struct DecliningGateway;

    #[async_trait]
    impl PaymentGateway for DecliningGateway {
        async fn settle(
            &self,
            _request: &SettlementRequest,
        ) -> Result<GatewayOutcome, Box<dyn std::error::Error + Send + Sync>> {
            Ok(GatewayOutcome::Declined {
                reason: "insufficient funds".to_string(),
            })
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        desk: ReservationDesk<MemoryStore>,
        processor: PaymentProcessor<MemoryStore>,
        notifier: Arc<CountingNotifier>,
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 11, 20).unwrap()
    }

    fn fixture(gateway: Arc<dyn PaymentGateway>, policy: SettlementPolicy, notifier_succeeds: bool) -> Fixture {
        let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let pricing = PricingSeed::defaults().iter().map(|s| s.starting(today).unwrap()).collect();
        let store = Arc::new(MemoryStore::with_pricing(pricing));

        let slots = TimeSlotLedger::new(store.clone(), SlotDefaults::default(), Span::none());
        let bookings = BookingLedger::new(store.clone(), Span::none());
        let notifier = Arc::new(CountingNotifier {
            sent: AtomicUsize::new(0),
            succeed: notifier_succeeds,
        });

        let desk = ReservationDesk::new(
            store.clone(),
            PricingCatalog::new(store.clone(), Span::none()),
            slots.clone(),
            bookings.clone(),
            Span::none(),
        );
        let processor = PaymentProcessor::new(
            store.clone(),
            slots,
            bookings,
            gateway,
            notifier.clone(),
            policy,
            Span::none(),
        );

        Fixture {
            store,
            desk,
            processor,
            notifier,
        }
    }

    fn instant() -> Fixture {
        fixture(Arc::new(InstantSettlementGateway), SettlementPolicy::StatusOnly, true)
    }

    async fn book(fixture: &Fixture, adults: i64) -> Uuid {
        let request = BookingRequest {
            date: Some("2026-11-20".to_string()),
            nationality: Some("Local".to_string()),
            adults: Some(Count::Number(adults)),
            children: None,
            ticket_type: Some("Regular".to_string()),
            time_slot: Some("10:00 AM".to_string()),
            email: Some(Masked::new("visitor@example.com".to_string())),
        };
        fixture.desk.create_booking(request).await.unwrap().booking_id
    }

    fn pay(booking_id: Uuid, amount: i64) -> PaymentRequest {
        PaymentRequest {
            booking_id: Some(booking_id.to_string()),
            amount: Some(Decimal::from(amount)),
            payment_method: Some("card".to_string()),
        }
    }

    async fn booked_count(fixture: &Fixture) -> i32 {
        fixture.store.slots_for_date(day()).await.unwrap()[0].booked_count
    }

    #[tokio::test]
    async fn test_payment_confirms_booking() {
        let fixture = instant();
        let booking_id = book(&fixture, 2).await;

        let receipt = fixture.processor.initialize(pay(booking_id, 40)).await.unwrap();
        assert_eq!(receipt.status, PaymentStatus::Completed);

        let payment = fixture.processor.status(receipt.payment_id).await.unwrap();
        assert_eq!(payment.booking_id, booking_id);
        assert_eq!(payment.transaction_id, receipt.transaction_id);
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.amount, Decimal::from(40));

        let booking = fixture.store.get_booking(booking_id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.payment_status, PaymentStatus::Completed);

        // Status-only settlement leaves occupancy alone.
        assert_eq!(booked_count(&fixture).await, 2);
        assert_eq!(fixture.notifier.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_payment_is_already_paid_and_changes_nothing() {
        let fixture = instant();
        let booking_id = book(&fixture, 1).await;
        let first = fixture.processor.initialize(pay(booking_id, 20)).await.unwrap();
        let before = fixture.store.get_booking(booking_id).await.unwrap();

        let err = fixture.processor.initialize(pay(booking_id, 20)).await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyPaid(id) if id == booking_id));

        assert_eq!(fixture.store.get_booking(booking_id).await.unwrap(), before);
        assert!(fixture.store.get_payment(first.payment_id + 1).await.unwrap().is_none());
        assert_eq!(booked_count(&fixture).await, 1);
        assert_eq!(fixture.notifier.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_payments_settle_once() {
        let fixture = Arc::new(instant());
        let booking_id = book(&fixture, 1).await;

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let fixture = fixture.clone();
                tokio::spawn(async move { fixture.processor.initialize(pay(booking_id, 20)).await })
            })
            .collect();

        let mut settled = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => settled += 1,
                Err(CoreError::AlreadyPaid(_)) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(settled, 1);
        assert_eq!(fixture.notifier.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_booking_is_not_found() {
        let fixture = instant();
        let err = fixture.processor.initialize(pay(Uuid::new_v4(), 20)).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFoundError { entity: "Booking", .. }));

        let garbage = PaymentRequest {
            booking_id: Some("not-a-booking".to_string()),
            ..pay(Uuid::new_v4(), 20)
        };
        assert!(matches!(
            fixture.processor.initialize(garbage).await,
            Err(CoreError::NotFoundError { .. })
        ));
        assert!(matches!(
            fixture.processor.status(404).await,
            Err(CoreError::NotFoundError { entity: "Payment", .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_fields_are_named() {
        let fixture = instant();
        let err = fixture
            .processor
            .initialize(PaymentRequest {
                booking_id: Some(Uuid::new_v4().to_string()),
                amount: None,
                payment_method: Some(" ".to_string()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(m) if m == "Missing required fields: amount, payment_method"));
    }

    #[tokio::test]
    async fn test_amount_must_fit_money_column() {
        let fixture = instant();
        let booking_id = book(&fixture, 1).await;

        let with_amount = |amount: Decimal| PaymentRequest {
            amount: Some(amount),
            ..pay(booking_id, 0)
        };
        for bad in [Decimal::new(20001, 3), Decimal::from(100_000_000), Decimal::from(-5)] {
            let err = fixture.processor.initialize(with_amount(bad)).await.unwrap_err();
            assert!(matches!(err, CoreError::ValidationError(_)), "{} was accepted", bad);
        }
        let booking = fixture.store.get_booking(booking_id).await.unwrap().unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Pending);

        // Trailing zeros beyond the second place are still a cent amount.
        let receipt = fixture.processor.initialize(with_amount(Decimal::new(20000, 3))).await.unwrap();
        assert_eq!(receipt.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_declined_payment_rolls_back() {
        let fixture = fixture(Arc::new(DecliningGateway), SettlementPolicy::StatusOnly, true);
        let booking_id = book(&fixture, 1).await;

        let err = fixture.processor.initialize(pay(booking_id, 20)).await.unwrap_err();
        assert!(matches!(err, CoreError::PaymentDeclined(_)));

        let booking = fixture.store.get_booking(booking_id).await.unwrap().unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
        assert!(fixture.store.get_payment(1).await.unwrap().is_none());
        assert_eq!(fixture.notifier.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_notifier_failure_keeps_payment() {
        let fixture = fixture(Arc::new(InstantSettlementGateway), SettlementPolicy::StatusOnly, false);
        let booking_id = book(&fixture, 1).await;

        let receipt = fixture.processor.initialize(pay(booking_id, 20)).await.unwrap();
        assert_eq!(fixture.processor.status(receipt.payment_id).await.unwrap().status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_legacy_policy_adds_one_seat() {
        let fixture = fixture(Arc::new(InstantSettlementGateway), SettlementPolicy::LegacyUnitIncrement, true);
        let booking_id = book(&fixture, 3).await;

        fixture.processor.initialize(pay(booking_id, 60)).await.unwrap();
        assert_eq!(booked_count(&fixture).await, 4);
    }

    #[tokio::test]
    async fn test_legacy_policy_rolls_back_on_full_slot() {
        let fixture = fixture(Arc::new(InstantSettlementGateway), SettlementPolicy::LegacyUnitIncrement, true);
        let booking_id = book(&fixture, 50).await;

        let err = fixture.processor.initialize(pay(booking_id, 1000)).await.unwrap_err();
        assert!(matches!(err, CoreError::CapacityExceeded { requested: 1, remaining: 0 }));

        let booking = fixture.store.get_booking(booking_id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert!(fixture.store.get_payment(1).await.unwrap().is_none());
        assert_eq!(booked_count(&fixture).await, 50);
    }

    #[tokio::test]
    async fn test_legacy_policy_requires_slot() {
        let fixture = fixture(Arc::new(InstantSettlementGateway), SettlementPolicy::LegacyUnitIncrement, true);

        // A booking whose slot row was never materialized.
        let orphan = Booking {
            booking_id: Uuid::new_v4(),
            date: day(),
            email: Masked::new("visitor@example.com".to_string()),
            nationality: "Local".to_string(),
            adults: 1,
            children: 0,
            ticket_type: "Regular".to_string(),
            time_slot: "9:00 PM".to_string(),
            total_amount: Decimal::from(20),
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            created_at: Utc::now(),
        };
        let mut tx = fixture.store.begin().await.unwrap();
        fixture.store.insert_booking(&mut tx, &orphan).await.unwrap();
        fixture.store.commit(tx).await.unwrap();

        let err = fixture.processor.initialize(pay(orphan.booking_id, 20)).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFoundError { entity: "TimeSlot", .. }));

        let booking = fixture.store.get_booking(orphan.booking_id).await.unwrap().unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
        assert!(fixture.store.slots_for_date(day()).await.unwrap().is_empty());
    }
}
