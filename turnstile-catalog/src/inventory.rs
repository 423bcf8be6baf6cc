use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, warn, Span};

use turnstile_core::models::{SlotAvailability, SlotDefaults, SlotKey, TimeSlot};
use turnstile_core::repository::SlotRepository;
use turnstile_core::{CoreError, CoreResult};

/// Owns slot capacity. Every mutation of `booked_count` goes through [`TimeSlotLedger::reserve`]
/// or [`TimeSlotLedger::reserve_existing`], both of which hold the slot's row lock for the
/// check and the write.
pub struct TimeSlotLedger<S> {
    store: Arc<S>,
    defaults: SlotDefaults,
    span: Span,
}

impl<S> Clone for TimeSlotLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            defaults: self.defaults.clone(),
            span: self.span.clone(),
        }
    }
}

impl<S: SlotRepository> TimeSlotLedger<S> {
    pub fn new(store: Arc<S>, defaults: SlotDefaults, span: Span) -> Self {
        Self { store, defaults, span }
    }

    pub fn defaults(&self) -> &SlotDefaults {
        &self.defaults
    }

    /// Slots for `date`, materializing the default set on first touch.
    pub async fn get_or_create(&self, date: NaiveDate) -> CoreResult<Vec<TimeSlot>> {
        let slots = self.store.slots_for_date(date).await?;
        if !slots.is_empty() {
            return Ok(slots);
        }

        debug!(parent: &self.span, %date, "Materializing default slots");
        self.store
            .create_slots_if_none(date, &self.defaults.slots_for(date))
            .await
    }

    /// Locks the slot (creating it with default capacity when absent) and adds `count` visitors.
    ///
    /// On `CapacityExceeded` nothing has been written; the caller drops `tx` to release the lock.
    pub async fn reserve(&self, tx: &mut S::Tx, key: &SlotKey, count: i32) -> CoreResult<TimeSlot> {
        check_count(count)?;
        let slot = self
            .store
            .lock_or_create_slot(tx, key, self.defaults.capacity)
            .await?;
        self.apply(tx, slot, count).await
    }

    /// Like [`TimeSlotLedger::reserve`] but fails with `NotFound` instead of creating the slot.
    pub async fn reserve_existing(&self, tx: &mut S::Tx, key: &SlotKey, count: i32) -> CoreResult<TimeSlot> {
        check_count(count)?;
        let slot = self
            .store
            .lock_slot(tx, key)
            .await?
            .ok_or_else(|| CoreError::not_found("TimeSlot", key))?;
        self.apply(tx, slot, count).await
    }

    async fn apply(&self, tx: &mut S::Tx, slot: TimeSlot, count: i32) -> CoreResult<TimeSlot> {
        let remaining = slot.remaining();
        if count > remaining {
            warn!(parent: &self.span, slot = %slot.key(), requested = count, remaining, "Reservation rejected");
            return Err(CoreError::CapacityExceeded {
                requested: count,
                remaining: remaining.max(0),
            });
        }

        let booked_count = slot.booked_count + count;
        self.store.set_booked_count(tx, &slot.key(), booked_count).await?;
        debug!(parent: &self.span, slot = %slot.key(), booked_count, capacity = slot.capacity, "Seats reserved");

        Ok(TimeSlot { booked_count, ..slot })
    }

    /// Read-only projection of `date`'s slots. Dates before `today` are never materialized.
    pub async fn availability(&self, date: NaiveDate, today: NaiveDate) -> CoreResult<Vec<SlotAvailability>> {
        let slots = if date >= today {
            self.get_or_create(date).await?
        } else {
            self.store.slots_for_date(date).await?
        };
        Ok(slots.iter().map(TimeSlot::availability).collect())
    }

    pub async fn slots_between(&self, from: NaiveDate, to: NaiveDate) -> CoreResult<Vec<TimeSlot>> {
        self.store.slots_between(from, to).await
    }
}

fn check_count(count: i32) -> CoreResult<()> {
    if count <= 0 {
        return Err(CoreError::ValidationError(format!(
            "visitor count must be positive, got {}",
            count
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use turnstile_core::repository::Transactional;
    use turnstile_store::MemoryStore;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 11, 14).unwrap()
    }

    fn ledger() -> TimeSlotLedger<MemoryStore> {
        TimeSlotLedger::new(Arc::new(MemoryStore::new()), SlotDefaults::default(), Span::none())
    }

    fn morning() -> SlotKey {
        SlotKey::new(day(), "10:00 AM", "Regular")
    }

    async fn reserve_once(ledger: &TimeSlotLedger<MemoryStore>, key: &SlotKey, count: i32) -> CoreResult<TimeSlot> {
        let mut tx = ledger.store.begin().await?;
        let slot = ledger.reserve(&mut tx, key, count).await?;
        ledger.store.commit(tx).await?;
        Ok(slot)
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let ledger = ledger();
        let first = ledger.get_or_create(day()).await.unwrap();
        let second = ledger.get_or_create(day()).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second, first);
        assert_eq!(first[0].slot_time, "10:00 AM");
        assert_eq!(first[1].slot_time, "2:00 PM");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_touch_creates_two_slots() {
        let ledger = ledger();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.get_or_create(day()).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), 2);
        }
        assert_eq!(ledger.store.slots_for_date(day()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reserve_creates_missing_slot() {
        let ledger = ledger();
        let key = SlotKey::new(day(), "4:00 PM", "VIP");
        let slot = reserve_once(&ledger, &key, 4).await.unwrap();
        assert_eq!(slot.capacity, 50);
        assert_eq!(slot.booked_count, 4);
    }

    #[tokio::test]
    async fn test_rejection_reports_remaining_and_writes_nothing() {
        let ledger = ledger();
        reserve_once(&ledger, &morning(), 48).await.unwrap();

        let err = reserve_once(&ledger, &morning(), 3).await.unwrap_err();
        assert!(matches!(err, CoreError::CapacityExceeded { requested: 3, remaining: 2 }));

        let slots = ledger.store.slots_for_date(day()).await.unwrap();
        assert_eq!(slots[0].booked_count, 48);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_requests_fill_slot_exactly() {
        let ledger = ledger();
        reserve_once(&ledger, &morning(), 48).await.unwrap();

        let three = {
            let ledger = ledger.clone();
            tokio::spawn(async move { reserve_once(&ledger, &morning(), 3).await })
        };
        let two = {
            let ledger = ledger.clone();
            tokio::spawn(async move { reserve_once(&ledger, &morning(), 2).await })
        };

        let three = three.await.unwrap();
        let two = two.await.unwrap();

        assert_eq!(two.unwrap().booked_count, 50);
        // Whichever ran first, 3 never fits: 2 remained before and 0 after.
        match three.unwrap_err() {
            CoreError::CapacityExceeded { requested, remaining } => {
                assert_eq!(requested, 3);
                assert!(remaining == 2 || remaining == 0);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let slots = ledger.store.slots_for_date(day()).await.unwrap();
        assert_eq!(slots[0].booked_count, 50);
    }

    #[tokio::test]
    async fn test_reserve_existing_requires_slot() {
        let ledger = ledger();
        let mut tx = ledger.store.begin().await.unwrap();
        let err = ledger.reserve_existing(&mut tx, &morning(), 1).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFoundError { entity: "TimeSlot", .. }));
    }

    #[tokio::test]
    async fn test_non_positive_count_is_rejected() {
        let ledger = ledger();
        let mut tx = ledger.store.begin().await.unwrap();
        assert!(matches!(
            ledger.reserve(&mut tx, &morning(), 0).await,
            Err(CoreError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_availability_skips_past_dates() {
        let ledger = ledger();
        let today = day();
        let yesterday = today.pred_opt().unwrap();

        assert!(ledger.availability(yesterday, today).await.unwrap().is_empty());
        assert!(ledger.store.slots_for_date(yesterday).await.unwrap().is_empty());

        let slots = ledger.availability(today, today).await.unwrap();
        assert_eq!(slots.len(), 2);
        assert!(slots.iter().all(|s| s.available == 50 && s.booked == 0));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_concurrent_reservations_never_overbook(
            capacity in 1i32..40,
            requests in prop::collection::vec(1i32..12, 1..16),
        ) {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();

            let (accepted, rejected, booked) = runtime.block_on(async {
                let defaults = SlotDefaults { capacity, ..SlotDefaults::default() };
                let ledger = TimeSlotLedger::new(Arc::new(MemoryStore::new()), defaults, Span::none());

                let handles: Vec<_> = requests
                    .iter()
                    .map(|&count| {
                        let ledger = ledger.clone();
                        tokio::spawn(async move { (count, reserve_once(&ledger, &morning(), count).await) })
                    })
                    .collect();

                let mut accepted = 0;
                let mut rejected = Vec::new();
                for handle in handles {
                    match handle.await.unwrap() {
                        (count, Ok(_)) => accepted += count,
                        (count, Err(CoreError::CapacityExceeded { requested, remaining })) => {
                            assert_eq!(requested, count);
                            rejected.push((requested, remaining));
                        }
                        (_, Err(other)) => panic!("unexpected error: {:?}", other),
                    }
                }
                // Absent when every request was rejected and the slot insert rolled back.
                let booked = ledger
                    .store
                    .slots_for_date(day())
                    .await
                    .unwrap()
                    .first()
                    .map_or(0, |slot| slot.booked_count);
                (accepted, rejected, booked)
            });

            prop_assert!(booked <= capacity);
            prop_assert_eq!(booked, accepted);
            for (requested, remaining) in rejected {
                prop_assert!(requested > remaining);
                prop_assert!(remaining >= capacity - booked);
            }
        }
    }
}
