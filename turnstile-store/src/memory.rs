use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use turnstile_core::models::{
    Booking, BookingStatus, NewPayment, Payment, PaymentStatus, Pricing, SlotKey, TimeSlot,
};
use turnstile_core::repository::{
    BookingRepository, PaymentRepository, PricingRepository, SlotRepository, Transactional,
};
use turnstile_core::{CoreError, CoreResult};

fn poisoned<T>(_: PoisonError<T>) -> CoreError {
    CoreError::TransactionFailure("in-memory table lock poisoned".to_string())
}

struct SlotRow {
    slot: TimeSlot,
    seq: u64,
    /// Cleared when the transaction that inserted the row rolls back.
    live: bool,
}

type SharedSlot = Arc<Mutex<SlotRow>>;
type SharedBooking = Arc<Mutex<Booking>>;

#[derive(Default)]
struct Tables {
    pricing: RwLock<Vec<Pricing>>,
    slots: RwLock<BTreeMap<SlotKey, SharedSlot>>,
    bookings: RwLock<HashMap<Uuid, SharedBooking>>,
    payments: RwLock<BTreeMap<i64, Payment>>,
    slot_seq: AtomicU64,
    payment_seq: AtomicI64,
}

impl Tables {
    fn next_slot_seq(&self) -> u64 {
        self.slot_seq.fetch_add(1, Ordering::SeqCst)
    }
}

/// Process-local store with per-row async locks.
///
/// Each slot and booking row sits behind its own mutex, so transactions touching different
/// rows never wait on each other. Writes land on the locked row immediately and are undone
/// from a snapshot if the transaction is dropped uncommitted. Inserts are staged in the
/// transaction and published on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pricing(pricing: Vec<Pricing>) -> Self {
        let store = Self::new();
        if let Ok(mut table) = store.tables.pricing.write() {
            table.extend(pricing);
        }
        store
    }

    fn slot_rows(&self, filter: impl Fn(&SlotKey) -> bool) -> CoreResult<Vec<SharedSlot>> {
        let map = self.tables.slots.read().map_err(poisoned)?;
        Ok(map
            .iter()
            .filter(|(key, _)| filter(key))
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn read_slots(rows: Vec<SharedSlot>) -> Vec<TimeSlot> {
        let mut live = Vec::with_capacity(rows.len());
        for row in rows {
            let row = row.lock().await;
            if row.live {
                live.push((row.slot.date, row.seq, row.slot.clone()));
            }
        }
        live.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        live.into_iter().map(|(_, _, slot)| slot).collect()
    }
}

struct HeldSlot {
    key: SlotKey,
    row: SharedSlot,
    guard: OwnedMutexGuard<SlotRow>,
    /// `None` when this transaction inserted the row.
    before: Option<TimeSlot>,
}

struct HeldBooking {
    guard: OwnedMutexGuard<Booking>,
    before: Booking,
}

/// Transaction handle for [`MemoryStore`]. Rolls back on drop unless committed.
pub struct MemoryTx {
    tables: Arc<Tables>,
    slots: Vec<HeldSlot>,
    bookings: Vec<HeldBooking>,
    new_bookings: Vec<Booking>,
    new_payments: Vec<Payment>,
    payment_updates: Vec<(i64, PaymentStatus)>,
    committed: bool,
}

impl MemoryTx {
    fn held_slot(&mut self, key: &SlotKey) -> Option<&mut HeldSlot> {
        self.slots.iter_mut().find(|held| held.key == *key)
    }

    fn held_booking(&mut self, id: Uuid) -> Option<&mut Booking> {
        if let Some(held) = self.bookings.iter_mut().find(|held| held.guard.booking_id == id) {
            return Some(&mut *held.guard);
        }
        self.new_bookings.iter_mut().find(|booking| booking.booking_id == id)
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        for held in self.slots.iter_mut().rev() {
            match &held.before {
                Some(before) => held.guard.slot = before.clone(),
                None => {
                    held.guard.live = false;
                    if let Ok(mut map) = self.tables.slots.write() {
                        let ours = map.get(&held.key).is_some_and(|row| Arc::ptr_eq(row, &held.row));
                        if ours {
                            map.remove(&held.key);
                        }
                    }
                }
            }
        }

        for held in self.bookings.iter_mut() {
            *held.guard = held.before.clone();
        }
    }
}

#[async_trait]
impl Transactional for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> CoreResult<MemoryTx> {
        Ok(MemoryTx {
            tables: self.tables.clone(),
            slots: Vec::new(),
            bookings: Vec::new(),
            new_bookings: Vec::new(),
            new_payments: Vec::new(),
            payment_updates: Vec::new(),
            committed: false,
        })
    }

    async fn commit(&self, mut tx: MemoryTx) -> CoreResult<()> {
        {
            let mut bookings = self.tables.bookings.write().map_err(poisoned)?;
            let mut payments = self.tables.payments.write().map_err(poisoned)?;

            // Validate everything before publishing anything.
            for booking in &tx.new_bookings {
                if bookings.contains_key(&booking.booking_id) {
                    return Err(CoreError::TransactionFailure(format!(
                        "duplicate booking id {}",
                        booking.booking_id
                    )));
                }
            }
            for (id, _) in &tx.payment_updates {
                if !payments.contains_key(id) {
                    return Err(CoreError::not_found("Payment", id));
                }
            }
            for payment in tx.new_payments.iter().filter(|p| p.status == PaymentStatus::Completed) {
                let settled = payments
                    .values()
                    .any(|p| p.booking_id == payment.booking_id && p.status == PaymentStatus::Completed);
                if settled {
                    return Err(CoreError::TransactionFailure(format!(
                        "booking {} already has a completed payment",
                        payment.booking_id
                    )));
                }
            }

            for booking in tx.new_bookings.drain(..) {
                bookings.insert(booking.booking_id, Arc::new(Mutex::new(booking)));
            }
            for payment in tx.new_payments.drain(..) {
                payments.insert(payment.id, payment);
            }
            let now = Utc::now();
            for (id, status) in tx.payment_updates.drain(..) {
                if let Some(payment) = payments.get_mut(&id) {
                    payment.status = status;
                    payment.updated_at = now;
                }
            }
        }

        tx.committed = true;
        Ok(())
    }
}

#[async_trait]
impl PricingRepository for MemoryStore {
    async fn find_pricing(
        &self,
        nationality: &str,
        ticket_type: &str,
        date: NaiveDate,
    ) -> CoreResult<Option<Pricing>> {
        let table = self.tables.pricing.read().map_err(poisoned)?;
        Ok(table
            .iter()
            .find(|p| p.nationality == nationality && p.ticket_type == ticket_type && p.covers(date))
            .cloned())
    }

    async fn insert_pricing(&self, pricing: &Pricing) -> CoreResult<()> {
        self.tables.pricing.write().map_err(poisoned)?.push(pricing.clone());
        Ok(())
    }

    async fn count_pricing(&self) -> CoreResult<i64> {
        Ok(self.tables.pricing.read().map_err(poisoned)?.len() as i64)
    }
}

#[async_trait]
impl SlotRepository for MemoryStore {
    async fn slots_for_date(&self, date: NaiveDate) -> CoreResult<Vec<TimeSlot>> {
        let rows = self.slot_rows(|key| key.date == date)?;
        Ok(Self::read_slots(rows).await)
    }

    async fn slots_between(&self, from: NaiveDate, to: NaiveDate) -> CoreResult<Vec<TimeSlot>> {
        let rows = self.slot_rows(|key| from <= key.date && key.date <= to)?;
        Ok(Self::read_slots(rows).await)
    }

    async fn create_slots_if_none(&self, date: NaiveDate, defaults: &[TimeSlot]) -> CoreResult<Vec<TimeSlot>> {
        loop {
            // Locking every row waits out uncommitted inserts, so only settled rows count.
            let existing = Self::read_slots(self.slot_rows(|key| key.date == date)?).await;
            if !existing.is_empty() {
                return Ok(existing);
            }

            let inserted = {
                let mut map = self.tables.slots.write().map_err(poisoned)?;
                if map.keys().any(|key| key.date == date) {
                    // Another transaction inserted a row since the scan.
                    false
                } else {
                    for slot in defaults {
                        let row = SlotRow {
                            slot: slot.clone(),
                            seq: self.tables.next_slot_seq(),
                            live: true,
                        };
                        map.insert(slot.key(), Arc::new(Mutex::new(row)));
                    }
                    true
                }
            };

            if inserted {
                return self.slots_for_date(date).await;
            }
        }
    }

    async fn lock_slot(&self, tx: &mut MemoryTx, key: &SlotKey) -> CoreResult<Option<TimeSlot>> {
        loop {
            if let Some(held) = tx.held_slot(key) {
                return Ok(Some(held.guard.slot.clone()));
            }

            let row = self.tables.slots.read().map_err(poisoned)?.get(key).cloned();
            let Some(row) = row else {
                return Ok(None);
            };

            let guard = row.clone().lock_owned().await;
            if !guard.live {
                // Inserted by a transaction that rolled back while we waited.
                continue;
            }
            let slot = guard.slot.clone();
            tx.slots.push(HeldSlot {
                key: key.clone(),
                row,
                guard,
                before: Some(slot.clone()),
            });
            return Ok(Some(slot));
        }
    }

    async fn lock_or_create_slot(&self, tx: &mut MemoryTx, key: &SlotKey, capacity: i32) -> CoreResult<TimeSlot> {
        if let Some(held) = tx.held_slot(key) {
            return Ok(held.guard.slot.clone());
        }

        loop {
            let inserted = {
                let mut map = self.tables.slots.write().map_err(poisoned)?;
                if map.contains_key(key) {
                    None
                } else {
                    let row = Arc::new(Mutex::new(SlotRow {
                        slot: TimeSlot::empty(key, capacity),
                        seq: self.tables.next_slot_seq(),
                        live: true,
                    }));
                    let guard = row.clone().try_lock_owned().map_err(|_| {
                        CoreError::TransactionFailure("fresh slot row already locked".to_string())
                    })?;
                    map.insert(key.clone(), row.clone());
                    Some((row, guard))
                }
            };

            if let Some((row, guard)) = inserted {
                let slot = guard.slot.clone();
                tx.slots.push(HeldSlot {
                    key: key.clone(),
                    row,
                    guard,
                    before: None,
                });
                return Ok(slot);
            }

            if let Some(slot) = self.lock_slot(tx, key).await? {
                return Ok(slot);
            }
            // Row vanished between the two lookups, try inserting again.
        }
    }

    async fn set_booked_count(&self, tx: &mut MemoryTx, key: &SlotKey, booked_count: i32) -> CoreResult<()> {
        let held = tx.held_slot(key).ok_or_else(|| {
            CoreError::TransactionFailure(format!("slot {} is not locked by this transaction", key))
        })?;
        held.guard.slot.booked_count = booked_count;
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn insert_booking(&self, tx: &mut MemoryTx, booking: &Booking) -> CoreResult<()> {
        tx.new_bookings.push(booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        let row = self.tables.bookings.read().map_err(poisoned)?.get(&id).cloned();
        match row {
            Some(row) => Ok(Some(row.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn lock_booking(&self, tx: &mut MemoryTx, id: Uuid) -> CoreResult<Option<Booking>> {
        if let Some(booking) = tx.held_booking(id) {
            return Ok(Some(booking.clone()));
        }

        let row = self.tables.bookings.read().map_err(poisoned)?.get(&id).cloned();
        let Some(row) = row else {
            return Ok(None);
        };
        let guard = row.lock_owned().await;
        let booking = guard.clone();
        tx.bookings.push(HeldBooking {
            guard,
            before: booking.clone(),
        });
        Ok(Some(booking))
    }

    async fn update_booking_status(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
        status: BookingStatus,
        payment_status: PaymentStatus,
    ) -> CoreResult<()> {
        if tx.held_booking(id).is_none() && self.lock_booking(tx, id).await?.is_none() {
            return Err(CoreError::not_found("Booking", id));
        }
        if let Some(booking) = tx.held_booking(id) {
            booking.status = status;
            booking.payment_status = payment_status;
        }
        Ok(())
    }

    async fn bookings_for_date(&self, date: NaiveDate) -> CoreResult<Vec<Booking>> {
        let rows: Vec<SharedBooking> = self
            .tables
            .bookings
            .read()
            .map_err(poisoned)?
            .values()
            .cloned()
            .collect();

        let mut bookings = Vec::new();
        for row in rows {
            let booking = row.lock().await;
            if booking.date == date {
                bookings.push(booking.clone());
            }
        }
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn insert_payment(&self, tx: &mut MemoryTx, payment: &NewPayment) -> CoreResult<Payment> {
        let now = Utc::now();
        let row = Payment {
            id: self.tables.payment_seq.fetch_add(1, Ordering::SeqCst) + 1,
            transaction_id: payment.transaction_id,
            booking_id: payment.booking_id,
            amount: payment.amount,
            payment_method: payment.payment_method.clone(),
            status: payment.status,
            created_at: now,
            updated_at: now,
        };
        tx.new_payments.push(row.clone());
        Ok(row)
    }

    async fn update_payment_status(&self, tx: &mut MemoryTx, id: i64, status: PaymentStatus) -> CoreResult<()> {
        if let Some(staged) = tx.new_payments.iter_mut().find(|p| p.id == id) {
            staged.status = status;
            staged.updated_at = Utc::now();
            return Ok(());
        }
        if !self.tables.payments.read().map_err(poisoned)?.contains_key(&id) {
            return Err(CoreError::not_found("Payment", id));
        }
        tx.payment_updates.push((id, status));
        Ok(())
    }

    async fn get_payment(&self, id: i64) -> CoreResult<Option<Payment>> {
        Ok(self.tables.payments.read().map_err(poisoned)?.get(&id).cloned())
    }
}
