use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use turnstile_core::models::{
    Booking, BookingStatus, NewPayment, Payment, PaymentStatus, Pricing, SlotKey, TimeSlot,
};
use turnstile_core::repository::{
    BookingRepository, PaymentRepository, PricingRepository, SlotRepository, Transactional,
};
use turnstile_core::{CoreError, CoreResult};
use turnstile_shared::Masked;

/// Unique index that allows a single completed payment per booking.
const ONE_COMPLETED_PAYMENT: &str = "payments_one_completed_per_booking";

fn db_err(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.constraint() == Some(ONE_COMPLETED_PAYMENT) {
            return CoreError::TransactionFailure("booking already has a completed payment".to_string());
        }
    }
    CoreError::TransactionFailure(err.to_string())
}

fn to_i32(value: u32, field: &str) -> CoreResult<i32> {
    i32::try_from(value).map_err(|_| CoreError::ValidationError(format!("{} is too large", field)))
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct PricingRow {
    nationality: String,
    ticket_type: String,
    adult_price: Decimal,
    child_price: Decimal,
    effective_from: NaiveDate,
    effective_to: NaiveDate,
}

impl From<PricingRow> for Pricing {
    fn from(row: PricingRow) -> Self {
        Pricing {
            nationality: row.nationality,
            ticket_type: row.ticket_type,
            adult_price: row.adult_price,
            child_price: row.child_price,
            effective_from: row.effective_from,
            effective_to: row.effective_to,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SlotRow {
    date: NaiveDate,
    slot_time: String,
    ticket_type: String,
    capacity: i32,
    booked_count: i32,
}

impl From<SlotRow> for TimeSlot {
    fn from(row: SlotRow) -> Self {
        TimeSlot {
            date: row.date,
            slot_time: row.slot_time,
            ticket_type: row.ticket_type,
            capacity: row.capacity,
            booked_count: row.booked_count,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    booking_id: Uuid,
    date: NaiveDate,
    email: String,
    nationality: String,
    adults: i32,
    children: i32,
    ticket_type: String,
    time_slot: String,
    total_amount: Decimal,
    status: String,
    payment_status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> CoreResult<Self> {
        let count = |value: i32| {
            u32::try_from(value).map_err(|_| CoreError::TransactionFailure(format!("negative visitor count {}", value)))
        };
        Ok(Booking {
            booking_id: row.booking_id,
            date: row.date,
            email: Masked::new(row.email),
            nationality: row.nationality,
            adults: count(row.adults)?,
            children: count(row.children)?,
            ticket_type: row.ticket_type,
            time_slot: row.time_slot,
            total_amount: row.total_amount,
            status: row.status.parse()?,
            payment_status: row.payment_status.parse()?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    transaction_id: Uuid,
    booking_id: Uuid,
    amount: Decimal,
    payment_method: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = CoreError;

    fn try_from(row: PaymentRow) -> CoreResult<Self> {
        Ok(Payment {
            id: row.id,
            transaction_id: row.transaction_id,
            booking_id: row.booking_id,
            amount: row.amount,
            payment_method: row.payment_method,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SLOT_COLUMNS: &str = "date, slot_time, ticket_type, capacity, booked_count";
const BOOKING_COLUMNS: &str = "booking_id, date, email, nationality, adults, children, ticket_type, \
     time_slot, total_amount, status, payment_status, created_at";
const PAYMENT_COLUMNS: &str =
    "id, transaction_id, booking_id, amount, payment_method, status, created_at, updated_at";

/// Postgres-backed store. Row locks are `SELECT ... FOR UPDATE` inside the caller's transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_slot(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        key: &SlotKey,
    ) -> CoreResult<Option<TimeSlot>> {
        let sql = format!(
            "SELECT {} FROM time_slots WHERE date = $1 AND slot_time = $2 AND ticket_type = $3 FOR UPDATE",
            SLOT_COLUMNS
        );
        let row = sqlx::query_as::<_, SlotRow>(&sql)
            .bind(key.date)
            .bind(&key.slot_time)
            .bind(&key.ticket_type)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(row.map(TimeSlot::from))
    }
}

#[async_trait]
impl Transactional for PgStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> CoreResult<Self::Tx> {
        self.pool.begin().await.map_err(db_err)
    }

    async fn commit(&self, tx: Self::Tx) -> CoreResult<()> {
        tx.commit().await.map_err(db_err)
    }
}

#[async_trait]
impl PricingRepository for PgStore {
    async fn find_pricing(
        &self,
        nationality: &str,
        ticket_type: &str,
        date: NaiveDate,
    ) -> CoreResult<Option<Pricing>> {
        let row = sqlx::query_as::<_, PricingRow>(
            r#"
            SELECT nationality, ticket_type, adult_price, child_price, effective_from, effective_to
            FROM pricing
            WHERE nationality = $1 AND ticket_type = $2
              AND effective_from <= $3 AND effective_to >= $3
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(nationality)
        .bind(ticket_type)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(Pricing::from))
    }

    async fn insert_pricing(&self, pricing: &Pricing) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pricing (nationality, ticket_type, adult_price, child_price, effective_from, effective_to)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&pricing.nationality)
        .bind(&pricing.ticket_type)
        .bind(pricing.adult_price)
        .bind(pricing.child_price)
        .bind(pricing.effective_from)
        .bind(pricing.effective_to)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn count_pricing(&self) -> CoreResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pricing")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }
}

#[async_trait]
impl SlotRepository for PgStore {
    async fn slots_for_date(&self, date: NaiveDate) -> CoreResult<Vec<TimeSlot>> {
        let sql = format!("SELECT {} FROM time_slots WHERE date = $1 ORDER BY id", SLOT_COLUMNS);
        let rows = sqlx::query_as::<_, SlotRow>(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(TimeSlot::from).collect())
    }

    async fn slots_between(&self, from: NaiveDate, to: NaiveDate) -> CoreResult<Vec<TimeSlot>> {
        let sql = format!(
            "SELECT {} FROM time_slots WHERE date BETWEEN $1 AND $2 ORDER BY date, id",
            SLOT_COLUMNS
        );
        let rows = sqlx::query_as::<_, SlotRow>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(TimeSlot::from).collect())
    }

    async fn create_slots_if_none(&self, date: NaiveDate, defaults: &[TimeSlot]) -> CoreResult<Vec<TimeSlot>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM time_slots WHERE date = $1")
            .bind(date)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;

        if existing == 0 {
            for slot in defaults {
                // A concurrent first touch of the same date may insert the same keys.
                sqlx::query(
                    r#"
                    INSERT INTO time_slots (date, slot_time, ticket_type, capacity, booked_count)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (date, slot_time, ticket_type) DO NOTHING
                    "#,
                )
                .bind(slot.date)
                .bind(&slot.slot_time)
                .bind(&slot.ticket_type)
                .bind(slot.capacity)
                .bind(slot.booked_count)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
        }

        tx.commit().await.map_err(db_err)?;
        self.slots_for_date(date).await
    }

    async fn lock_slot(&self, tx: &mut Self::Tx, key: &SlotKey) -> CoreResult<Option<TimeSlot>> {
        self.fetch_slot(tx, key).await
    }

    async fn lock_or_create_slot(&self, tx: &mut Self::Tx, key: &SlotKey, capacity: i32) -> CoreResult<TimeSlot> {
        sqlx::query(
            r#"
            INSERT INTO time_slots (date, slot_time, ticket_type, capacity, booked_count)
            VALUES ($1, $2, $3, $4, 0)
            ON CONFLICT (date, slot_time, ticket_type) DO NOTHING
            "#,
        )
        .bind(key.date)
        .bind(&key.slot_time)
        .bind(&key.ticket_type)
        .bind(capacity)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        self.fetch_slot(tx, key)
            .await?
            .ok_or_else(|| CoreError::TransactionFailure(format!("slot {} vanished after insert", key)))
    }

    async fn set_booked_count(&self, tx: &mut Self::Tx, key: &SlotKey, booked_count: i32) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE time_slots SET booked_count = $4
            WHERE date = $1 AND slot_time = $2 AND ticket_type = $3
            "#,
        )
        .bind(key.date)
        .bind(&key.slot_time)
        .bind(&key.ticket_type)
        .bind(booked_count)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("TimeSlot", key));
        }
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for PgStore {
    async fn insert_booking(&self, tx: &mut Self::Tx, booking: &Booking) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (booking_id, date, email, nationality, adults, children, ticket_type,
                                  time_slot, total_amount, status, payment_status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(booking.booking_id)
        .bind(booking.date)
        .bind(booking.email.expose().as_str())
        .bind(&booking.nationality)
        .bind(to_i32(booking.adults, "adults")?)
        .bind(to_i32(booking.children, "children")?)
        .bind(&booking.ticket_type)
        .bind(&booking.time_slot)
        .bind(booking.total_amount)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.created_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE booking_id = $1", BOOKING_COLUMNS);
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn lock_booking(&self, tx: &mut Self::Tx, id: Uuid) -> CoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE booking_id = $1 FOR UPDATE", BOOKING_COLUMNS);
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn update_booking_status(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        status: BookingStatus,
        payment_status: PaymentStatus,
    ) -> CoreResult<()> {
        let result = sqlx::query("UPDATE bookings SET status = $2, payment_status = $3 WHERE booking_id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(payment_status.as_str())
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Booking", id));
        }
        Ok(())
    }

    async fn bookings_for_date(&self, date: NaiveDate) -> CoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE date = $1 ORDER BY created_at DESC, id DESC",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(Booking::try_from).collect()
    }
}

#[async_trait]
impl PaymentRepository for PgStore {
    async fn insert_payment(&self, tx: &mut Self::Tx, payment: &NewPayment) -> CoreResult<Payment> {
        let sql = format!(
            r#"
            INSERT INTO payments (transaction_id, booking_id, amount, payment_method, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(payment.transaction_id)
            .bind(payment.booking_id)
            .bind(payment.amount)
            .bind(&payment.payment_method)
            .bind(payment.status.as_str())
            .fetch_one(&mut **tx)
            .await
            .map_err(db_err)?;
        Payment::try_from(row)
    }

    async fn update_payment_status(&self, tx: &mut Self::Tx, id: i64, status: PaymentStatus) -> CoreResult<()> {
        let result = sqlx::query("UPDATE payments SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Payment", id));
        }
        Ok(())
    }

    async fn get_payment(&self, id: i64) -> CoreResult<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS);
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(Payment::try_from).transpose()
    }
}
