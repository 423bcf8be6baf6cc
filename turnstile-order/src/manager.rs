use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, Span};
use uuid::Uuid;

use turnstile_core::models::{Booking, BookingStatus, PaymentStatus, PriceQuote};
use turnstile_core::repository::BookingRepository;
use turnstile_core::{CoreError, CoreResult};

use crate::models::{BookingDraft, BookingRequest};

/// Manages booking records and their lifecycle.
pub struct BookingLedger<S> {
    store: Arc<S>,
    span: Span,
}

impl<S> Clone for BookingLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            span: self.span.clone(),
        }
    }
}

impl<S: BookingRepository> BookingLedger<S> {
    pub fn new(store: Arc<S>, span: Span) -> Self {
        Self { store, span }
    }

    pub fn validate(&self, request: BookingRequest) -> CoreResult<BookingDraft> {
        request.into_draft()
    }

    /// Persists a pending booking priced with `quote`.
    ///
    /// Call only after the slot reservation for the same visitors succeeded inside `tx`.
    pub async fn create(&self, tx: &mut S::Tx, draft: BookingDraft, quote: PriceQuote) -> CoreResult<Booking> {
        let booking = Booking {
            booking_id: Uuid::new_v4(),
            total_amount: quote.total_for(draft.adults, draft.children),
            date: draft.date,
            email: draft.email,
            nationality: draft.nationality,
            adults: draft.adults,
            children: draft.children,
            ticket_type: draft.ticket_type,
            time_slot: draft.time_slot,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            created_at: Utc::now(),
        };

        self.store.insert_booking(tx, &booking).await?;
        info!(
            parent: &self.span,
            booking_id = %booking.booking_id,
            slot = %booking.slot_key(),
            visitors = booking.visitor_count(),
            total = %booking.total_amount,
            "Booking created"
        );
        Ok(booking)
    }

    /// Only `(pending, pending) -> (confirmed, completed)` is legal.
    pub async fn transition(
        &self,
        tx: &mut S::Tx,
        booking_id: Uuid,
        status: BookingStatus,
        payment_status: PaymentStatus,
    ) -> CoreResult<Booking> {
        let booking = self
            .store
            .lock_booking(tx, booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Booking", booking_id))?;

        let from = (booking.status, booking.payment_status);
        let to = (status, payment_status);
        let legal = from == (BookingStatus::Pending, PaymentStatus::Pending)
            && to == (BookingStatus::Confirmed, PaymentStatus::Completed);
        if !legal {
            return Err(CoreError::InvalidState {
                from: format!("{}/{}", from.0, from.1),
                to: format!("{}/{}", to.0, to.1),
            });
        }

        self.store
            .update_booking_status(tx, booking_id, status, payment_status)
            .await?;

        Ok(Booking {
            status,
            payment_status,
            ..booking
        })
    }

    pub async fn get_by_id(&self, booking_id: Uuid) -> CoreResult<Booking> {
        self.store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Booking", booking_id))
    }

    /// Newest first.
    pub async fn list_by_date(&self, date: NaiveDate) -> CoreResult<Vec<Booking>> {
        self.store.bookings_for_date(date).await
    }
}
