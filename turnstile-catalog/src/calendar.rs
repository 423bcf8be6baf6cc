use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use tracing::{debug, Span};

use turnstile_core::models::{DayAvailability, DayStatus, TimeSlot};
use turnstile_core::repository::SlotRepository;
use turnstile_core::{CoreError, CoreResult};

use crate::inventory::TimeSlotLedger;

/// Day status from its summed slot figures.
pub fn classify(total_available: i64, total_capacity: i64, limited_threshold: i64) -> DayStatus {
    if total_capacity == 0 {
        DayStatus::Unavailable
    } else if total_available <= 0 {
        DayStatus::Full
    } else if total_available <= limited_threshold {
        DayStatus::Limited
    } else {
        DayStatus::Available
    }
}

pub fn summarize(slots: &[TimeSlot], limited_threshold: i64) -> DayAvailability {
    let total_available = slots.iter().map(|s| i64::from(s.remaining())).sum();
    let total_capacity = slots.iter().map(|s| i64::from(s.capacity)).sum();
    DayAvailability {
        status: classify(total_available, total_capacity, limited_threshold),
        slots: slots.iter().map(TimeSlot::availability).collect(),
        total_available,
        total_capacity,
    }
}

fn month_bounds(year: i32, month: u32) -> CoreResult<(NaiveDate, NaiveDate)> {
    let invalid = || CoreError::ValidationError(format!("Invalid month {}-{}", year, month));
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    let last = next.and_then(|d| d.pred_opt()).ok_or_else(invalid)?;
    Ok((first, last))
}

/// Month-at-a-glance view over [`TimeSlotLedger`].
pub struct CalendarAggregator<S> {
    slots: TimeSlotLedger<S>,
    limited_threshold: i64,
    span: Span,
}

impl<S> Clone for CalendarAggregator<S> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            limited_threshold: self.limited_threshold,
            span: self.span.clone(),
        }
    }
}

impl<S: SlotRepository> CalendarAggregator<S> {
    pub fn new(slots: TimeSlotLedger<S>, limited_threshold: i64, span: Span) -> Self {
        Self {
            slots,
            limited_threshold,
            span,
        }
    }

    /// Every day of the month keyed by date. Days from `today` on that have no slots yet are
    /// materialized first; earlier empty days are `unavailable`.
    pub async fn monthly(&self, year: i32, month: u32, today: NaiveDate) -> CoreResult<BTreeMap<NaiveDate, DayAvailability>> {
        let (first, last) = month_bounds(year, month)?;

        let mut by_day: BTreeMap<NaiveDate, Vec<TimeSlot>> = BTreeMap::new();
        for slot in self.slots.slots_between(first, last).await? {
            by_day.entry(slot.date).or_default().push(slot);
        }

        let mut calendar = BTreeMap::new();
        let mut materialized = 0;
        for day in first.iter_days().take_while(|d| *d <= last) {
            let slots = match by_day.remove(&day) {
                Some(slots) => slots,
                None if day >= today => {
                    materialized += 1;
                    self.slots.get_or_create(day).await?
                }
                None => Vec::new(),
            };

            let summary = if slots.is_empty() {
                DayAvailability::unavailable()
            } else {
                summarize(&slots, self.limited_threshold)
            };
            calendar.insert(day, summary);
        }

        debug!(
            parent: &self.span,
            year = first.year(),
            month = first.month(),
            materialized,
            "Built monthly calendar"
        );
        Ok(calendar)
    }
}
