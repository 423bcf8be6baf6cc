use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, Span};

use turnstile_core::models::{PriceQuote, PricingSeed};
use turnstile_core::repository::PricingRepository;
use turnstile_core::{CoreError, CoreResult};

/// Resolves date-ranged price records.
pub struct PricingCatalog<S> {
    store: Arc<S>,
    span: Span,
}

impl<S> Clone for PricingCatalog<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            span: self.span.clone(),
        }
    }
}

impl<S: PricingRepository> PricingCatalog<S> {
    pub fn new(store: Arc<S>, span: Span) -> Self {
        Self { store, span }
    }

    /// Per-visitor prices for `date`. When several records overlap, the store's first match wins.
    pub async fn lookup(&self, nationality: &str, ticket_type: &str, date: NaiveDate) -> CoreResult<PriceQuote> {
        if nationality.trim().is_empty() || ticket_type.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "nationality and ticket type are required".to_string(),
            ));
        }

        let pricing = self
            .store
            .find_pricing(nationality, ticket_type, date)
            .await?
            .ok_or_else(|| {
                debug!(parent: &self.span, nationality, ticket_type, %date, "No pricing covers date");
                CoreError::not_found("Pricing", format!("{}/{} on {}", nationality, ticket_type, date))
            })?;

        Ok(pricing.quote())
    }

    /// Inserts `seeds` starting at `today`, only when no price record exists yet.
    pub async fn seed_if_empty(&self, seeds: &[PricingSeed], today: NaiveDate) -> CoreResult<usize> {
        if self.store.count_pricing().await? > 0 {
            return Ok(0);
        }
        let records = seeds
            .iter()
            .map(|seed| seed.starting(today))
            .collect::<CoreResult<Vec<_>>>()?;
        for pricing in &records {
            self.store.insert_pricing(pricing).await?;
        }
        info!(parent: &self.span, records = records.len(), "Seeded pricing table");
        Ok(records.len())
    }
}
