pub mod calendar;
pub mod inventory;
pub mod pricing;

pub use calendar::CalendarAggregator;
pub use inventory::TimeSlotLedger;
pub use pricing::PricingCatalog;
