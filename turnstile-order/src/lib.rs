pub mod manager;
pub mod models;
pub mod orchestrator;
pub mod reservation;

pub use manager::BookingLedger;
pub use orchestrator::{InstantSettlementGateway, PaymentProcessor};
pub use reservation::ReservationDesk;
