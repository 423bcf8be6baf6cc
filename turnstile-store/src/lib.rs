pub mod app_config;
pub mod database;
pub mod memory;
pub mod notifications;
pub mod pg_repo;

pub use database::DbClient;
pub use memory::{MemoryStore, MemoryTx};
pub use notifications::{LogNotifier, WebhookNotifier};
pub use pg_repo::PgStore;
