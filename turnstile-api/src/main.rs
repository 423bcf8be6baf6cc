use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use turnstile_api::{app, AppState};
use turnstile_core::notify::Notifier;
use turnstile_core::payment::PaymentGateway;
use turnstile_core::repository::LedgerStore;
use turnstile_order::InstantSettlementGateway;
use turnstile_store::app_config::{Config, StoreMode};
use turnstile_store::{DbClient, LogNotifier, MemoryStore, PgStore, WebhookNotifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "turnstile_api=debug,turnstile_catalog=debug,turnstile_order=debug,turnstile_store=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting Turnstile API on port {}", config.server.port);

    let notifier: Arc<dyn Notifier> = match &config.notifications.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
        None => Arc::new(LogNotifier),
    };
    let gateway: Arc<dyn PaymentGateway> = Arc::new(InstantSettlementGateway);

    match config.database.mode {
        StoreMode::Postgres => {
            let db = DbClient::new(&config.database).await?;
            db.migrate().await?;
            serve(Arc::new(PgStore::new(db.pool.clone())), &config, gateway, notifier).await
        }
        StoreMode::Memory => {
            tracing::warn!("Using in-memory store, nothing survives a restart");
            serve(Arc::new(MemoryStore::new()), &config, gateway, notifier).await
        }
    }
}

async fn serve<S: LedgerStore>(
    store: Arc<S>,
    config: &Config,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
) -> anyhow::Result<()> {
    let state = AppState::new(store, &config.booking, gateway, notifier);
    state
        .pricing
        .seed_if_empty(&config.pricing.seed, state.today())
        .await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}
