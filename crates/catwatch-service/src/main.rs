//! Catwatch billing service entry point.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catwatch_service::{
    create_router, scheduler, AppState, JobQueue, JobRunner, ServiceConfig, StripeClient,
};
use catwatch_store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,catwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting catwatch billing service");

    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        database_configured = %config.database_url.is_some(),
        stripe_configured = %config.stripe_api_key.is_some(),
        stripe_api_base = %config.stripe_api_base,
        plans = config.plans.len(),
        "Service configuration loaded"
    );

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL");
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set - using in-memory store, data will not persist");
            Arc::new(MemoryStore::new())
        }
    };

    let api_key = config.stripe_api_key.clone().unwrap_or_else(|| {
        tracing::warn!("Stripe not configured - gateway calls will fail");
        String::new()
    });
    let gateway = Arc::new(StripeClient::new(
        api_key,
        config.stripe_api_base.clone(),
        Duration::from_secs(config.stripe_timeout_seconds),
    )?);

    let (jobs, rx) = JobQueue::channel();
    let state = AppState::new(store, gateway, config.clone(), jobs.clone());

    let _worker = JobRunner::new(&state).spawn(rx);
    let _scheduler = scheduler::start(&config, &jobs).await?;

    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
