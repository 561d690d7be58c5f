mod analysis;
mod auth;
mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod payments;
mod quota;
mod routes;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::{create_pool, ensure_schema};
use crate::llm_client::LlmClient;
use crate::payments::gateway::PayosClient;
use crate::payments::reconcile::Reconciler;
use crate::quota::gate::QuotaGate;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::entitlement::{EntitlementStore, PgEntitlementStore};
use crate::store::payment::{PaymentStore, PgPaymentStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Fitcheck API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let pool = create_pool(&config.database_url).await?;
    ensure_schema(&pool).await?;

    // Stores (single source of truth for quota and payment state)
    let entitlements: Arc<dyn EntitlementStore> =
        Arc::new(PgEntitlementStore::new(pool.clone()));
    let payments: Arc<dyn PaymentStore> = Arc::new(PgPaymentStore::new(pool.clone()));

    // Quota gate and webhook reconciler — the consistency core
    let quota = QuotaGate::new(entitlements.clone(), config.free_daily_limit);
    let reconciler = Reconciler::new(payments.clone());
    info!("Quota gate ready (free daily limit: {})", config.free_daily_limit);

    // Payment gateway adapter
    let gateway = PayosClient::new(&config);
    info!("Payment gateway client initialized");

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone());
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Build app state
    let state = AppState {
        db: pool,
        llm,
        gateway,
        entitlements,
        payments,
        quota,
        reconciler,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
