use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::payments::gateway::PayosClient;
use crate::payments::reconcile::Reconciler;
use crate::quota::gate::QuotaGate;
use crate::store::entitlement::EntitlementStore;
use crate::store::payment::PaymentStore;

/// Shared application state injected into all route handlers via Axum extractors.
///
/// The two stores are trait objects so the quota/reconciliation core is
/// exercised against an in-memory implementation in tests while
/// production runs on Postgres.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub llm: LlmClient,
    pub gateway: PayosClient,
    pub entitlements: Arc<dyn EntitlementStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub quota: QuotaGate,
    pub reconciler: Reconciler,
    pub config: Config,
}
