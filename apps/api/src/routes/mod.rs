pub mod admin;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::analysis;
use crate::payments;
use crate::quota;
use crate::state::AppState;

/// Multipart bodies carry up to a 5 MB document plus the JD text.
const MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Session / entitlement
        .route("/api/v1/auth/session", post(quota::handlers::handle_session))
        .route("/api/v1/me/quota", get(quota::handlers::handle_me_quota))
        // Analysis
        .route("/api/v1/analyze", post(analysis::handlers::handle_analyze))
        .route(
            "/api/v1/history",
            get(analysis::history::handle_get_history)
                .delete(analysis::history::handle_delete_history),
        )
        // Payments
        .route(
            "/api/v1/payment/checkout",
            post(payments::handlers::handle_checkout),
        )
        .route(
            "/api/v1/payment/webhook",
            post(payments::handlers::handle_webhook),
        )
        // Admin
        .route("/api/v1/admin/stats", get(admin::handle_admin_stats))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
