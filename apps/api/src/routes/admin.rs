//! Admin snapshot endpoint, gated by the configured email allow-list.

use axum::{extract::State, http::HeaderMap, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::FromRow;
use uuid::Uuid;

use crate::auth::caller_email;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Serialize, FromRow)]
struct RecentEntitlement {
    user_id: Uuid,
    tier: String,
    lifetime_used: i64,
    created_at: DateTime<Utc>,
}

#[derive(Serialize, FromRow)]
struct RecentPayment {
    order_code: i64,
    amount: i64,
    status: String,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
}

/// GET /api/v1/admin/stats
pub async fn handle_admin_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let email = caller_email(&headers).ok_or(AppError::Forbidden)?;
    if !state.config.admin_emails.contains(&email) {
        return Err(AppError::Forbidden);
    }

    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entitlements")
        .fetch_one(&state.db)
        .await?;
    let active_pro: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM entitlements WHERE tier = 'pro' AND pro_expires_at > now()",
    )
    .fetch_one(&state.db)
    .await?;
    let total_analyses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analyses")
        .fetch_one(&state.db)
        .await?;
    let paid_revenue: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE status = 'paid'",
    )
    .fetch_one(&state.db)
    .await?;

    let recent_users: Vec<RecentEntitlement> = sqlx::query_as(
        "SELECT user_id, tier, lifetime_used, created_at
         FROM entitlements ORDER BY created_at DESC LIMIT 10",
    )
    .fetch_all(&state.db)
    .await?;
    let recent_payments: Vec<RecentPayment> = sqlx::query_as(
        "SELECT order_code, amount, status, created_at, paid_at
         FROM payments ORDER BY created_at DESC LIMIT 10",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({
        "stats": {
            "totalUsers": total_users,
            "activePro": active_pro,
            "totalAnalyses": total_analyses,
            "paidRevenue": paid_revenue,
        },
        "recentUsers": recent_users,
        "recentPayments": recent_payments,
    })))
}
