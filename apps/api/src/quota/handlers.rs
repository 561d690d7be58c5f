use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::quota::gate::{remaining_today, used_today};
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaView {
    pub tier: &'static str,
    pub pro_expires_at: Option<DateTime<Utc>>,
    pub daily_used: i32,
    /// `None` means unlimited (active Pro).
    pub remaining_today: Option<u32>,
}

/// POST /api/v1/auth/session
///
/// First-sign-in hook: creates the free-tier entitlement row if the
/// user has none yet, and returns the current quota view either way.
pub async fn handle_session(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<QuotaView>, AppError> {
    let now = Utc::now();
    let ent = state.entitlements.ensure(user_id, now).await?;
    Ok(Json(QuotaView {
        tier: ent.tier.as_str(),
        pro_expires_at: ent.pro_expires_at,
        daily_used: used_today(&ent, now),
        remaining_today: remaining_today(&ent, now, state.quota.daily_limit()),
    }))
}

/// GET /api/v1/me/quota
///
/// Read boundary for the UI layer: current tier, expiry and the derived
/// remaining-today count. Read-only — the lazy reset is applied
/// virtually, not persisted.
pub async fn handle_me_quota(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<QuotaView>, AppError> {
    let now = Utc::now();
    let ent = state
        .entitlements
        .get(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No entitlement for user {user_id}")))?;

    Ok(Json(QuotaView {
        tier: ent.tier.as_str(),
        pro_expires_at: ent.pro_expires_at,
        // Same virtual reset as `remaining_today`, so the two fields in
        // one response can never disagree across a day boundary.
        daily_used: used_today(&ent, now),
        remaining_today: remaining_today(&ent, now, state.quota.daily_limit()),
    }))
}
