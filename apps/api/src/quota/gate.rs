//! Quota Gate — decides allow/deny for one consumption and accounts for
//! it atomically.
//!
//! The decision itself is a pure function over a loaded entitlement row
//! (`evaluate`). Persistence goes through the store's version CAS, so
//! two concurrent `try_consume` calls for one user can never both read
//! `daily_used = N` and both write `N + 1`: the loser's CAS fails and it
//! re-reads. A denied request never consumes a slot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::entitlement::UserEntitlement;
use crate::quota::clock;
use crate::store::entitlement::EntitlementStore;
use crate::store::StoreError;

pub const DEFAULT_DAILY_LIMIT: u32 = 5;

/// Upper bound on CAS re-reads under contention. A burst of N
/// concurrent requests for one user resolves in at most N rounds.
const MAX_CAS_ATTEMPTS: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Limited(u32),
    Unlimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub remaining: Remaining,
}

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("unknown user {0}")]
    UnknownUser(Uuid),

    /// CAS retry budget exhausted; safe to surface as a retryable
    /// failure since nothing was consumed on the losing path.
    #[error("quota update contention for user {0}")]
    Contention(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Pure decision step. Returns the row to persist (None when the deny
/// required no write) and the decision.
///
/// Order matters: the lazy window reset applies before the limit is
/// evaluated, and a stale window is persisted even on a deny.
fn evaluate(
    ent: &UserEntitlement,
    now: DateTime<Utc>,
    daily_limit: u32,
) -> (Option<UserEntitlement>, QuotaDecision) {
    let mut next = ent.clone();
    let mut reset = false;

    if clock::window_is_stale(next.daily_reset_at, now) {
        next.daily_used = 0;
        next.daily_reset_at = clock::day_start(now);
        reset = true;
    }

    if next.is_pro_active(now) {
        // Counted for the audit trail only, never used to deny.
        next.daily_used += 1;
        next.lifetime_used += 1;
        return (
            Some(next),
            QuotaDecision {
                allowed: true,
                remaining: Remaining::Unlimited,
            },
        );
    }

    if next.daily_used >= daily_limit as i32 {
        let decision = QuotaDecision {
            allowed: false,
            remaining: Remaining::Limited(0),
        };
        // Persist only the reset, if one happened; counters untouched.
        return (reset.then_some(next), decision);
    }

    next.daily_used += 1;
    next.lifetime_used += 1;
    let remaining = daily_limit.saturating_sub(next.daily_used as u32);
    (
        Some(next),
        QuotaDecision {
            allowed: true,
            remaining: Remaining::Limited(remaining),
        },
    )
}

/// Remaining-today view for the read boundary. Applies the lazy reset
/// virtually (no write). `None` means unlimited (active Pro).
pub fn remaining_today(
    ent: &UserEntitlement,
    now: DateTime<Utc>,
    daily_limit: u32,
) -> Option<u32> {
    if ent.is_pro_active(now) {
        return None;
    }
    let used = if clock::window_is_stale(ent.daily_reset_at, now) {
        0
    } else {
        ent.daily_used.max(0) as u32
    };
    Some(daily_limit.saturating_sub(used))
}

/// Used-today view matching `remaining_today`: a stale window reads as
/// zero even though the reset has not been persisted yet.
pub fn used_today(ent: &UserEntitlement, now: DateTime<Utc>) -> i32 {
    if clock::window_is_stale(ent.daily_reset_at, now) {
        0
    } else {
        ent.daily_used
    }
}

#[derive(Clone)]
pub struct QuotaGate {
    store: Arc<dyn EntitlementStore>,
    daily_limit: u32,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn EntitlementStore>, daily_limit: u32) -> Self {
        Self { store, daily_limit }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub async fn try_consume(&self, user_id: Uuid) -> Result<QuotaDecision, QuotaError> {
        self.try_consume_at(user_id, Utc::now()).await
    }

    pub async fn try_consume_at(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<QuotaDecision, QuotaError> {
        for attempt in 0..MAX_CAS_ATTEMPTS {
            let ent = self
                .store
                .get(user_id)
                .await?
                .ok_or(QuotaError::UnknownUser(user_id))?;

            let (update, decision) = evaluate(&ent, now, self.daily_limit);
            let Some(mut next) = update else {
                return Ok(decision);
            };

            next.version = ent.version + 1;
            if self.store.compare_and_update(ent.version, &next).await? {
                return Ok(decision);
            }
            debug!(%user_id, attempt, "quota CAS lost, re-reading");
        }
        Err(QuotaError::Contention(user_id))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
