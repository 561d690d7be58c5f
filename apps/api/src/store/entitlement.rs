//! Entitlement store — one row per user, optimistic-CAS update discipline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::entitlement::{Tier, UserEntitlement};
use crate::store::StoreError;

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Creates the free-tier row for a user if it does not exist yet
    /// (first sign-in), then returns the current row either way.
    async fn ensure(&self, user_id: Uuid, now: DateTime<Utc>)
        -> Result<UserEntitlement, StoreError>;

    async fn get(&self, user_id: Uuid) -> Result<Option<UserEntitlement>, StoreError>;

    /// Persists `updated` only if the stored row still carries
    /// `expected_version`. Returns false on a lost race; the caller
    /// re-reads and retries. This is the serialization point for all
    /// concurrent quota mutations on one user.
    async fn compare_and_update(
        &self,
        expected_version: i64,
        updated: &UserEntitlement,
    ) -> Result<bool, StoreError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(FromRow)]
struct EntitlementRow {
    user_id: Uuid,
    tier: String,
    pro_expires_at: Option<DateTime<Utc>>,
    daily_used: i32,
    daily_reset_at: DateTime<Utc>,
    lifetime_used: i64,
    version: i64,
    created_at: DateTime<Utc>,
}

impl From<EntitlementRow> for UserEntitlement {
    fn from(r: EntitlementRow) -> Self {
        UserEntitlement {
            user_id: r.user_id,
            // Unknown tier strings degrade to free rather than erroring.
            tier: Tier::parse(&r.tier).unwrap_or(Tier::Free),
            pro_expires_at: r.pro_expires_at,
            daily_used: r.daily_used,
            daily_reset_at: r.daily_reset_at,
            lifetime_used: r.lifetime_used,
            version: r.version,
            created_at: r.created_at,
        }
    }
}

#[derive(Clone)]
pub struct PgEntitlementStore {
    pool: PgPool,
}

impl PgEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementStore for PgEntitlementStore {
    async fn ensure(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<UserEntitlement, StoreError> {
        let fresh = UserEntitlement::new_free(user_id, crate::quota::clock::day_start(now), now);
        sqlx::query(
            r#"
            INSERT INTO entitlements
                (user_id, tier, pro_expires_at, daily_used, daily_reset_at,
                 lifetime_used, version, created_at)
            VALUES ($1, $2, NULL, 0, $3, 0, 0, $4)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(fresh.tier.as_str())
        .bind(fresh.daily_reset_at)
        .bind(fresh.created_at)
        .execute(&self.pool)
        .await?;

        let row: EntitlementRow =
            sqlx::query_as("SELECT * FROM entitlements WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.into())
    }

    async fn get(&self, user_id: Uuid) -> Result<Option<UserEntitlement>, StoreError> {
        let row: Option<EntitlementRow> =
            sqlx::query_as("SELECT * FROM entitlements WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    async fn compare_and_update(
        &self,
        expected_version: i64,
        updated: &UserEntitlement,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE entitlements
            SET tier = $2, pro_expires_at = $3, daily_used = $4,
                daily_reset_at = $5, lifetime_used = $6, version = $7
            WHERE user_id = $1 AND version = $8
            "#,
        )
        .bind(updated.user_id)
        .bind(updated.tier.as_str())
        .bind(updated.pro_expires_at)
        .bind(updated.daily_used)
        .bind(updated.daily_reset_at)
        .bind(updated.lifetime_used)
        .bind(updated.version)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
