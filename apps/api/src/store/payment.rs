//! Payment ledger — one row per payment attempt, one-directional status
//! machine enforced by conditional updates.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::payment::{PaymentRecord, PaymentStatus};
use crate::store::StoreError;

/// How long a paid record is marked valid in the ledger. Bookkeeping
/// only; the entitlement row carries the authoritative expiry.
pub const LEDGER_VALIDITY_DAYS: i64 = 30;

/// Terminal outcome reported by a verified webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Paid,
    Cancelled,
    Expired,
}

impl SettleOutcome {
    pub fn status(&self) -> PaymentStatus {
        match self {
            SettleOutcome::Paid => PaymentStatus::Paid,
            SettleOutcome::Cancelled => PaymentStatus::Cancelled,
            SettleOutcome::Expired => PaymentStatus::Expired,
        }
    }
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts a PENDING record. `StoreError::DuplicateOrder` when the
    /// order code is already taken; the checkout path regenerates.
    async fn create_pending(&self, record: &PaymentRecord) -> Result<(), StoreError>;

    async fn get(&self, order_code: i64) -> Result<Option<PaymentRecord>, StoreError>;

    /// Attaches the gateway's link id after link creation. Keyed by
    /// order code and safe to re-run, so a crashed checkout can be
    /// reconciled by retrying.
    async fn attach_gateway_link(&self, order_code: i64, link_id: &str)
        -> Result<(), StoreError>;

    /// Conditionally claims the record out of PENDING into the given
    /// terminal state, storing the raw webhook payload. Returns the
    /// claimed record, or `None` when the record was already terminal
    /// (or claimed by a concurrent delivery) — the idempotency guard
    /// and the status write are one atomic unit.
    async fn settle(
        &self,
        order_code: i64,
        outcome: SettleOutcome,
        now: DateTime<Utc>,
        raw_webhook: &Value,
    ) -> Result<Option<PaymentRecord>, StoreError>;

    /// Claims the record out of PENDING into PAID and activates the
    /// user's Pro entitlement as one atomic unit: either both writes
    /// land or neither does, so a delivery that fails midway leaves the
    /// record PENDING for the gateway's retry. The entitlement expiry
    /// is always computed from `now` (renewal does not stack onto a
    /// prior expiry), and the entitlement version bump invalidates any
    /// in-flight quota CAS on the row. Returns the claimed record and
    /// the expiry, or `None` when the record was already terminal.
    async fn settle_paid_and_activate(
        &self,
        order_code: i64,
        now: DateTime<Utc>,
        raw_webhook: &Value,
    ) -> Result<Option<(PaymentRecord, DateTime<Utc>)>, StoreError>;
}

/// `paid_at`/`expires_at` values for an outcome: set only on PAID.
pub fn settle_timestamps(
    outcome: SettleOutcome,
    now: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match outcome {
        SettleOutcome::Paid => (Some(now), Some(now + Duration::days(LEDGER_VALIDITY_DAYS))),
        _ => (None, None),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(FromRow)]
struct PaymentRow {
    order_code: i64,
    user_id: Uuid,
    amount: i64,
    status: String,
    gateway_link_id: Option<String>,
    plan_duration_days: i32,
    paid_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    raw_webhook: Option<Value>,
    created_at: DateTime<Utc>,
}

impl From<PaymentRow> for PaymentRecord {
    fn from(r: PaymentRow) -> Self {
        PaymentRecord {
            order_code: r.order_code,
            user_id: r.user_id,
            amount: r.amount,
            status: PaymentStatus::parse(&r.status).unwrap_or(PaymentStatus::Pending),
            gateway_link_id: r.gateway_link_id,
            plan_duration_days: r.plan_duration_days,
            paid_at: r.paid_at,
            expires_at: r.expires_at,
            raw_webhook: r.raw_webhook,
            created_at: r.created_at,
        }
    }
}

#[derive(Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const UNIQUE_VIOLATION: &str = "23505";

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn create_pending(&self, record: &PaymentRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments
                (order_code, user_id, amount, status, gateway_link_id,
                 plan_duration_days, paid_at, expires_at, raw_webhook, created_at)
            VALUES ($1, $2, $3, $4, NULL, $5, NULL, NULL, NULL, $6)
            "#,
        )
        .bind(record.order_code)
        .bind(record.user_id)
        .bind(record.amount)
        .bind(record.status.as_str())
        .bind(record.plan_duration_days)
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db))
                if db.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Err(StoreError::DuplicateOrder(record.order_code))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, order_code: i64) -> Result<Option<PaymentRecord>, StoreError> {
        let row: Option<PaymentRow> =
            sqlx::query_as("SELECT * FROM payments WHERE order_code = $1")
                .bind(order_code)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    async fn attach_gateway_link(
        &self,
        order_code: i64,
        link_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE payments SET gateway_link_id = $2 WHERE order_code = $1")
            .bind(order_code)
            .bind(link_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn settle(
        &self,
        order_code: i64,
        outcome: SettleOutcome,
        now: DateTime<Utc>,
        raw_webhook: &Value,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        let (paid_at, expires_at) = settle_timestamps(outcome, now);
        // The `status = 'pending'` predicate is the replay/race guard:
        // exactly one delivery can move a record out of PENDING.
        let row: Option<PaymentRow> = sqlx::query_as(
            r#"
            UPDATE payments
            SET status = $2, paid_at = $3, expires_at = $4, raw_webhook = $5
            WHERE order_code = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(order_code)
        .bind(outcome.status().as_str())
        .bind(paid_at)
        .bind(expires_at)
        .bind(raw_webhook)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn settle_paid_and_activate(
        &self,
        order_code: i64,
        now: DateTime<Utc>,
        raw_webhook: &Value,
    ) -> Result<Option<(PaymentRecord, DateTime<Utc>)>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let (paid_at, ledger_expires_at) = settle_timestamps(SettleOutcome::Paid, now);
        let row: Option<PaymentRow> = sqlx::query_as(
            r#"
            UPDATE payments
            SET status = 'paid', paid_at = $2, expires_at = $3, raw_webhook = $4
            WHERE order_code = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(order_code)
        .bind(paid_at)
        .bind(ledger_expires_at)
        .bind(raw_webhook)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let record: PaymentRecord = row.into();
        let expires_at = now + Duration::days(record.plan_duration_days as i64);

        // The upsert covers a paid order whose user has no entitlement
        // row yet; the version bump invalidates in-flight quota CAS.
        sqlx::query(
            r#"
            INSERT INTO entitlements
                (user_id, tier, pro_expires_at, daily_used, daily_reset_at,
                 lifetime_used, version, created_at)
            VALUES ($1, 'pro', $2, 0, $3, 0, 1, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET tier = 'pro', pro_expires_at = EXCLUDED.pro_expires_at,
                version = entitlements.version + 1
            "#,
        )
        .bind(record.user_id)
        .bind(expires_at)
        .bind(crate::quota::clock::day_start(now))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((record, expires_at)))
    }
}
