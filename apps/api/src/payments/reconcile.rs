//! Webhook Reconciler — turns an at-least-once delivered, verified
//! gateway event into an at-most-once internal state change.
//!
//! The ledger's conditional claim out of PENDING is both the replay
//! protection and the concurrent-delivery tiebreak. For a PAID event
//! the claim and the entitlement activation are a single atomic store
//! operation, so a delivery that fails midway leaves the record
//! PENDING and the gateway's retry runs the whole thing again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::payment::PaymentStatus;
use crate::payments::gateway::VerifiedEvent;
use crate::store::payment::{PaymentStore, SettleOutcome};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Event references an order this ledger never created. Logged and
    /// surfaced to the webhook caller; not retried internally.
    #[error("unknown order code {0}")]
    UnknownOrder(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Payment settled as PAID and the entitlement was activated.
    Activated {
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    },
    /// Payment settled in a non-paid terminal state; no entitlement change.
    Settled(PaymentStatus),
    /// Record already terminal (replay or lost race); nothing was done.
    AlreadySettled,
}

#[derive(Clone)]
pub struct Reconciler {
    payments: Arc<dyn PaymentStore>,
}

impl Reconciler {
    pub fn new(payments: Arc<dyn PaymentStore>) -> Self {
        Self { payments }
    }

    pub async fn reconcile(
        &self,
        event: &VerifiedEvent,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.reconcile_at(event, Utc::now()).await
    }

    pub async fn reconcile_at(
        &self,
        event: &VerifiedEvent,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let record = self
            .payments
            .get(event.order_code)
            .await?
            .ok_or(ReconcileError::UnknownOrder(event.order_code))?;

        if record.status.is_terminal() {
            info!(
                order_code = event.order_code,
                status = record.status.as_str(),
                "webhook replay for settled order, no-op"
            );
            return Ok(ReconcileOutcome::AlreadySettled);
        }

        if event.outcome == SettleOutcome::Paid {
            // Claim and activation are one atomic store operation; a
            // concurrent delivery of the same event loses the claim.
            let Some((claimed, expires_at)) = self
                .payments
                .settle_paid_and_activate(event.order_code, now, &event.raw)
                .await?
            else {
                return Ok(ReconcileOutcome::AlreadySettled);
            };
            info!(
                order_code = claimed.order_code,
                user_id = %claimed.user_id,
                %expires_at,
                "payment settled and entitlement activated"
            );
            return Ok(ReconcileOutcome::Activated {
                user_id: claimed.user_id,
                expires_at,
            });
        }

        match self
            .payments
            .settle(event.order_code, event.outcome, now, &event.raw)
            .await?
        {
            Some(claimed) => {
                info!(
                    order_code = claimed.order_code,
                    status = claimed.status.as_str(),
                    "payment settled without entitlement change"
                );
                Ok(ReconcileOutcome::Settled(claimed.status))
            }
            None => Ok(ReconcileOutcome::AlreadySettled),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entitlement::{Tier, UserEntitlement};
    use crate::models::payment::PaymentRecord;
    use crate::quota::clock;
    use crate::store::entitlement::EntitlementStore;
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    const ORDER: i64 = 314159265;
    const PLAN_DAYS: i32 = 30;

    fn seeded_store() -> (Arc<MemoryStore>, Uuid) {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();
        store.insert_entitlement(UserEntitlement::new_free(
            user_id,
            clock::day_start(now),
            now,
        ));
        store.insert_payment(PaymentRecord::pending(user_id, ORDER, 20000, PLAN_DAYS, now));
        (store, user_id)
    }

    fn setup() -> (Reconciler, Arc<MemoryStore>, Uuid) {
        let (store, user_id) = seeded_store();
        let reconciler = Reconciler::new(store.clone() as Arc<dyn PaymentStore>);
        (reconciler, store, user_id)
    }

    fn paid_event() -> VerifiedEvent {
        VerifiedEvent {
            order_code: ORDER,
            outcome: SettleOutcome::Paid,
            raw: json!({"code": "00", "data": {"orderCode": ORDER, "status": "PAID"}}),
        }
    }

    /// Ledger that fails a configurable number of paid settlements
    /// before delegating, without touching any state on failure.
    struct FlakyLedger {
        inner: Arc<MemoryStore>,
        failures_left: Mutex<u32>,
    }

    #[async_trait]
    impl PaymentStore for FlakyLedger {
        async fn create_pending(&self, record: &PaymentRecord) -> Result<(), StoreError> {
            self.inner.create_pending(record).await
        }

        async fn get(&self, order_code: i64) -> Result<Option<PaymentRecord>, StoreError> {
            PaymentStore::get(&*self.inner, order_code).await
        }

        async fn attach_gateway_link(
            &self,
            order_code: i64,
            link_id: &str,
        ) -> Result<(), StoreError> {
            self.inner.attach_gateway_link(order_code, link_id).await
        }

        async fn settle(
            &self,
            order_code: i64,
            outcome: SettleOutcome,
            now: DateTime<Utc>,
            raw_webhook: &Value,
        ) -> Result<Option<PaymentRecord>, StoreError> {
            self.inner.settle(order_code, outcome, now, raw_webhook).await
        }

        async fn settle_paid_and_activate(
            &self,
            order_code: i64,
            now: DateTime<Utc>,
            raw_webhook: &Value,
        ) -> Result<Option<(PaymentRecord, DateTime<Utc>)>, StoreError> {
            {
                let mut left = self.failures_left.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err(StoreError::Database(sqlx::Error::PoolClosed));
                }
            }
            self.inner
                .settle_paid_and_activate(order_code, now, raw_webhook)
                .await
        }
    }

    #[tokio::test]
    async fn paid_event_settles_the_ledger_and_activates_pro() {
        let (reconciler, store, user_id) = setup();
        let now = Utc::now();

        let outcome = reconciler.reconcile_at(&paid_event(), now).await.unwrap();
        let expected_expiry = now + Duration::days(PLAN_DAYS as i64);
        assert_eq!(
            outcome,
            ReconcileOutcome::Activated {
                user_id,
                expires_at: expected_expiry
            }
        );

        let record = PaymentStore::get(&*store, ORDER).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Paid);
        assert_eq!(record.paid_at, Some(now));
        assert!(record.raw_webhook.is_some());

        let ent = EntitlementStore::get(&*store, user_id).await.unwrap().unwrap();
        assert_eq!(ent.tier, Tier::Pro);
        assert_eq!(ent.pro_expires_at, Some(expected_expiry));
        assert_eq!(store.activation_count(), 1);
    }

    #[tokio::test]
    async fn replayed_paid_event_is_a_no_op() {
        let (reconciler, store, _user) = setup();
        let now = Utc::now();

        reconciler.reconcile_at(&paid_event(), now).await.unwrap();
        let replay = reconciler
            .reconcile_at(&paid_event(), now + Duration::seconds(5))
            .await
            .unwrap();

        assert_eq!(replay, ReconcileOutcome::AlreadySettled);
        assert_eq!(store.activation_count(), 1);
        let record = PaymentStore::get(&*store, ORDER).await.unwrap().unwrap();
        // First delivery's timestamps survive the replay.
        assert_eq!(record.paid_at, Some(now));
    }

    #[tokio::test]
    async fn settlement_failure_leaves_the_claim_open_for_retry() {
        let (store, user_id) = seeded_store();
        let flaky = Arc::new(FlakyLedger {
            inner: store.clone(),
            failures_left: Mutex::new(1),
        });
        let reconciler = Reconciler::new(flaky as Arc<dyn PaymentStore>);
        let now = Utc::now();

        let first = reconciler.reconcile_at(&paid_event(), now).await;
        assert!(matches!(first, Err(ReconcileError::Store(_))));

        // Nothing was claimed and nothing was activated, so the
        // gateway's retry is not a replay — it can still complete.
        let record = PaymentStore::get(&*store, ORDER).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(store.activation_count(), 0);

        let retry_at = now + Duration::seconds(30);
        let retry = reconciler.reconcile_at(&paid_event(), retry_at).await.unwrap();
        assert_eq!(
            retry,
            ReconcileOutcome::Activated {
                user_id,
                expires_at: retry_at + Duration::days(PLAN_DAYS as i64)
            }
        );
        assert_eq!(store.activation_count(), 1);
        let ent = EntitlementStore::get(&*store, user_id).await.unwrap().unwrap();
        assert_eq!(ent.tier, Tier::Pro);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicate_deliveries_activate_once() {
        let (reconciler, store, _user) = setup();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let reconciler = reconciler.clone();
            handles.push(tokio::spawn(
                async move { reconciler.reconcile(&paid_event()).await.unwrap() },
            ));
        }

        let mut activated = 0;
        for h in handles {
            if matches!(h.await.unwrap(), ReconcileOutcome::Activated { .. }) {
                activated += 1;
            }
        }
        assert_eq!(activated, 1);
        assert_eq!(store.activation_count(), 1);
    }

    #[tokio::test]
    async fn cancellation_settles_without_entitlement_change() {
        let (reconciler, store, user_id) = setup();
        let event = VerifiedEvent {
            order_code: ORDER,
            outcome: SettleOutcome::Cancelled,
            raw: json!({"data": {"orderCode": ORDER, "status": "CANCELLED"}}),
        };

        let outcome = reconciler.reconcile(&event).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Settled(PaymentStatus::Cancelled));

        let record = PaymentStore::get(&*store, ORDER).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Cancelled);
        assert_eq!(record.paid_at, None);

        let ent = EntitlementStore::get(&*store, user_id).await.unwrap().unwrap();
        assert_eq!(ent.tier, Tier::Free);
        assert_eq!(store.activation_count(), 0);
    }

    #[tokio::test]
    async fn paid_after_cancelled_cannot_resurrect_the_order() {
        let (reconciler, store, _user) = setup();
        let cancel = VerifiedEvent {
            order_code: ORDER,
            outcome: SettleOutcome::Expired,
            raw: json!({"data": {"orderCode": ORDER, "status": "EXPIRED"}}),
        };
        reconciler.reconcile(&cancel).await.unwrap();

        let outcome = reconciler.reconcile(&paid_event()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::AlreadySettled);
        assert_eq!(store.activation_count(), 0);
        let record = PaymentStore::get(&*store, ORDER).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Expired);
    }

    #[tokio::test]
    async fn unknown_order_is_signalled() {
        let (reconciler, _store, _user) = setup();
        let event = VerifiedEvent {
            order_code: 999999999,
            outcome: SettleOutcome::Paid,
            raw: json!({}),
        };
        assert!(matches!(
            reconciler.reconcile(&event).await,
            Err(ReconcileError::UnknownOrder(999999999))
        ));
    }
}
