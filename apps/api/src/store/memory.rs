//! In-memory store used by the quota/reconciler property tests. Mirrors
//! the atomicity contract of the Postgres implementations: CAS on the
//! entitlement version, conditional claim out of PENDING.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::models::entitlement::{Tier, UserEntitlement};
use crate::models::payment::{PaymentRecord, PaymentStatus};
use crate::store::entitlement::EntitlementStore;
use crate::store::payment::{settle_timestamps, PaymentStore, SettleOutcome};
use crate::store::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    entitlements: Mutex<HashMap<Uuid, UserEntitlement>>,
    payments: Mutex<HashMap<i64, PaymentRecord>>,
    /// (user_id, expires_at) per activation, so tests can assert
    /// exactly-once activation under replay.
    activations: Mutex<Vec<(Uuid, DateTime<Utc>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_entitlement(&self, ent: UserEntitlement) {
        self.entitlements.lock().unwrap().insert(ent.user_id, ent);
    }

    pub fn insert_payment(&self, record: PaymentRecord) {
        self.payments.lock().unwrap().insert(record.order_code, record);
    }

    pub fn activation_count(&self) -> usize {
        self.activations.lock().unwrap().len()
    }
}

#[async_trait]
impl EntitlementStore for MemoryStore {
    async fn ensure(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<UserEntitlement, StoreError> {
        let mut map = self.entitlements.lock().unwrap();
        let ent = map.entry(user_id).or_insert_with(|| {
            UserEntitlement::new_free(user_id, crate::quota::clock::day_start(now), now)
        });
        Ok(ent.clone())
    }

    async fn get(&self, user_id: Uuid) -> Result<Option<UserEntitlement>, StoreError> {
        Ok(self.entitlements.lock().unwrap().get(&user_id).cloned())
    }

    async fn compare_and_update(
        &self,
        expected_version: i64,
        updated: &UserEntitlement,
    ) -> Result<bool, StoreError> {
        let mut map = self.entitlements.lock().unwrap();
        match map.get_mut(&updated.user_id) {
            Some(current) if current.version == expected_version => {
                *current = updated.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn create_pending(&self, record: &PaymentRecord) -> Result<(), StoreError> {
        let mut map = self.payments.lock().unwrap();
        if map.contains_key(&record.order_code) {
            return Err(StoreError::DuplicateOrder(record.order_code));
        }
        map.insert(record.order_code, record.clone());
        Ok(())
    }

    async fn get(&self, order_code: i64) -> Result<Option<PaymentRecord>, StoreError> {
        Ok(self.payments.lock().unwrap().get(&order_code).cloned())
    }

    async fn attach_gateway_link(
        &self,
        order_code: i64,
        link_id: &str,
    ) -> Result<(), StoreError> {
        if let Some(record) = self.payments.lock().unwrap().get_mut(&order_code) {
            record.gateway_link_id = Some(link_id.to_string());
        }
        Ok(())
    }

    async fn settle(
        &self,
        order_code: i64,
        outcome: SettleOutcome,
        now: DateTime<Utc>,
        raw_webhook: &Value,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        let mut map = self.payments.lock().unwrap();
        let Some(record) = map.get_mut(&order_code) else {
            return Ok(None);
        };
        if record.status != PaymentStatus::Pending {
            return Ok(None);
        }
        let (paid_at, expires_at) = settle_timestamps(outcome, now);
        record.status = outcome.status();
        record.paid_at = paid_at;
        record.expires_at = expires_at;
        record.raw_webhook = Some(raw_webhook.clone());
        Ok(Some(record.clone()))
    }

    async fn settle_paid_and_activate(
        &self,
        order_code: i64,
        now: DateTime<Utc>,
        raw_webhook: &Value,
    ) -> Result<Option<(PaymentRecord, DateTime<Utc>)>, StoreError> {
        // The payments lock is held across both writes, mirroring the
        // all-or-nothing transaction of the Postgres implementation.
        let mut payments = self.payments.lock().unwrap();
        let Some(record) = payments.get_mut(&order_code) else {
            return Ok(None);
        };
        if record.status != PaymentStatus::Pending {
            return Ok(None);
        }
        let (paid_at, ledger_expires_at) = settle_timestamps(SettleOutcome::Paid, now);
        record.status = PaymentStatus::Paid;
        record.paid_at = paid_at;
        record.expires_at = ledger_expires_at;
        record.raw_webhook = Some(raw_webhook.clone());
        let record = record.clone();

        let expires_at = now + Duration::days(record.plan_duration_days as i64);
        {
            let mut entitlements = self.entitlements.lock().unwrap();
            let ent = entitlements.entry(record.user_id).or_insert_with(|| {
                UserEntitlement::new_free(record.user_id, crate::quota::clock::day_start(now), now)
            });
            ent.tier = Tier::Pro;
            ent.pro_expires_at = Some(expires_at);
            ent.version += 1;
        }
        self.activations.lock().unwrap().push((record.user_id, expires_at));
        Ok(Some((record, expires_at)))
    }
}
