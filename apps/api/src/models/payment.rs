use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Payment attempt status. Transitions are one-directional:
/// `Pending -> {Paid, Cancelled, Expired}`. The three terminal states
/// are absorbing; a webhook replayed against a settled record is a
/// no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Cancelled,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<PaymentStatus> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "cancelled" => Some(PaymentStatus::Cancelled),
            "expired" => Some(PaymentStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

/// One row per payment attempt, keyed by the client-generated numeric
/// order code. Created by the checkout path, mutated only by the
/// webhook reconciler, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub order_code: i64,
    pub user_id: Uuid,
    /// Price in the gateway's minor currency unit.
    pub amount: i64,
    pub status: PaymentStatus,
    /// Identifier returned by the gateway, attached after creation.
    pub gateway_link_id: Option<String>,
    /// Entitlement length this payment purchases.
    pub plan_duration_days: i32,
    pub paid_at: Option<DateTime<Utc>>,
    /// Ledger bookkeeping only; the entitlement carries its own expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Last received webhook body, kept for audit and replay diagnosis.
    pub raw_webhook: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn pending(
        user_id: Uuid,
        order_code: i64,
        amount: i64,
        plan_duration_days: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_code,
            user_id,
            amount,
            status: PaymentStatus::Pending,
            gateway_link_id: None,
            plan_duration_days,
            paid_at: None,
            expires_at: None,
            raw_webhook: None,
            created_at: now,
        }
    }
}
