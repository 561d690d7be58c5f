use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::payment::PaymentRecord;
use crate::payments::gateway::{self, CheckoutOrder, GatewayError};
use crate::payments::reconcile::ReconcileError;
use crate::state::AppState;
use crate::store::StoreError;

/// Attempts before giving up on finding a free order code. Collisions
/// in the 9-digit space are rare; repeated collision means something is
/// wrong with the RNG, not bad luck.
const MAX_ORDER_CODE_ATTEMPTS: u32 = 5;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    pub checkout_url: String,
    pub order_code: i64,
}

/// POST /api/v1/payment/checkout
///
/// Creates the PENDING ledger row *before* contacting the gateway, then
/// attaches the returned link id. The link attach is keyed by order
/// code and safe to re-run if the process dies in between.
pub async fn handle_checkout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<CheckoutResponse>, AppError> {
    let now = Utc::now();
    let amount = state.config.pro_price;
    let duration_days = state.config.pro_plan_duration_days;

    let mut order_code = None;
    for _ in 0..MAX_ORDER_CODE_ATTEMPTS {
        let candidate = gateway::generate_order_code();
        let record = PaymentRecord::pending(user_id, candidate, amount, duration_days, now);
        match state.payments.create_pending(&record).await {
            Ok(()) => {
                order_code = Some(candidate);
                break;
            }
            Err(StoreError::DuplicateOrder(code)) => {
                warn!(order_code = code, "order code collision, regenerating");
            }
            Err(e) => return Err(e.into()),
        }
    }
    let order_code = order_code.ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "could not allocate an order code after {MAX_ORDER_CODE_ATTEMPTS} attempts"
        ))
    })?;

    let order = CheckoutOrder {
        order_code,
        amount,
        description: format!("Pro plan {duration_days} days"),
        buyer_email: None,
        cancel_url: format!("{}/pricing?status=cancelled", state.config.app_url),
        return_url: format!("{}/dashboard?status=success", state.config.app_url),
    };
    let link = state.gateway.create_payment_link(&order).await?;
    state
        .payments
        .attach_gateway_link(order_code, &link.link_id)
        .await?;

    info!(order_code, %user_id, "checkout opened");
    Ok(Json(CheckoutResponse {
        success: true,
        checkout_url: link.checkout_url,
        order_code,
    }))
}

/// POST /api/v1/payment/webhook
///
/// Unauthenticated transport, authenticated by the HMAC signature. The
/// response depends only on signature validity and order existence;
/// internal storage failures return 5xx so the gateway retries — the
/// reconciler's claim guard makes that retry safe.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let event = state.gateway.verify_webhook(&body).map_err(|e| match e {
        GatewayError::InvalidSignature => {
            // Potential forgery attempt; reject without touching state.
            warn!("rejected webhook with invalid signature");
            AppError::InvalidSignature
        }
        GatewayError::MalformedEvent(msg) => AppError::Validation(msg),
        other => AppError::Gateway(other.to_string()),
    })?;

    match state.reconciler.reconcile(&event).await {
        Ok(outcome) => {
            info!(order_code = event.order_code, ?outcome, "webhook reconciled");
            Ok(Json(json!({ "success": true })))
        }
        Err(ReconcileError::UnknownOrder(code)) => {
            warn!(order_code = code, "webhook for unknown order");
            Err(AppError::NotFound(format!("No payment with order code {code}")))
        }
        Err(ReconcileError::Store(e)) => Err(e.into()),
    }
}
