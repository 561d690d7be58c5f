//! PayOS gateway adapter — outbound payment-link creation and inbound
//! webhook verification. This is the external protocol boundary; no
//! ledger or entitlement state is touched here.

use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::payments::signature;
use crate::store::payment::SettleOutcome;

const PAYOS_API: &str = "https://api-merchant.payos.vn";
/// Gateway success code, on both API responses and webhook events.
const CODE_OK: &str = "00";

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Webhook signature mismatch. The caller must reject the delivery
    /// without mutating any state.
    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("malformed gateway event: {0}")]
    MalformedEvent(String),

    #[error("gateway HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway rejected request (code {code}): {desc}")]
    Api { code: String, desc: String },
}

/// An order to open a checkout for. The order code is generated
/// client-side before the gateway call.
#[derive(Debug, Clone)]
pub struct CheckoutOrder {
    pub order_code: i64,
    pub amount: i64,
    pub description: String,
    pub buyer_email: Option<String>,
    pub cancel_url: String,
    pub return_url: String,
}

#[derive(Debug, Clone)]
pub struct PaymentLink {
    pub checkout_url: String,
    pub link_id: String,
}

/// A webhook event that passed signature verification. The only input
/// the reconciler accepts.
#[derive(Debug, Clone)]
pub struct VerifiedEvent {
    pub order_code: i64,
    pub outcome: SettleOutcome,
    /// Full original payload, stored on the ledger row for audit.
    pub raw: Value,
}

#[derive(Deserialize)]
struct LinkResponse {
    code: String,
    desc: String,
    data: Option<LinkData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkData {
    checkout_url: String,
    payment_link_id: String,
}

/// Samples a 9-digit numeric order code. The space is finite and
/// randomly sampled, so the checkout path must detect collisions at
/// insert time and regenerate.
pub fn generate_order_code() -> i64 {
    rand::thread_rng().gen_range(100_000_000..1_000_000_000)
}

#[derive(Clone)]
pub struct PayosClient {
    http: Client,
    base_url: String,
    client_id: String,
    api_key: String,
    checksum_key: String,
}

impl PayosClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: PAYOS_API.to_string(),
            client_id: config.payos_client_id.clone(),
            api_key: config.payos_api_key.clone(),
            checksum_key: config.payos_checksum_key.clone(),
        }
    }

    /// Opens a hosted checkout for the order. The request is signed with
    /// the same canonical `key=value&...` scheme the webhook uses.
    pub async fn create_payment_link(
        &self,
        order: &CheckoutOrder,
    ) -> Result<PaymentLink, GatewayError> {
        let signed_fields: Map<String, Value> = json!({
            "amount": order.amount,
            "cancelUrl": order.cancel_url,
            "description": order.description,
            "orderCode": order.order_code,
            "returnUrl": order.return_url,
        })
        .as_object()
        .cloned()
        .unwrap_or_default();

        let sig = signature::sign(&signed_fields, &self.checksum_key);
        let mut body = signed_fields;
        if let Some(email) = &order.buyer_email {
            body.insert("buyerEmail".to_string(), json!(email));
        }
        body.insert(signature::SIGNATURE_FIELD.to_string(), json!(sig));

        debug!(order_code = order.order_code, "creating gateway payment link");
        let response: LinkResponse = self
            .http
            .post(format!("{}/v2/payment-requests", self.base_url))
            .header("x-client-id", &self.client_id)
            .header("x-api-key", &self.api_key)
            .json(&Value::Object(body))
            .send()
            .await?
            .json()
            .await?;

        match response.data {
            Some(data) if response.code == CODE_OK => Ok(PaymentLink {
                checkout_url: data.checkout_url,
                link_id: data.payment_link_id,
            }),
            _ => Err(GatewayError::Api {
                code: response.code,
                desc: response.desc,
            }),
        }
    }

    /// Authenticates and decodes a webhook delivery. A signature
    /// mismatch is an outright rejection; nothing downstream may run.
    pub fn verify_webhook(&self, body: &Value) -> Result<VerifiedEvent, GatewayError> {
        let fields = body
            .as_object()
            .ok_or_else(|| GatewayError::MalformedEvent("payload is not an object".into()))?;

        if !signature::verify(fields, &self.checksum_key) {
            return Err(GatewayError::InvalidSignature);
        }

        let code = fields.get("code").and_then(Value::as_str).unwrap_or("");
        let data = fields
            .get("data")
            .and_then(Value::as_object)
            .ok_or_else(|| GatewayError::MalformedEvent("missing data object".into()))?;

        let order_code = data
            .get("orderCode")
            .and_then(Value::as_i64)
            .ok_or_else(|| GatewayError::MalformedEvent("missing data.orderCode".into()))?;

        let status = data.get("status").and_then(Value::as_str).unwrap_or("");
        let outcome = match (code, status) {
            (CODE_OK, "PAID") => SettleOutcome::Paid,
            (_, "CANCELLED") => SettleOutcome::Cancelled,
            (_, "EXPIRED") => SettleOutcome::Expired,
            _ => {
                return Err(GatewayError::MalformedEvent(format!(
                    "unrecognized event (code {code:?}, status {status:?})"
                )))
            }
        };

        Ok(VerifiedEvent {
            order_code,
            outcome,
            raw: body.clone(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
