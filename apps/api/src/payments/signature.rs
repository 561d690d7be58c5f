//! Deterministic field signing shared by both directions of the gateway
//! protocol: outbound payment-request authentication and inbound
//! webhook verification.
//!
//! Scheme: all fields except `signature`, keys sorted lexicographically,
//! joined as `key=value` pairs with `&`, HMAC-SHA256 over the result,
//! hex-encoded. Both sides must use the identical canonicalization or
//! signatures will never match.

use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// The field carrying the signature itself; always excluded from the
/// signed serialization.
pub const SIGNATURE_FIELD: &str = "signature";

fn render_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        // Numbers, bools and nested structures render as compact JSON.
        other => other.to_string(),
    }
}

/// Canonical `key=value&...` serialization, keys sorted, signature
/// field excluded.
pub fn canonical_string(fields: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = fields.keys().filter(|k| *k != SIGNATURE_FIELD).collect();
    keys.sort();
    keys.iter()
        .map(|k| format!("{k}={}", render_value(&fields[k.as_str()])))
        .collect::<Vec<_>>()
        .join("&")
}

fn mac(key: &str) -> HmacSha256 {
    // HMAC accepts keys of any length.
    HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC key")
}

/// Hex HMAC-SHA256 over the canonical serialization of `fields`.
pub fn sign(fields: &Map<String, Value>, key: &str) -> String {
    let mut mac = mac(key);
    mac.update(canonical_string(fields).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies the `signature` field of an object against the HMAC of its
/// remaining fields. Constant-time comparison; any absent or malformed
/// signature fails closed.
pub fn verify(fields: &Map<String, Value>, key: &str) -> bool {
    let Some(Value::String(supplied)) = fields.get(SIGNATURE_FIELD) else {
        return false;
    };
    let Ok(supplied_bytes) = hex::decode(supplied) else {
        return false;
    };
    let mut mac = mac(key);
    mac.update(canonical_string(fields).as_bytes());
    mac.verify_slice(&supplied_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEY: &str = "test-checksum-key";

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn canonical_string_sorts_keys_and_skips_signature() {
        let fields = obj(json!({
            "returnUrl": "https://app/return",
            "amount": 20000,
            "orderCode": 123456789,
            "signature": "deadbeef",
            "cancelUrl": "https://app/cancel",
            "description": "Pro 30 days",
        }));
        assert_eq!(
            canonical_string(&fields),
            "amount=20000&cancelUrl=https://app/cancel&description=Pro 30 days\
             &orderCode=123456789&returnUrl=https://app/return"
        );
    }

    #[test]
    fn sign_is_insensitive_to_insertion_order() {
        let a = obj(json!({"b": 2, "a": 1, "c": "x"}));
        let mut b = Map::new();
        b.insert("c".to_string(), json!("x"));
        b.insert("a".to_string(), json!(1));
        b.insert("b".to_string(), json!(2));
        assert_eq!(sign(&a, KEY), sign(&b, KEY));
    }

    #[test]
    fn verify_accepts_a_correctly_signed_object() {
        let mut fields = obj(json!({"orderCode": 987654321, "status": "PAID"}));
        let sig = sign(&fields, KEY);
        fields.insert(SIGNATURE_FIELD.to_string(), json!(sig));
        assert!(verify(&fields, KEY));
    }

    #[test]
    fn verify_rejects_tampered_fields_and_wrong_keys() {
        let mut fields = obj(json!({"orderCode": 987654321, "status": "PAID"}));
        let sig = sign(&fields, KEY);
        fields.insert(SIGNATURE_FIELD.to_string(), json!(sig));

        let mut tampered = fields.clone();
        tampered.insert("status".to_string(), json!("CANCELLED"));
        assert!(!verify(&tampered, KEY));

        assert!(!verify(&fields, "another-key"));
    }

    #[test]
    fn verify_fails_closed_on_missing_or_garbage_signature() {
        let fields = obj(json!({"orderCode": 1}));
        assert!(!verify(&fields, KEY));

        let with_garbage = obj(json!({"orderCode": 1, "signature": "not-hex!"}));
        assert!(!verify(&with_garbage, KEY));
    }
}
