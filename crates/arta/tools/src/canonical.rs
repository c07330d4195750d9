//! Canonical JSON and SHA-256 helpers for idempotency hashing.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize a JSON value with every object's keys sorted, recursively.
/// Equal payloads therefore hash equally regardless of key order.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|key| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(key).unwrap_or_default(),
                        canonical_json(&map[key])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

pub fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    format!("{:x}", hasher.finalize())
}

/// Request hash for the idempotency record.
pub fn request_hash(payload: &Value) -> String {
    sha256_hex(canonical_json(payload).as_bytes())
}

/// Derived idempotency key for keyless `transactions.create` calls:
/// `SHA256(tenant ∥ customer ∥ occurredAt ∥ amount ∥ descriptionOrNotes)`
/// truncated to 24 hex chars.
pub fn derive_transaction_key(
    tenant_id: &str,
    customer_id: &str,
    occurred_at: &str,
    amount: &str,
    description_or_notes: &str,
) -> String {
    let seed = format!("{tenant_id}{customer_id}{occurred_at}{amount}{description_or_notes}");
    let mut key = sha256_hex(seed.as_bytes());
    key.truncate(24);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": [3, 4]}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": [3, 4], "y": 2}, "b": 1}"#).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(request_hash(&a), request_hash(&b));
    }

    #[test]
    fn different_payloads_hash_differently() {
        let a = serde_json::json!({ "amount": 125000 });
        let b = serde_json::json!({ "amount": 125001 });
        assert_ne!(request_hash(&a), request_hash(&b));
    }

    #[test]
    fn array_order_matters() {
        let a = serde_json::json!([1, 2]);
        let b = serde_json::json!([2, 1]);
        assert_ne!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn derived_key_is_24_hex_chars_and_stable() {
        let key = derive_transaction_key("t", "c", "2024-05-11T00:00:00Z", "-125000.00", "lunch");
        assert_eq!(key.len(), 24);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        let again =
            derive_transaction_key("t", "c", "2024-05-11T00:00:00Z", "-125000.00", "lunch");
        assert_eq!(key, again);
        let other =
            derive_transaction_key("t", "c", "2024-05-11T00:00:00Z", "-125000.00", "dinner");
        assert_ne!(key, other);
    }
}
