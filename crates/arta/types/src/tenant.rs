//! Tenant and customer scope types.
//!
//! Tenants are the hard isolation boundary: every per-user row hangs off a
//! tenant id and cross-tenant access is a fatal scope error. Customers are
//! created lazily on first authenticated use and carry their privacy and
//! profile settings in metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level isolation boundary. Immutable id, unique slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn generate_id() -> String {
        format!("tenant-{}", uuid::Uuid::new_v4())
    }
}

/// Per-tenant end user. `external_reference` is the identity the token's
/// `sub` claim carries and is unique within the tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub tenant_id: String,
    pub external_reference: String,
    #[serde(default)]
    pub metadata: CustomerMetadata,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn generate_id() -> String {
        format!("cust-{}", uuid::Uuid::new_v4())
    }

    pub fn allows_benchmarking(&self) -> bool {
        self.metadata.preferences.allow_benchmarking
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerMetadata {
    #[serde(default)]
    pub preferences: CustomerPreferences,
    #[serde(default)]
    pub profile: CustomerProfile,
    /// Any other tenant- or app-specific metadata travels through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// User-tunable preferences. `allow_benchmarking` is the privacy opt-in gate
/// for the aggregation views.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPreferences {
    #[serde(default)]
    pub allow_benchmarking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<serde_json::Value>,
}

/// Cohort attributes for benchmarking. Missing fields bucket into "unknown".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income_band: Option<String>,
}

/// Verified request identity, resolved once per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    /// The token's `sub` claim (the customer's external reference).
    pub user_id: String,
    pub tenant_id: String,
    /// Row id of the (lazily created) customer.
    pub customer_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_defaults_to_opted_out() {
        let customer = Customer {
            id: Customer::generate_id(),
            tenant_id: Tenant::generate_id(),
            external_reference: "user-1".to_string(),
            metadata: CustomerMetadata::default(),
            created_at: Utc::now(),
        };
        assert!(!customer.allows_benchmarking());
    }

    #[test]
    fn metadata_round_trips_unknown_fields() {
        let raw = serde_json::json!({
            "preferences": { "allowBenchmarking": true },
            "profile": { "region": "ID-JK", "incomeBand": "mid" },
            "onboarding": { "step": 3 }
        });
        let meta: CustomerMetadata = serde_json::from_value(raw).unwrap();
        assert!(meta.preferences.allow_benchmarking);
        assert_eq!(meta.profile.region.as_deref(), Some("ID-JK"));
        assert!(meta.extra.contains_key("onboarding"));
    }
}
