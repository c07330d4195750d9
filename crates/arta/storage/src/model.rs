//! Storage-level records that do not belong to the shared domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored embedding row; exactly one per insight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Insight id (`"{user_id}:{month}"`).
    pub id: String,
    pub user_id: String,
    /// Fixed dimension, L2-normalised (or all-zero).
    pub vector: Vec<f32>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Cross-request idempotency record for tool invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub id: String,
    pub tenant_id: String,
    /// Unique per tenant.
    pub key: String,
    /// SHA-256 of the canonical request payload.
    pub request_hash: String,
    /// Set exactly when the invocation completed.
    pub response_payload: Option<serde_json::Value>,
    /// Set while a resolver run is in flight.
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl IdempotencyRecord {
    pub fn generate_id() -> String {
        format!("idem-{}", uuid::Uuid::new_v4())
    }
}

/// Outcome of the atomic idempotency acquisition step.
#[derive(Debug, Clone)]
pub enum AcquireDecision {
    /// No completed record; the caller owns the lock and must run the resolver.
    Fresh,
    /// A completed record exists with the same request hash.
    Replay(serde_json::Value),
    /// A record exists with a different request hash.
    Conflict,
}

/// Result of a ledger insert guarded by the secondary dedup barrier.
#[derive(Debug, Clone)]
pub struct TransactionInsert {
    pub transaction: arta_types::Transaction,
    /// False when `(tenant_id, external_reference)` already existed.
    pub inserted: bool,
}
