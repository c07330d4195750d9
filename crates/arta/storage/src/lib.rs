//! Persistence layer for the Arta core.
//!
//! Trait surfaces cover tenant/customer scope, the transaction ledger, the
//! idempotency records backing the tool registry, monthly insights with their
//! embeddings, and the user-scoped vector memory. Two backends implement the
//! same traits: a deterministic in-memory adapter for tests and databaseless
//! runs, and a PostgreSQL adapter as the transactional source of truth.

#![deny(unsafe_code)]

mod error;
mod memory;
mod model;
mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStorage;
pub use model::{
    AcquireDecision, EmbeddingRecord, IdempotencyRecord, TransactionInsert,
};
pub use postgres::PostgresStorage;
pub use traits::{
    CoreStorage, IdempotencyStore, InsightStore, TenantStore, TransactionStore, VectorStore,
};

/// Cosine similarity; `None` when dimensions differ or either norm is zero.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}
