//! Trait surfaces for the Arta persistence layer.

use crate::model::{AcquireDecision, EmbeddingRecord, TransactionInsert};
use crate::StorageResult;
use arta_types::{
    Customer, CustomerMetadata, Month, MonthlyInsight, RetrievalDocument, Tenant, Transaction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Tenant and customer scope, provisioned lazily on first authenticated use.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Ensure a tenant row exists for the id (slug defaults to the id).
    async fn ensure_tenant(&self, tenant_id: &str) -> StorageResult<Tenant>;

    /// Ensure a customer exists for `(tenant, external_reference)`.
    async fn ensure_customer(
        &self,
        tenant_id: &str,
        external_reference: &str,
    ) -> StorageResult<Customer>;

    /// Fetch one customer by row id within a tenant.
    async fn get_customer(&self, tenant_id: &str, customer_id: &str)
        -> StorageResult<Option<Customer>>;

    /// Replace a customer's metadata blob.
    async fn update_customer_metadata(
        &self,
        tenant_id: &str,
        customer_id: &str,
        metadata: CustomerMetadata,
    ) -> StorageResult<Customer>;

    /// Customers of the tenant with `allow_benchmarking == true`.
    async fn list_opted_in_customers(&self, tenant_id: &str) -> StorageResult<Vec<Customer>>;
}

/// Ledger transactions.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert with the `(tenant_id, external_reference)` dedup barrier:
    /// a duplicate reference returns the stored row with `inserted == false`.
    async fn insert_transaction(&self, transaction: Transaction)
        -> StorageResult<TransactionInsert>;

    /// List a customer's transactions, optionally restricted to one month,
    /// newest first.
    async fn list_transactions(
        &self,
        tenant_id: &str,
        customer_id: &str,
        month: Option<&Month>,
        limit: usize,
    ) -> StorageResult<Vec<Transaction>>;
}

/// Idempotency records backing the tool registry.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically insert-or-inspect the record for `(tenant, key)`.
    ///
    /// Fresh records (and expired ones) take the lock and return
    /// [`AcquireDecision::Fresh`]. Completed records with an equal hash
    /// replay; a differing hash is a conflict. An in-flight record with an
    /// equal hash re-acquires the lock and runs again.
    async fn acquire(
        &self,
        tenant_id: &str,
        key: &str,
        request_hash: &str,
        now: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> StorageResult<AcquireDecision>;

    /// Persist the response payload and clear the lock.
    async fn complete(
        &self,
        tenant_id: &str,
        key: &str,
        response_payload: serde_json::Value,
    ) -> StorageResult<()>;

    /// Clear the lock without persisting a response (resolver failure).
    async fn release(&self, tenant_id: &str, key: &str) -> StorageResult<()>;
}

/// Monthly insights with their embeddings; both written together.
#[async_trait]
pub trait InsightStore: Send + Sync {
    /// Upsert the insight and its embedding atomically, keyed by
    /// `(user_id, month)`.
    async fn upsert_insight(
        &self,
        insight: &MonthlyInsight,
        embedding: &EmbeddingRecord,
    ) -> StorageResult<()>;

    async fn get_insight(&self, user_id: &str, month: &Month)
        -> StorageResult<Option<MonthlyInsight>>;

    /// A user's insights, newest month first.
    async fn list_insights(&self, user_id: &str, limit: usize)
        -> StorageResult<Vec<MonthlyInsight>>;
}

/// User-scoped vector memory over insight embeddings.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Fixed dimension accepted by this store.
    fn dimension(&self) -> usize;

    /// Cosine top-K restricted to the user's own rows; the store owns the
    /// scope check. Results are joined back to insight content.
    async fn search(
        &self,
        user_id: &str,
        query: &[f32],
        limit: usize,
    ) -> StorageResult<Vec<RetrievalDocument>>;
}

/// Unified storage bundle consumed by the service layer.
pub trait CoreStorage:
    TenantStore + TransactionStore + IdempotencyStore + InsightStore + VectorStore + Send + Sync
{
}

impl<T> CoreStorage for T where
    T: TenantStore
        + TransactionStore
        + IdempotencyStore
        + InsightStore
        + VectorStore
        + Send
        + Sync
{
}
