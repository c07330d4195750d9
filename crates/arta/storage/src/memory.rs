//! In-memory reference implementation of the storage traits.
//!
//! Deterministic and test-friendly; production deployments use the
//! PostgreSQL adapter for source-of-truth data.

use crate::cosine_similarity;
use crate::model::{AcquireDecision, EmbeddingRecord, IdempotencyRecord, TransactionInsert};
use crate::traits::{IdempotencyStore, InsightStore, TenantStore, TransactionStore, VectorStore};
use crate::{StorageError, StorageResult};
use arta_types::{
    Customer, CustomerMetadata, Month, MonthlyInsight, RetrievalDocument, Tenant, Transaction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// In-memory storage adapter.
pub struct InMemoryStorage {
    dimension: usize,
    tenants: RwLock<HashMap<String, Tenant>>,
    customers: RwLock<HashMap<(String, String), Customer>>,
    transactions: RwLock<Vec<Transaction>>,
    transaction_refs: RwLock<HashSet<(String, String)>>,
    idempotency: RwLock<HashMap<(String, String), IdempotencyRecord>>,
    insights: RwLock<HashMap<String, MonthlyInsight>>,
    embeddings: RwLock<HashMap<String, EmbeddingRecord>>,
}

impl InMemoryStorage {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            tenants: RwLock::new(HashMap::new()),
            customers: RwLock::new(HashMap::new()),
            transactions: RwLock::new(Vec::new()),
            transaction_refs: RwLock::new(HashSet::new()),
            idempotency: RwLock::new(HashMap::new()),
            insights: RwLock::new(HashMap::new()),
            embeddings: RwLock::new(HashMap::new()),
        }
    }
}

fn poisoned(what: &str) -> StorageError {
    StorageError::Backend(format!("{what} lock poisoned"))
}

#[async_trait]
impl TenantStore for InMemoryStorage {
    async fn ensure_tenant(&self, tenant_id: &str) -> StorageResult<Tenant> {
        let mut tenants = self.tenants.write().map_err(|_| poisoned("tenants"))?;
        let tenant = tenants
            .entry(tenant_id.to_string())
            .or_insert_with(|| Tenant {
                id: tenant_id.to_string(),
                slug: tenant_id.to_string(),
                metadata: serde_json::Value::Null,
                created_at: Utc::now(),
            });
        Ok(tenant.clone())
    }

    async fn ensure_customer(
        &self,
        tenant_id: &str,
        external_reference: &str,
    ) -> StorageResult<Customer> {
        let mut customers = self.customers.write().map_err(|_| poisoned("customers"))?;
        let customer = customers
            .entry((tenant_id.to_string(), external_reference.to_string()))
            .or_insert_with(|| Customer {
                id: Customer::generate_id(),
                tenant_id: tenant_id.to_string(),
                external_reference: external_reference.to_string(),
                metadata: CustomerMetadata::default(),
                created_at: Utc::now(),
            });
        Ok(customer.clone())
    }

    async fn get_customer(
        &self,
        tenant_id: &str,
        customer_id: &str,
    ) -> StorageResult<Option<Customer>> {
        let customers = self.customers.read().map_err(|_| poisoned("customers"))?;
        Ok(customers
            .values()
            .find(|c| c.tenant_id == tenant_id && c.id == customer_id)
            .cloned())
    }

    async fn update_customer_metadata(
        &self,
        tenant_id: &str,
        customer_id: &str,
        metadata: CustomerMetadata,
    ) -> StorageResult<Customer> {
        let mut customers = self.customers.write().map_err(|_| poisoned("customers"))?;
        let customer = customers
            .values_mut()
            .find(|c| c.tenant_id == tenant_id && c.id == customer_id)
            .ok_or_else(|| StorageError::NotFound(format!("customer {customer_id}")))?;
        customer.metadata = metadata;
        Ok(customer.clone())
    }

    async fn list_opted_in_customers(&self, tenant_id: &str) -> StorageResult<Vec<Customer>> {
        let customers = self.customers.read().map_err(|_| poisoned("customers"))?;
        let mut opted: Vec<Customer> = customers
            .values()
            .filter(|c| c.tenant_id == tenant_id && c.allows_benchmarking())
            .cloned()
            .collect();
        opted.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(opted)
    }
}

#[async_trait]
impl TransactionStore for InMemoryStorage {
    async fn insert_transaction(
        &self,
        transaction: Transaction,
    ) -> StorageResult<TransactionInsert> {
        let reference = transaction
            .idempotency_handle
            .clone()
            .unwrap_or_else(|| transaction.id.clone());
        let key = (transaction.tenant_id.clone(), reference);

        let mut refs = self
            .transaction_refs
            .write()
            .map_err(|_| poisoned("transaction refs"))?;
        let mut transactions = self
            .transactions
            .write()
            .map_err(|_| poisoned("transactions"))?;

        if !refs.insert(key.clone()) {
            let existing = transactions
                .iter()
                .find(|t| {
                    t.tenant_id == key.0 && t.idempotency_handle.as_deref() == Some(key.1.as_str())
                })
                .cloned()
                .ok_or_else(|| {
                    StorageError::InvariantViolation(format!(
                        "dedup reference {} has no stored row",
                        key.1
                    ))
                })?;
            return Ok(TransactionInsert {
                transaction: existing,
                inserted: false,
            });
        }

        transactions.push(transaction.clone());
        Ok(TransactionInsert {
            transaction,
            inserted: true,
        })
    }

    async fn list_transactions(
        &self,
        tenant_id: &str,
        customer_id: &str,
        month: Option<&Month>,
        limit: usize,
    ) -> StorageResult<Vec<Transaction>> {
        let transactions = self
            .transactions
            .read()
            .map_err(|_| poisoned("transactions"))?;
        let mut rows: Vec<Transaction> = transactions
            .iter()
            .filter(|t| t.tenant_id == tenant_id && t.customer_id == customer_id)
            .filter(|t| match month {
                Some(month) => t.occurred_at.format("%Y-%m").to_string() == month.as_str(),
                None => true,
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        if limit > 0 {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryStorage {
    async fn acquire(
        &self,
        tenant_id: &str,
        key: &str,
        request_hash: &str,
        now: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> StorageResult<AcquireDecision> {
        let mut records = self
            .idempotency
            .write()
            .map_err(|_| poisoned("idempotency"))?;
        let map_key = (tenant_id.to_string(), key.to_string());

        if let Some(record) = records.get_mut(&map_key) {
            let expired = record.expires_at.map(|at| at <= now).unwrap_or(false);
            if !expired {
                if record.request_hash != request_hash {
                    return Ok(AcquireDecision::Conflict);
                }
                if let Some(payload) = &record.response_payload {
                    return Ok(AcquireDecision::Replay(payload.clone()));
                }
                // In flight with the same hash: re-acquire the lock.
                record.locked_at = Some(now);
                return Ok(AcquireDecision::Fresh);
            }
        }

        records.insert(
            map_key,
            IdempotencyRecord {
                id: IdempotencyRecord::generate_id(),
                tenant_id: tenant_id.to_string(),
                key: key.to_string(),
                request_hash: request_hash.to_string(),
                response_payload: None,
                locked_at: Some(now),
                created_at: now,
                expires_at,
            },
        );
        Ok(AcquireDecision::Fresh)
    }

    async fn complete(
        &self,
        tenant_id: &str,
        key: &str,
        response_payload: serde_json::Value,
    ) -> StorageResult<()> {
        let mut records = self
            .idempotency
            .write()
            .map_err(|_| poisoned("idempotency"))?;
        let record = records
            .get_mut(&(tenant_id.to_string(), key.to_string()))
            .ok_or_else(|| StorageError::NotFound(format!("idempotency key {key}")))?;
        record.response_payload = Some(response_payload);
        record.locked_at = None;
        Ok(())
    }

    async fn release(&self, tenant_id: &str, key: &str) -> StorageResult<()> {
        let mut records = self
            .idempotency
            .write()
            .map_err(|_| poisoned("idempotency"))?;
        if let Some(record) = records.get_mut(&(tenant_id.to_string(), key.to_string())) {
            record.locked_at = None;
        }
        Ok(())
    }
}

#[async_trait]
impl InsightStore for InMemoryStorage {
    async fn upsert_insight(
        &self,
        insight: &MonthlyInsight,
        embedding: &EmbeddingRecord,
    ) -> StorageResult<()> {
        if embedding.vector.len() != self.dimension {
            return Err(StorageError::InvalidInput(format!(
                "embedding dimension {} does not match store dimension {}",
                embedding.vector.len(),
                self.dimension
            )));
        }
        let mut insights = self.insights.write().map_err(|_| poisoned("insights"))?;
        let mut embeddings = self.embeddings.write().map_err(|_| poisoned("embeddings"))?;
        insights.insert(insight.id.clone(), insight.clone());
        embeddings.insert(embedding.id.clone(), embedding.clone());
        Ok(())
    }

    async fn get_insight(
        &self,
        user_id: &str,
        month: &Month,
    ) -> StorageResult<Option<MonthlyInsight>> {
        let insights = self.insights.read().map_err(|_| poisoned("insights"))?;
        Ok(insights
            .get(&MonthlyInsight::compose_id(user_id, month))
            .cloned())
    }

    async fn list_insights(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<MonthlyInsight>> {
        let insights = self.insights.read().map_err(|_| poisoned("insights"))?;
        let mut rows: Vec<MonthlyInsight> = insights
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.month.cmp(&a.month));
        if limit > 0 {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

#[async_trait]
impl VectorStore for InMemoryStorage {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn search(
        &self,
        user_id: &str,
        query: &[f32],
        limit: usize,
    ) -> StorageResult<Vec<RetrievalDocument>> {
        if query.len() != self.dimension {
            return Err(StorageError::InvalidInput(format!(
                "query dimension {} does not match store dimension {}",
                query.len(),
                self.dimension
            )));
        }
        let embeddings = self.embeddings.read().map_err(|_| poisoned("embeddings"))?;
        let insights = self.insights.read().map_err(|_| poisoned("insights"))?;

        let mut scored: Vec<(f32, &EmbeddingRecord)> = embeddings
            .values()
            .filter(|record| record.user_id == user_id)
            .filter_map(|record| cosine_similarity(query, &record.vector).map(|s| (s, record)))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(limit.max(1));

        Ok(scored
            .into_iter()
            .filter_map(|(score, record)| {
                let insight = insights.get(&record.id)?;
                Some(document_from(record, insight, score))
            })
            .collect())
    }
}

pub(crate) fn document_from(
    record: &EmbeddingRecord,
    insight: &MonthlyInsight,
    score: f32,
) -> RetrievalDocument {
    let mut metadata = match &record.metadata {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    metadata.insert("score".to_string(), serde_json::json!(score));
    metadata.insert("month".to_string(), serde_json::json!(insight.month));
    metadata.insert(
        "kpis".to_string(),
        serde_json::to_value(&insight.kpis).unwrap_or(serde_json::Value::Null),
    );
    RetrievalDocument {
        id: record.id.clone(),
        user_id: record.user_id.clone(),
        content: insight.story.clone(),
        metadata: serde_json::Value::Object(metadata),
    }
}
