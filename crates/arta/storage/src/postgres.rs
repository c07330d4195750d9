//! PostgreSQL adapter for Arta storage.
//!
//! The transactional source-of-truth backend. Vector search is implemented
//! with deterministic in-Rust cosine scoring over stored embeddings; an
//! ANN-indexed column can be added later without changing trait surfaces.

use crate::memory::document_from;
use crate::model::{AcquireDecision, EmbeddingRecord, IdempotencyRecord, TransactionInsert};
use crate::traits::{IdempotencyStore, InsightStore, TenantStore, TransactionStore, VectorStore};
use crate::{cosine_similarity, StorageError, StorageResult};
use arta_types::{
    Customer, CustomerMetadata, Kpi, KpiKey, Month, MonthlyInsight, RetrievalDocument, Tenant,
    Transaction, TransactionKind,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// PostgreSQL-backed storage adapter with a fixed embedding dimension.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
    dimension: usize,
}

impl PostgresStorage {
    /// Connect and initialize the schema.
    pub async fn connect(database_url: &str, dimension: usize) -> StorageResult<Self> {
        Self::connect_with_options(database_url, dimension, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        dimension: usize,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool, dimension };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create the adapter from an existing pool.
    pub async fn from_pool(pool: PgPool, dimension: usize) -> StorageResult<Self> {
        let store = Self { pool, dimension };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS arta_tenants (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                metadata JSONB,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS arta_customers (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES arta_tenants(id),
                external_reference TEXT NOT NULL,
                metadata JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                UNIQUE (tenant_id, external_reference)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS arta_transactions (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                customer_id TEXT NOT NULL,
                amount NUMERIC(20, 2) NOT NULL,
                currency TEXT NOT NULL,
                kind TEXT NOT NULL,
                category TEXT,
                description TEXT,
                occurred_at TIMESTAMPTZ NOT NULL,
                metadata JSONB NOT NULL,
                external_reference TEXT NOT NULL,
                UNIQUE (tenant_id, external_reference)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS arta_idempotency (
                id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                key TEXT NOT NULL,
                request_hash TEXT NOT NULL,
                response_payload JSONB,
                locked_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ,
                PRIMARY KEY (tenant_id, key)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS arta_insights (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                month TEXT NOT NULL,
                kpis JSONB NOT NULL,
                story TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                UNIQUE (user_id, month)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS arta_embeddings (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                vector JSONB NOT NULL,
                metadata JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS arta_transactions_customer_month
                ON arta_transactions (tenant_id, customer_id, occurred_at)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS arta_embeddings_user
                ON arta_embeddings (user_id)
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl TenantStore for PostgresStorage {
    async fn ensure_tenant(&self, tenant_id: &str) -> StorageResult<Tenant> {
        let row = sqlx::query(
            r#"
            INSERT INTO arta_tenants (id, slug, metadata, created_at)
            VALUES ($1, $1, NULL, $2)
            ON CONFLICT (id) DO UPDATE SET slug = arta_tenants.slug
            RETURNING id, slug, metadata, created_at
            "#,
        )
        .bind(tenant_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        tenant_row(row)
    }

    async fn ensure_customer(
        &self,
        tenant_id: &str,
        external_reference: &str,
    ) -> StorageResult<Customer> {
        let metadata = serde_json::to_value(CustomerMetadata::default())
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let row = sqlx::query(
            r#"
            INSERT INTO arta_customers (id, tenant_id, external_reference, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, external_reference)
                DO UPDATE SET external_reference = arta_customers.external_reference
            RETURNING id, tenant_id, external_reference, metadata, created_at
            "#,
        )
        .bind(Customer::generate_id())
        .bind(tenant_id)
        .bind(external_reference)
        .bind(metadata)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        customer_row(row)
    }

    async fn get_customer(
        &self,
        tenant_id: &str,
        customer_id: &str,
    ) -> StorageResult<Option<Customer>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, external_reference, metadata, created_at
              FROM arta_customers
             WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(customer_row).transpose()
    }

    async fn update_customer_metadata(
        &self,
        tenant_id: &str,
        customer_id: &str,
        metadata: CustomerMetadata,
    ) -> StorageResult<Customer> {
        let metadata_json = serde_json::to_value(&metadata)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let row = sqlx::query(
            r#"
            UPDATE arta_customers
               SET metadata = $1
             WHERE tenant_id = $2 AND id = $3
            RETURNING id, tenant_id, external_reference, metadata, created_at
            "#,
        )
        .bind(metadata_json)
        .bind(tenant_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| StorageError::NotFound(format!("customer {customer_id} not found")))?;

        customer_row(row)
    }

    async fn list_opted_in_customers(&self, tenant_id: &str) -> StorageResult<Vec<Customer>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, external_reference, metadata, created_at
              FROM arta_customers
             WHERE tenant_id = $1
               AND (metadata #>> '{preferences,allowBenchmarking}')::BOOLEAN IS TRUE
             ORDER BY id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(customer_row).collect()
    }
}

#[async_trait]
impl TransactionStore for PostgresStorage {
    async fn insert_transaction(
        &self,
        transaction: Transaction,
    ) -> StorageResult<TransactionInsert> {
        let reference = transaction
            .idempotency_handle
            .clone()
            .unwrap_or_else(|| transaction.id.clone());

        let result = sqlx::query(
            r#"
            INSERT INTO arta_transactions
                (id, tenant_id, customer_id, amount, currency, kind, category, description,
                 occurred_at, metadata, external_reference)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (tenant_id, external_reference) DO NOTHING
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.tenant_id)
        .bind(&transaction.customer_id)
        .bind(transaction.amount)
        .bind(&transaction.currency)
        .bind(transaction.kind.as_str())
        .bind(&transaction.category)
        .bind(&transaction.description)
        .bind(transaction.occurred_at)
        .bind(&transaction.metadata)
        .bind(&reference)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() > 0 {
            let mut stored = transaction;
            stored.idempotency_handle = Some(reference);
            return Ok(TransactionInsert {
                transaction: stored,
                inserted: true,
            });
        }

        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, customer_id, amount, currency, kind, category, description,
                   occurred_at, metadata, external_reference
              FROM arta_transactions
             WHERE tenant_id = $1 AND external_reference = $2
            "#,
        )
        .bind(&transaction.tenant_id)
        .bind(&reference)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(TransactionInsert {
            transaction: transaction_row(row)?,
            inserted: false,
        })
    }

    async fn list_transactions(
        &self,
        tenant_id: &str,
        customer_id: &str,
        month: Option<&Month>,
        limit: usize,
    ) -> StorageResult<Vec<Transaction>> {
        let month_filter = month.map(|m| m.as_str().to_string());
        let rows = if limit == 0 {
            sqlx::query(
                r#"
                SELECT id, tenant_id, customer_id, amount, currency, kind, category, description,
                       occurred_at, metadata, external_reference
                  FROM arta_transactions
                 WHERE tenant_id = $1 AND customer_id = $2
                   AND ($3::TEXT IS NULL OR to_char(occurred_at, 'YYYY-MM') = $3)
                 ORDER BY occurred_at DESC
                "#,
            )
            .bind(tenant_id)
            .bind(customer_id)
            .bind(&month_filter)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT id, tenant_id, customer_id, amount, currency, kind, category, description,
                       occurred_at, metadata, external_reference
                  FROM arta_transactions
                 WHERE tenant_id = $1 AND customer_id = $2
                   AND ($3::TEXT IS NULL OR to_char(occurred_at, 'YYYY-MM') = $3)
                 ORDER BY occurred_at DESC
                 LIMIT $4
                "#,
            )
            .bind(tenant_id)
            .bind(customer_id)
            .bind(&month_filter)
            .bind(to_i64(limit)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        rows.into_iter().map(transaction_row).collect()
    }
}

#[async_trait]
impl IdempotencyStore for PostgresStorage {
    async fn acquire(
        &self,
        tenant_id: &str,
        key: &str,
        request_hash: &str,
        now: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> StorageResult<AcquireDecision> {
        // Single-statement atomic acquire. An expired row is reset as if
        // freshly inserted; a live row only gets its lock refreshed.
        let row = sqlx::query(
            r#"
            INSERT INTO arta_idempotency
                (id, tenant_id, key, request_hash, response_payload, locked_at, created_at, expires_at)
            VALUES ($1, $2, $3, $4, NULL, $5, $5, $6)
            ON CONFLICT (tenant_id, key) DO UPDATE SET
                locked_at = EXCLUDED.locked_at,
                request_hash = CASE
                    WHEN arta_idempotency.expires_at IS NOT NULL
                         AND arta_idempotency.expires_at <= EXCLUDED.created_at
                    THEN EXCLUDED.request_hash
                    ELSE arta_idempotency.request_hash
                END,
                response_payload = CASE
                    WHEN arta_idempotency.expires_at IS NOT NULL
                         AND arta_idempotency.expires_at <= EXCLUDED.created_at
                    THEN NULL
                    ELSE arta_idempotency.response_payload
                END,
                created_at = CASE
                    WHEN arta_idempotency.expires_at IS NOT NULL
                         AND arta_idempotency.expires_at <= EXCLUDED.created_at
                    THEN EXCLUDED.created_at
                    ELSE arta_idempotency.created_at
                END,
                expires_at = CASE
                    WHEN arta_idempotency.expires_at IS NOT NULL
                         AND arta_idempotency.expires_at <= EXCLUDED.created_at
                    THEN EXCLUDED.expires_at
                    ELSE arta_idempotency.expires_at
                END
            RETURNING request_hash, response_payload
            "#,
        )
        .bind(IdempotencyRecord::generate_id())
        .bind(tenant_id)
        .bind(key)
        .bind(request_hash)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let stored_hash: String = row
            .try_get("request_hash")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let payload: Option<serde_json::Value> = row
            .try_get("response_payload")
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        if stored_hash != request_hash {
            return Ok(AcquireDecision::Conflict);
        }
        match payload {
            Some(payload) => Ok(AcquireDecision::Replay(payload)),
            None => Ok(AcquireDecision::Fresh),
        }
    }

    async fn complete(
        &self,
        tenant_id: &str,
        key: &str,
        response_payload: serde_json::Value,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE arta_idempotency
               SET response_payload = $1, locked_at = NULL
             WHERE tenant_id = $2 AND key = $3
            "#,
        )
        .bind(response_payload)
        .bind(tenant_id)
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "idempotency key {key} not found"
            )));
        }
        Ok(())
    }

    async fn release(&self, tenant_id: &str, key: &str) -> StorageResult<()> {
        sqlx::query(
            r#"
            UPDATE arta_idempotency
               SET locked_at = NULL
             WHERE tenant_id = $1 AND key = $2 AND response_payload IS NULL
            "#,
        )
        .bind(tenant_id)
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl InsightStore for PostgresStorage {
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
        let kpis = serde_json::to_value(&insight.kpis)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let vector = serde_json::to_value(&embedding.vector)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        // One transaction per (insight, embedding) pair so they cannot diverge.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO arta_insights (id, user_id, month, kpis, story, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, month) DO UPDATE SET
                kpis = EXCLUDED.kpis,
                story = EXCLUDED.story,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&insight.id)
        .bind(&insight.user_id)
        .bind(insight.month.as_str())
        .bind(kpis)
        .bind(&insight.story)
        .bind(insight.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO arta_embeddings (id, user_id, vector, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                vector = EXCLUDED.vector,
                metadata = EXCLUDED.metadata,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&embedding.id)
        .bind(&embedding.user_id)
        .bind(vector)
        .bind(&embedding.metadata)
        .bind(embedding.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_insight(
        &self,
        user_id: &str,
        month: &Month,
    ) -> StorageResult<Option<MonthlyInsight>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, month, kpis, story, created_at
              FROM arta_insights
             WHERE user_id = $1 AND month = $2
            "#,
        )
        .bind(user_id)
        .bind(month.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(insight_row).transpose()
    }

    async fn list_insights(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<MonthlyInsight>> {
        let rows = if limit == 0 {
            sqlx::query(
                r#"
                SELECT id, user_id, month, kpis, story, created_at
                  FROM arta_insights
                 WHERE user_id = $1
                 ORDER BY month DESC
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT id, user_id, month, kpis, story, created_at
                  FROM arta_insights
                 WHERE user_id = $1
                 ORDER BY month DESC
                 LIMIT $2
                "#,
            )
            .bind(user_id)
            .bind(to_i64(limit)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        rows.into_iter().map(insight_row).collect()
    }
}

#[async_trait]
impl VectorStore for PostgresStorage {
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

        let rows = sqlx::query(
            r#"
            SELECT e.id, e.user_id, e.vector, e.metadata, e.created_at,
                   i.id AS insight_id, i.user_id AS insight_user_id, i.month, i.kpis,
                   i.story, i.created_at AS insight_created_at
              FROM arta_embeddings e
              JOIN arta_insights i ON i.id = e.id
             WHERE e.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut hits: Vec<(f32, EmbeddingRecord, MonthlyInsight)> = rows
            .into_iter()
            .map(|row| {
                let record = embedding_row(&row)?;
                let insight = joined_insight_row(&row)?;
                Ok::<_, StorageError>((record, insight))
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter_map(|(record, insight)| {
                cosine_similarity(query, &record.vector).map(|score| (score, record, insight))
            })
            .collect();

        hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        hits.truncate(limit.max(1));

        Ok(hits
            .into_iter()
            .map(|(score, record, insight)| document_from(&record, &insight, score))
            .collect())
    }
}

fn tenant_row(row: PgRow) -> StorageResult<Tenant> {
    Ok(Tenant {
        id: row
            .try_get("id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        slug: row
            .try_get("slug")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        metadata: row
            .try_get::<Option<serde_json::Value>, _>("metadata")
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .unwrap_or(serde_json::Value::Null),
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn customer_row(row: PgRow) -> StorageResult<Customer> {
    let metadata_json: serde_json::Value = row
        .try_get("metadata")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let metadata: CustomerMetadata = serde_json::from_value(metadata_json)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    Ok(Customer {
        id: row
            .try_get("id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        tenant_id: row
            .try_get("tenant_id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        external_reference: row
            .try_get("external_reference")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        metadata,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn transaction_row(row: PgRow) -> StorageResult<Transaction> {
    let kind_raw: String = row
        .try_get("kind")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let kind = TransactionKind::parse(&kind_raw)
        .ok_or_else(|| StorageError::Serialization(format!("unknown transaction kind `{kind_raw}`")))?;

    Ok(Transaction {
        id: row
            .try_get("id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        tenant_id: row
            .try_get("tenant_id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        customer_id: row
            .try_get("customer_id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        amount: row
            .try_get::<Decimal, _>("amount")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        currency: row
            .try_get("currency")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        kind,
        category: row
            .try_get("category")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        description: row
            .try_get("description")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        occurred_at: row
            .try_get("occurred_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        metadata: row
            .try_get("metadata")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        idempotency_handle: Some(
            row.try_get("external_reference")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
    })
}

fn insight_row(row: PgRow) -> StorageResult<MonthlyInsight> {
    let kpis_json: serde_json::Value = row
        .try_get("kpis")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let kpis: BTreeMap<KpiKey, Kpi> = serde_json::from_value(kpis_json)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let month_raw: String = row
        .try_get("month")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(MonthlyInsight {
        id: row
            .try_get("id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        user_id: row
            .try_get("user_id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        month: Month::parse(&month_raw).map_err(StorageError::Serialization)?,
        kpis,
        story: row
            .try_get("story")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn embedding_row(row: &PgRow) -> StorageResult<EmbeddingRecord> {
    let vector_json: serde_json::Value = row
        .try_get("vector")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let vector: Vec<f32> = serde_json::from_value(vector_json)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    Ok(EmbeddingRecord {
        id: row
            .try_get("id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        user_id: row
            .try_get("user_id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        vector,
        metadata: row
            .try_get("metadata")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn joined_insight_row(row: &PgRow) -> StorageResult<MonthlyInsight> {
    let kpis_json: serde_json::Value = row
        .try_get("kpis")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let kpis: BTreeMap<KpiKey, Kpi> = serde_json::from_value(kpis_json)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let month_raw: String = row
        .try_get("month")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(MonthlyInsight {
        id: row
            .try_get("insight_id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        user_id: row
            .try_get("insight_user_id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        month: Month::parse(&month_raw).map_err(StorageError::Serialization)?,
        kpis,
        story: row
            .try_get("story")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("insight_created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput("window value too large".to_string()))
}
