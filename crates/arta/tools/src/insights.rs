//! Insight pipeline tools: compute, list, score, suggest, simulate.

use std::collections::BTreeMap;

use arta_insight::kpi::INTERNAL_EMBEDDING_DIM;
use arta_insight::{compute_monthly, score_health, simulate, suggest_actions};
use arta_providers::EmbedOptions;
use arta_storage::{EmbeddingRecord, InsightStore, TransactionStore, VectorStore};
use arta_types::{
    Balances, InsightInput, KpiKey, Month, MonthlyInsight, Transaction, TransactionKind,
    ValidationIssue,
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::registry::{Tool, ToolContext, ToolFailure};

fn invalid(path: &str, message: impl Into<String>) -> ToolFailure {
    ToolFailure::Validation(vec![ValidationIssue::new(path, message)])
}

async fn load_insight(
    ctx: &ToolContext,
    month: &Month,
) -> Result<MonthlyInsight, ToolFailure> {
    ctx.storage
        .get_insight(&ctx.customer_id, month)
        .await
        .map_err(|e| ToolFailure::Internal(e.to_string()))?
        .ok_or_else(|| ToolFailure::NotFound(format!("no insight computed for {month}")))
}

// ── insights.compute ─────────────────────────────────────────────────

/// One transaction row of the compute input; either inline chat-shaped
/// fields or rows previously returned by `transactions.list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComputeTransaction {
    amount: f64,
    #[serde(default)]
    currency: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    occurred_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComputeInput {
    month: Month,
    #[serde(default)]
    transactions: Option<Vec<ComputeTransaction>>,
    #[serde(default)]
    balances: Option<Balances>,
    #[serde(default)]
    goals: Option<BTreeMap<KpiKey, f64>>,
    #[serde(default)]
    previous: Option<BTreeMap<KpiKey, f64>>,
}

fn l2_normalized(vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector;
    }
    vector.into_iter().map(|x| x / norm).collect()
}

/// `insights.compute`: run the KPI engine for one month and persist the
/// insight together with its embedding.
pub struct InsightsComputeTool;

#[async_trait]
impl Tool for InsightsComputeTool {
    fn name(&self) -> &'static str {
        "insights.compute"
    }

    async fn resolve(&self, ctx: &ToolContext, input: &Value) -> Result<Value, ToolFailure> {
        if ctx.cx.is_cancelled() {
            return Err(ToolFailure::Cancelled);
        }
        let parsed: ComputeInput = serde_json::from_value(input.clone())
            .map_err(|e| invalid("$", e.to_string()))?;

        let transactions: Vec<Transaction> = match parsed.transactions {
            Some(rows) => {
                let mut converted = Vec::with_capacity(rows.len());
                for (index, row) in rows.into_iter().enumerate() {
                    let kind = TransactionKind::parse(&row.kind).ok_or_else(|| {
                        invalid(
                            &format!("transactions[{index}].type"),
                            format!("`{}` is not a known transaction type", row.kind),
                        )
                    })?;
                    let amount = Decimal::from_f64(row.amount)
                        .map(|d| d.round_dp(2))
                        .ok_or_else(|| {
                            invalid(
                                &format!("transactions[{index}].amount"),
                                "must be a finite number",
                            )
                        })?;
                    converted.push(Transaction {
                        id: Transaction::generate_id(),
                        tenant_id: ctx.tenant_id.clone(),
                        customer_id: ctx.customer_id.clone(),
                        amount,
                        currency: row.currency.unwrap_or_else(|| "USD".to_string()),
                        kind,
                        category: row.category,
                        description: row.description,
                        occurred_at: row.occurred_at.unwrap_or_else(Utc::now),
                        metadata: Value::Null,
                        idempotency_handle: None,
                    });
                }
                converted
            }
            // No inline rows: compute over the stored ledger for that month.
            None => ctx
                .storage
                .list_transactions(&ctx.tenant_id, &ctx.customer_id, Some(&parsed.month), 0)
                .await
                .map_err(|e| ToolFailure::Internal(e.to_string()))?,
        };

        let engine_input = InsightInput {
            user_id: ctx.customer_id.clone(),
            month: parsed.month.clone(),
            transactions,
            balances: parsed.balances,
            goals: parsed.goals,
            previous: parsed.previous,
        };
        let computed = compute_monthly(&engine_input);

        let dimension = ctx.storage.dimension();
        let vector = if dimension == INTERNAL_EMBEDDING_DIM {
            computed.embedding.clone()
        } else {
            let gateway = ctx.gateway.as_ref().ok_or_else(|| {
                ToolFailure::Internal(format!(
                    "store expects {dimension}-dim vectors but no embedder is configured"
                ))
            })?;
            let outcome = gateway
                .embed(
                    &[computed.insight.story.clone()],
                    &EmbedOptions::default(),
                    &ctx.cx,
                )
                .await
                .map_err(|e| ToolFailure::Internal(e.to_string()))?;
            let vector = outcome
                .embeddings
                .into_iter()
                .next()
                .ok_or_else(|| ToolFailure::Internal("embedder returned no vector".into()))?;
            if vector.len() != dimension {
                return Err(ToolFailure::Internal(format!(
                    "embedder produced {}-dim vector for a {dimension}-dim store",
                    vector.len()
                )));
            }
            l2_normalized(vector)
        };

        let embedding = EmbeddingRecord {
            id: computed.insight.id.clone(),
            user_id: computed.insight.user_id.clone(),
            vector,
            metadata: serde_json::json!({
                "userId": computed.insight.user_id,
                "month": computed.insight.month,
            }),
            created_at: Utc::now(),
        };

        ctx.storage
            .upsert_insight(&computed.insight, &embedding)
            .await
            .map_err(|e| ToolFailure::Internal(e.to_string()))?;

        tracing::info!(
            insight_id = %computed.insight.id,
            month = %computed.insight.month,
            "monthly insight computed"
        );

        Ok(serde_json::json!({ "insight": computed.insight }))
    }
}

// ── insights.list ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsightsListInput {
    #[serde(default)]
    limit: Option<usize>,
}

/// `insights.list`: recent insights for the caller, newest month first.
pub struct InsightsListTool;

#[async_trait]
impl Tool for InsightsListTool {
    fn name(&self) -> &'static str {
        "insights.list"
    }

    async fn resolve(&self, ctx: &ToolContext, input: &Value) -> Result<Value, ToolFailure> {
        let parsed: InsightsListInput = serde_json::from_value(input.clone())
            .map_err(|e| invalid("$", e.to_string()))?;
        let insights = ctx
            .storage
            .list_insights(&ctx.customer_id, parsed.limit.unwrap_or(12).min(60))
            .await
            .map_err(|e| ToolFailure::Internal(e.to_string()))?;
        let count = insights.len();
        Ok(serde_json::json!({ "insights": insights, "count": count }))
    }
}

// ── health.score ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonthInput {
    month: Month,
}

/// `health.score`: weighted health for one computed month.
pub struct HealthScoreTool;

#[async_trait]
impl Tool for HealthScoreTool {
    fn name(&self) -> &'static str {
        "health.score"
    }

    async fn resolve(&self, ctx: &ToolContext, input: &Value) -> Result<Value, ToolFailure> {
        let parsed: MonthInput =
            serde_json::from_value(input.clone()).map_err(|e| invalid("$", e.to_string()))?;
        let insight = load_insight(ctx, &parsed.month).await?;
        let score = score_health(&insight);
        Ok(serde_json::json!({ "score": score }))
    }
}

// ── actions.suggest ──────────────────────────────────────────────────

/// `actions.suggest`: the fixed-order rule set over one month.
pub struct ActionsSuggestTool;

#[async_trait]
impl Tool for ActionsSuggestTool {
    fn name(&self) -> &'static str {
        "actions.suggest"
    }

    async fn resolve(&self, ctx: &ToolContext, input: &Value) -> Result<Value, ToolFailure> {
        let parsed: MonthInput =
            serde_json::from_value(input.clone()).map_err(|e| invalid("$", e.to_string()))?;
        let insight = load_insight(ctx, &parsed.month).await?;
        let health = score_health(&insight);
        let actions = suggest_actions(&insight, &health);
        Ok(serde_json::json!({ "actions": actions, "health": health }))
    }
}

// ── simulations.run ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulateInput {
    #[serde(default)]
    month: Option<Month>,
    #[serde(default)]
    insight_id: Option<String>,
    #[serde(default)]
    actions: Vec<String>,
}

/// `simulations.run`: project the selected actions onto a stored insight.
pub struct SimulationsRunTool;

#[async_trait]
impl Tool for SimulationsRunTool {
    fn name(&self) -> &'static str {
        "simulations.run"
    }

    async fn resolve(&self, ctx: &ToolContext, input: &Value) -> Result<Value, ToolFailure> {
        let parsed: SimulateInput =
            serde_json::from_value(input.clone()).map_err(|e| invalid("$", e.to_string()))?;

        let insight = if let Some(insight_id) = &parsed.insight_id {
            // The id embeds the owner; foreign ids are indistinguishable
            // from missing ones.
            let month = insight_id
                .strip_prefix(&format!("{}:", ctx.customer_id))
                .and_then(|raw| Month::parse(raw).ok())
                .ok_or_else(|| ToolFailure::NotFound(format!("insight {insight_id}")))?;
            load_insight(ctx, &month).await?
        } else if let Some(month) = &parsed.month {
            load_insight(ctx, month).await?
        } else {
            ctx.storage
                .list_insights(&ctx.customer_id, 1)
                .await
                .map_err(|e| ToolFailure::Internal(e.to_string()))?
                .into_iter()
                .next()
                .ok_or_else(|| ToolFailure::NotFound("no insights computed yet".into()))?
        };

        let outcome = simulate(&insight, &parsed.actions);
        Ok(serde_json::json!({
            "insight": outcome.projected_insight,
            "score": outcome.projected_health,
            "adjustments": outcome.adjustments,
        }))
    }
}
