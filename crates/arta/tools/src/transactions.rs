//! Ledger tools: `transactions.create` and `transactions.list`.

use arta_storage::TransactionStore;
use arta_types::{Month, Transaction, TransactionKind, ValidationIssue};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::canonical::derive_transaction_key;
use crate::registry::{Tool, ToolContext, ToolFailure};

/// Caller-supplied transaction fields; the extractor output deserializes
/// into this shape directly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionDraft {
    amount: Option<f64>,
    currency: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    occurred_at: Option<String>,
    merchant: Option<String>,
    category: Option<String>,
    notes: Option<String>,
    description: Option<String>,
    #[serde(default)]
    raw_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateInput {
    transaction: TransactionDraft,
    #[serde(default)]
    idempotency_key: Option<String>,
}

fn parse_occurred_at(raw: Option<&str>) -> Result<DateTime<Utc>, ValidationIssue> {
    let Some(raw) = raw else {
        return Ok(Utc::now());
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(DateTime::from_naive_utc_and_offset(midnight, Utc));
        }
    }
    Err(ValidationIssue::new(
        "transaction.occurredAt",
        format!("`{raw}` is neither RFC 3339 nor YYYY-MM-DD"),
    ))
}

fn parse_create(ctx: &ToolContext, input: &Value) -> Result<(Transaction, String), ToolFailure> {
    let parsed: CreateInput = serde_json::from_value(input.clone())
        .map_err(|e| ToolFailure::Validation(vec![ValidationIssue::new("$", e.to_string())]))?;
    let draft = parsed.transaction;

    let mut issues = Vec::new();

    let amount = match draft.amount {
        Some(amount) if amount != 0.0 && amount.is_finite() => {
            Decimal::from_f64(amount).map(|d| d.round_dp(2))
        }
        Some(_) => {
            issues.push(ValidationIssue::new(
                "transaction.amount",
                "must be a non-zero finite number",
            ));
            None
        }
        None => {
            issues.push(ValidationIssue::new("transaction.amount", "is required"));
            None
        }
    };

    let currency = match draft.currency.as_deref() {
        Some(code) if arta_types::valid_currency(code) => Some(code.to_string()),
        Some(code) => {
            issues.push(ValidationIssue::new(
                "transaction.currency",
                format!("`{code}` is not a 3-letter ISO 4217 code"),
            ));
            None
        }
        None => {
            issues.push(ValidationIssue::new("transaction.currency", "is required"));
            None
        }
    };

    let kind = match draft.kind.as_deref() {
        Some(raw) => match TransactionKind::parse(raw) {
            Some(kind) => kind,
            None => {
                issues.push(ValidationIssue::new(
                    "transaction.type",
                    format!("`{raw}` is not a known transaction type"),
                ));
                TransactionKind::Expense
            }
        },
        // Chat-recorded spending defaults to an expense.
        None => TransactionKind::Expense,
    };

    let occurred_at = match parse_occurred_at(draft.occurred_at.as_deref()) {
        Ok(at) => at,
        Err(issue) => {
            issues.push(issue);
            Utc::now()
        }
    };

    if !issues.is_empty() {
        return Err(ToolFailure::Validation(issues));
    }
    let amount = amount.ok_or_else(|| ToolFailure::Internal("amount parse failed".into()))?;
    let currency = currency.ok_or_else(|| ToolFailure::Internal("currency missing".into()))?;

    let description = draft
        .description
        .clone()
        .or_else(|| draft.merchant.clone())
        .or_else(|| draft.raw_text.clone());
    let description_or_notes = draft
        .description
        .clone()
        .or_else(|| draft.notes.clone())
        .unwrap_or_default();

    // Derivation reads the raw occurredAt text so the key stays identical
    // between the acquire step and the resolver run.
    let key = parsed.idempotency_key.unwrap_or_else(|| {
        derive_transaction_key(
            &ctx.tenant_id,
            &ctx.customer_id,
            draft.occurred_at.as_deref().unwrap_or_default(),
            &amount.to_string(),
            &description_or_notes,
        )
    });

    let metadata = serde_json::json!({
        "merchant": draft.merchant,
        "notes": draft.notes,
        "rawText": draft.raw_text,
    });

    Ok((
        Transaction {
            id: Transaction::generate_id(),
            tenant_id: ctx.tenant_id.clone(),
            customer_id: ctx.customer_id.clone(),
            amount,
            currency,
            kind,
            category: draft.category,
            description,
            occurred_at,
            metadata,
            idempotency_handle: Some(key.clone()),
        },
        key,
    ))
}

/// `transactions.create`: validated, doubly-deduplicated ledger insert.
pub struct TransactionsCreateTool;

#[async_trait]
impl Tool for TransactionsCreateTool {
    fn name(&self) -> &'static str {
        "transactions.create"
    }

    /// Derive a deterministic fallback key so keyless calls still
    /// deduplicate across requests.
    fn idempotency_key(&self, ctx: &ToolContext, input: &Value) -> Option<String> {
        match parse_create(ctx, input) {
            Ok((_, key)) => Some(key),
            // Invalid inputs skip idempotency and fail in resolve.
            Err(_) => None,
        }
    }

    async fn resolve(&self, ctx: &ToolContext, input: &Value) -> Result<Value, ToolFailure> {
        if ctx.cx.is_cancelled() {
            return Err(ToolFailure::Cancelled);
        }
        let (transaction, _key) = parse_create(ctx, input)?;

        let inserted = ctx
            .storage
            .insert_transaction(transaction)
            .await
            .map_err(|e| ToolFailure::Internal(e.to_string()))?;

        tracing::info!(
            transaction_id = %inserted.transaction.id,
            inserted = inserted.inserted,
            "transaction persisted"
        );

        Ok(serde_json::json!({
            "transaction": inserted.transaction,
            "inserted": inserted.inserted,
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListInput {
    #[serde(default)]
    month: Option<Month>,
    #[serde(default)]
    limit: Option<usize>,
}

/// `transactions.list`: a customer's ledger, optionally month-scoped.
pub struct TransactionsListTool;

#[async_trait]
impl Tool for TransactionsListTool {
    fn name(&self) -> &'static str {
        "transactions.list"
    }

    async fn resolve(&self, ctx: &ToolContext, input: &Value) -> Result<Value, ToolFailure> {
        let parsed: ListInput = serde_json::from_value(input.clone())
            .map_err(|e| ToolFailure::Validation(vec![ValidationIssue::new("$", e.to_string())]))?;
        let limit = parsed.limit.unwrap_or(100).min(500);

        let transactions = ctx
            .storage
            .list_transactions(
                &ctx.tenant_id,
                &ctx.customer_id,
                parsed.month.as_ref(),
                limit,
            )
            .await
            .map_err(|e| ToolFailure::Internal(e.to_string()))?;

        let count = transactions.len();
        Ok(serde_json::json!({
            "transactions": transactions,
            "count": count,
        }))
    }
}
