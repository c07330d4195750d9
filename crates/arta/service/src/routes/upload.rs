//! `POST /v1/upload-csv`: bulk transaction ingestion.
//!
//! Strict row cap of 2000, validated before any insert; accepted rows are
//! written in batches of 500.

use arta_governor::RouteClass;
use arta_storage::TransactionStore;
use arta_tools::derive_transaction_key;
use arta_types::{Month, Transaction, TransactionKind, ValidationIssue};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use crate::auth::{remote_addr, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Hard cap on rows per upload.
const MAX_ROWS: usize = 2000;
/// Rows per insert batch.
const BATCH_SIZE: usize = 500;

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub month: String,
    pub csv: String,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    description: String,
    amount: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    category: String,
}

fn parse_date(raw: &str, row: usize) -> Result<DateTime<Utc>, ValidationIssue> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(DateTime::from_naive_utc_and_offset(midnight, Utc));
        }
    }
    Err(ValidationIssue::new(
        format!("csv[{row}].date"),
        format!("`{raw}` is not a date"),
    ))
}

fn parse_rows(csv_text: &str, user: &arta_types::AuthenticatedUser) -> ApiResult<Vec<Transaction>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(csv_text.as_bytes());

    let mut issues: Vec<ValidationIssue> = Vec::new();
    let mut rows: Vec<Transaction> = Vec::new();

    for (index, record) in reader.deserialize::<CsvRow>().enumerate() {
        if rows.len() >= MAX_ROWS {
            return Err(ApiError::validation(vec![ValidationIssue::new(
                "csv",
                format!("row cap is {MAX_ROWS} rows"),
            )]));
        }
        let row = match record {
            Ok(row) => row,
            Err(err) => {
                issues.push(ValidationIssue::new(format!("csv[{index}]"), err.to_string()));
                continue;
            }
        };

        let amount = match Decimal::from_str(&row.amount) {
            Ok(amount) => amount.round_dp(2),
            Err(_) => {
                issues.push(ValidationIssue::new(
                    format!("csv[{index}].amount"),
                    format!("`{}` is not a decimal amount", row.amount),
                ));
                continue;
            }
        };
        let kind = match TransactionKind::parse(&row.kind) {
            Some(kind) => kind,
            None => {
                issues.push(ValidationIssue::new(
                    format!("csv[{index}].type"),
                    format!("`{}` is not a known transaction type", row.kind),
                ));
                continue;
            }
        };
        let occurred_at = match parse_date(&row.date, index) {
            Ok(at) => at,
            Err(issue) => {
                issues.push(issue);
                continue;
            }
        };

        let reference = derive_transaction_key(
            &user.tenant_id,
            &user.customer_id,
            &row.date,
            &amount.to_string(),
            &row.description,
        );
        rows.push(Transaction {
            id: Transaction::generate_id(),
            tenant_id: user.tenant_id.clone(),
            customer_id: user.customer_id.clone(),
            amount,
            currency: "MYR".to_string(),
            kind,
            category: (!row.category.is_empty()).then(|| row.category.clone()),
            description: (!row.description.is_empty()).then(|| row.description.clone()),
            occurred_at,
            metadata: serde_json::json!({ "source": "csv-upload" }),
            idempotency_handle: Some(reference),
        });
    }

    if !issues.is_empty() {
        return Err(ApiError::validation(issues));
    }
    Ok(rows)
}

pub async fn upload_csv(
    State(state): State<AppState>,
    headers: HeaderMap,
    AuthUser(user): AuthUser,
    Json(request): Json<UploadRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .limiter
        .check(RouteClass::UploadCsv, &user.user_id, &remote_addr(&headers))?;

    let month = Month::parse(&request.month)
        .map_err(|e| ApiError::validation(vec![ValidationIssue::new("month", e)]))?;

    // Validate the full file before touching the ledger: an oversized or
    // malformed upload must insert zero rows.
    let rows = parse_rows(&request.csv, &user)?;

    let mut ingested = 0usize;
    let mut batches: Vec<serde_json::Value> = Vec::new();
    for (batch_index, batch) in rows.chunks(BATCH_SIZE).enumerate() {
        let mut batch_count = 0usize;
        for transaction in batch {
            let insert = state.storage.insert_transaction(transaction.clone()).await?;
            if insert.inserted {
                ingested += 1;
            }
            batch_count += 1;
        }
        batches.push(serde_json::json!({
            "batch": batch_index + 1,
            "rowCount": batch_count,
            "month": month.as_str(),
        }));
    }

    tracing::info!(rows = rows.len(), ingested, "csv upload processed");

    Ok(Json(serde_json::json!({
        "ingestedCount": ingested,
        "batches": batches,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> arta_types::AuthenticatedUser {
        arta_types::AuthenticatedUser {
            user_id: "user-1".to_string(),
            tenant_id: "tenant-a".to_string(),
            customer_id: "cust-a".to_string(),
            roles: vec![],
        }
    }

    fn csv_of(rows: usize) -> String {
        let mut text = String::from("date,description,amount,type,category\n");
        for i in 0..rows {
            text.push_str(&format!("2024-05-11,row {i},-1000.50,expense,food\n"));
        }
        text
    }

    #[test]
    fn parses_well_formed_rows() {
        let rows = parse_rows(&csv_of(3), &user()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].kind, TransactionKind::Expense);
        assert_eq!(rows[0].category.as_deref(), Some("food"));
        assert!(rows[0].idempotency_handle.is_some());
    }

    #[test]
    fn caps_at_2000_rows() {
        assert!(parse_rows(&csv_of(2000), &user()).is_ok());
        let err = parse_rows(&csv_of(2001), &user()).unwrap_err();
        assert_eq!(err.code(), arta_types::ErrorCode::ValidationError);
    }

    #[test]
    fn bad_amount_or_type_is_collected_as_issue() {
        let text = "date,description,amount,type,category\n\
                    2024-05-11,ok,-10.00,expense,\n\
                    2024-05-12,bad amount,ten,expense,\n\
                    2024-05-13,bad type,-5.00,splurge,\n";
        let err = parse_rows(text, &user()).unwrap_err();
        let issues = err.0.details.unwrap()["issues"].as_array().unwrap().len();
        assert_eq!(issues, 2);
    }
}
