//! Ledger transactions.
//!
//! Amounts are fixed-point decimals end-to-end through storage; float math
//! only starts inside the KPI engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Transaction type as declared by the caller or extracted from chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
    Investment,
    Debt,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
            TransactionKind::Investment => "investment",
            TransactionKind::Debt => "debt",
            TransactionKind::Transfer => "transfer",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "income" => Some(TransactionKind::Income),
            "expense" => Some(TransactionKind::Expense),
            "investment" => Some(TransactionKind::Investment),
            "debt" => Some(TransactionKind::Debt),
            "transfer" => Some(TransactionKind::Transfer),
            _ => None,
        }
    }
}

/// A single ledger entry, always owned by exactly one customer of one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub tenant_id: String,
    pub customer_id: String,
    /// Signed fixed-point amount (20.2).
    pub amount: Decimal,
    /// ISO 4217 code, 3 ASCII letters.
    pub currency: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// The idempotency key (supplied or derived) that guarded the insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_handle: Option<String>,
}

impl Transaction {
    pub fn generate_id() -> String {
        format!("txn-{}", uuid::Uuid::new_v4())
    }
}

/// Valid ISO 4217 shape: exactly three ASCII uppercase letters.
pub fn valid_currency(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;

    #[test]
    fn kind_round_trip() {
        for kind in [
            TransactionKind::Income,
            TransactionKind::Expense,
            TransactionKind::Investment,
            TransactionKind::Debt,
            TransactionKind::Transfer,
        ] {
            assert_eq!(TransactionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TransactionKind::parse("refund"), None);
    }

    #[test]
    fn serializes_kind_under_type_key() {
        let txn = Transaction {
            id: Transaction::generate_id(),
            tenant_id: "tenant-a".to_string(),
            customer_id: "cust-a".to_string(),
            amount: Decimal::from_f64(-125000.0).unwrap(),
            currency: "IDR".to_string(),
            kind: TransactionKind::Expense,
            category: Some("food".to_string()),
            description: Some("lunch".to_string()),
            occurred_at: Utc::now(),
            metadata: serde_json::Value::Null,
            idempotency_handle: None,
        };
        let value = serde_json::to_value(&txn).unwrap();
        assert_eq!(value["type"], "expense");
        assert_eq!(value["currency"], "IDR");
    }

    #[test]
    fn currency_shape() {
        assert!(valid_currency("IDR"));
        assert!(valid_currency("MYR"));
        assert!(!valid_currency("idr"));
        assert!(!valid_currency("EURO"));
        assert!(!valid_currency(""));
    }
}
