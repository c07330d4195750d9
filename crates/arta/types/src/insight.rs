//! Monthly insight: the per-user, per-month KPI set plus narrative.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;

/// Calendar month in `YYYY-MM` form, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Month(String);

impl Month {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let bytes = raw.as_bytes();
        let shape_ok = bytes.len() == 7
            && bytes[4] == b'-'
            && bytes[..4].iter().all(|b| b.is_ascii_digit())
            && bytes[5..].iter().all(|b| b.is_ascii_digit());
        if !shape_ok {
            return Err(format!("month must be YYYY-MM, got `{raw}`"));
        }
        let month: u8 = raw[5..7].parse().map_err(|_| "month out of range")?;
        if !(1..=12).contains(&month) {
            return Err(format!("month component out of range in `{raw}`"));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Month {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Month::parse(&value)
    }
}

impl From<Month> for String {
    fn from(value: Month) -> Self {
        value.0
    }
}

impl std::fmt::Display for Month {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical KPI keys. Serialized exactly as the wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KpiKey {
    #[serde(rename = "income")]
    Income,
    #[serde(rename = "expenses")]
    Expenses,
    #[serde(rename = "investments")]
    Investments,
    #[serde(rename = "debtPayments")]
    DebtPayments,
    #[serde(rename = "cashFlow")]
    CashFlow,
    #[serde(rename = "savingsRate")]
    SavingsRate,
    #[serde(rename = "investmentRate")]
    InvestmentRate,
    #[serde(rename = "debtToIncome")]
    DebtToIncome,
    #[serde(rename = "expenseRatio")]
    ExpenseRatio,
    #[serde(rename = "debtOutstanding")]
    DebtOutstanding,
    #[serde(rename = "netWorth")]
    NetWorth,
    #[serde(rename = "topExpenseCategory")]
    TopExpenseCategory,
}

impl KpiKey {
    pub const ALL: [KpiKey; 12] = [
        KpiKey::Income,
        KpiKey::Expenses,
        KpiKey::Investments,
        KpiKey::DebtPayments,
        KpiKey::CashFlow,
        KpiKey::SavingsRate,
        KpiKey::InvestmentRate,
        KpiKey::DebtToIncome,
        KpiKey::ExpenseRatio,
        KpiKey::DebtOutstanding,
        KpiKey::NetWorth,
        KpiKey::TopExpenseCategory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KpiKey::Income => "income",
            KpiKey::Expenses => "expenses",
            KpiKey::Investments => "investments",
            KpiKey::DebtPayments => "debtPayments",
            KpiKey::CashFlow => "cashFlow",
            KpiKey::SavingsRate => "savingsRate",
            KpiKey::InvestmentRate => "investmentRate",
            KpiKey::DebtToIncome => "debtToIncome",
            KpiKey::ExpenseRatio => "expenseRatio",
            KpiKey::DebtOutstanding => "debtOutstanding",
            KpiKey::NetWorth => "netWorth",
            KpiKey::TopExpenseCategory => "topExpenseCategory",
        }
    }

    pub fn default_label(&self) -> &'static str {
        match self {
            KpiKey::Income => "Income",
            KpiKey::Expenses => "Expenses",
            KpiKey::Investments => "Investments",
            KpiKey::DebtPayments => "Debt payments",
            KpiKey::CashFlow => "Cash flow",
            KpiKey::SavingsRate => "Savings rate",
            KpiKey::InvestmentRate => "Investment rate",
            KpiKey::DebtToIncome => "Debt-to-income",
            KpiKey::ExpenseRatio => "Expense ratio",
            KpiKey::DebtOutstanding => "Outstanding debt",
            KpiKey::NetWorth => "Net worth",
            KpiKey::TopExpenseCategory => "Top expense category",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KpiUnit {
    Currency,
    Ratio,
    Percentage,
}

/// A named numeric indicator. `label` doubles as the category name for
/// `topExpenseCategory`, where `value` is the share of total expenses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpi {
    pub key: KpiKey,
    pub label: String,
    pub value: f64,
    pub unit: KpiUnit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<f64>,
}

impl Kpi {
    pub fn new(key: KpiKey, value: f64, unit: KpiUnit) -> Self {
        Self {
            key,
            label: key.default_label().to_string(),
            value,
            unit,
            delta: None,
            goal: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn with_goal(mut self, goal: Option<f64>) -> Self {
        self.goal = goal;
        self
    }
}

/// Per-user, per-month aggregate view. At most one per `(user, month)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyInsight {
    /// `"{user_id}:{month}"`.
    pub id: String,
    pub user_id: String,
    pub month: Month,
    pub kpis: BTreeMap<KpiKey, Kpi>,
    pub story: String,
    pub created_at: DateTime<Utc>,
}

impl MonthlyInsight {
    pub fn compose_id(user_id: &str, month: &Month) -> String {
        format!("{user_id}:{month}")
    }

    pub fn kpi_value(&self, key: KpiKey) -> f64 {
        self.kpis.get(&key).map(|k| k.value).unwrap_or(0.0)
    }

    pub fn kpi_goal(&self, key: KpiKey) -> Option<f64> {
        self.kpis.get(&key).and_then(|k| k.goal)
    }
}

/// Account balances snapshot feeding net-worth and debt KPIs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balances {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investments: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debt: Option<Decimal>,
}

/// Input to the KPI engine. Decimal arithmetic up to this boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightInput {
    pub user_id: String,
    pub month: Month,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balances: Option<Balances>,
    /// Per-KPI goal overrides keyed by canonical KPI name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<BTreeMap<KpiKey, f64>>,
    /// Prior-month KPI values used for deltas (only `netWorth` today).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<BTreeMap<KpiKey, f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_accepts_valid_rejects_invalid() {
        assert!(Month::parse("2024-05").is_ok());
        assert!(Month::parse("2024-12").is_ok());
        assert!(Month::parse("2024-13").is_err());
        assert!(Month::parse("2024-00").is_err());
        assert!(Month::parse("202405").is_err());
        assert!(Month::parse("2024-5").is_err());
    }

    #[test]
    fn month_deserializes_with_validation() {
        let ok: Result<Month, _> = serde_json::from_str("\"2024-05\"");
        assert!(ok.is_ok());
        let bad: Result<Month, _> = serde_json::from_str("\"May 2024\"");
        assert!(bad.is_err());
    }

    #[test]
    fn kpi_keys_serialize_to_wire_names() {
        let json = serde_json::to_string(&KpiKey::TopExpenseCategory).unwrap();
        assert_eq!(json, "\"topExpenseCategory\"");
        for key in KpiKey::ALL {
            let round: KpiKey =
                serde_json::from_str(&serde_json::to_string(&key).unwrap()).unwrap();
            assert_eq!(round, key);
        }
    }

    #[test]
    fn kpi_map_uses_string_keys_in_json() {
        let mut kpis = BTreeMap::new();
        kpis.insert(
            KpiKey::SavingsRate,
            Kpi::new(KpiKey::SavingsRate, 0.2, KpiUnit::Ratio),
        );
        let insight = MonthlyInsight {
            id: "u1:2024-05".to_string(),
            user_id: "u1".to_string(),
            month: Month::parse("2024-05").unwrap(),
            kpis,
            story: String::new(),
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&insight).unwrap();
        assert!(value["kpis"]["savingsRate"]["value"].is_number());
    }
}
