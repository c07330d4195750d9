//! Suggested actions with stable ids consumed by the simulator.

use serde::{Deserialize, Serialize};

/// Stable action identifiers. The simulator dispatches on these, so the wire
/// strings never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionId {
    #[serde(rename = "improve-savings")]
    ImproveSavings,
    #[serde(rename = "optimize-expenses")]
    OptimizeExpenses,
    #[serde(rename = "accelerate-debt")]
    AccelerateDebt,
    #[serde(rename = "boost-investments")]
    BoostInvestments,
    #[serde(rename = "grow-income")]
    GrowIncome,
    #[serde(rename = "stay-the-course")]
    StayTheCourse,
}

impl ActionId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionId::ImproveSavings => "improve-savings",
            ActionId::OptimizeExpenses => "optimize-expenses",
            ActionId::AccelerateDebt => "accelerate-debt",
            ActionId::BoostInvestments => "boost-investments",
            ActionId::GrowIncome => "grow-income",
            ActionId::StayTheCourse => "stay-the-course",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "improve-savings" => Some(ActionId::ImproveSavings),
            "optimize-expenses" => Some(ActionId::OptimizeExpenses),
            "accelerate-debt" => Some(ActionId::AccelerateDebt),
            "boost-investments" => Some(ActionId::BoostInvestments),
            "grow-income" => Some(ActionId::GrowIncome),
            "stay-the-course" => Some(ActionId::StayTheCourse),
            _ => None,
        }
    }

    pub fn category(&self) -> ActionCategory {
        match self {
            ActionId::ImproveSavings | ActionId::StayTheCourse => ActionCategory::Savings,
            ActionId::OptimizeExpenses => ActionCategory::Expense,
            ActionId::AccelerateDebt => ActionCategory::Debt,
            ActionId::BoostInvestments => ActionCategory::Investment,
            ActionId::GrowIncome => ActionCategory::Income,
        }
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionCategory {
    Savings,
    Expense,
    Debt,
    Investment,
    Income,
}

impl ActionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionCategory::Savings => "savings",
            ActionCategory::Expense => "expense",
            ActionCategory::Debt => "debt",
            ActionCategory::Investment => "investment",
            ActionCategory::Income => "income",
        }
    }
}

/// A recommended next step, ordered by rule priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedAction {
    pub id: ActionId,
    pub title: String,
    pub description: String,
    pub category: ActionCategory,
    /// References the exact numeric gap that fired the rule.
    pub rationale: String,
    pub expected_impact: String,
}
