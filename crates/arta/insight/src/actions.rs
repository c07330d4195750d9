//! Rule-based action suggestion.
//!
//! Rules fire in a fixed order and each id appears at most once; the
//! stay-the-course action fires only when nothing else did. Rationales quote
//! the exact numeric gap that triggered the rule.

use arta_types::{ActionId, HealthScore, KpiKey, MonthlyInsight, SuggestedAction};

/// Default goals applied when the KPI carries none.
const DEFAULT_SAVINGS_RATE_GOAL: f64 = 0.2;
const DEFAULT_EXPENSE_RATIO_GOAL: f64 = 0.5;
const DEFAULT_DEBT_TO_INCOME_GOAL: f64 = 0.35;
const DEFAULT_INVESTMENT_RATE_GOAL: f64 = 0.15;

fn action(id: ActionId, title: &str, description: &str, rationale: String, impact: &str) -> SuggestedAction {
    SuggestedAction {
        id,
        title: title.to_string(),
        description: description.to_string(),
        category: id.category(),
        rationale,
        expected_impact: impact.to_string(),
    }
}

/// Evaluate the rule table against one month's KPIs and health score.
pub fn suggest_actions(insight: &MonthlyInsight, health: &HealthScore) -> Vec<SuggestedAction> {
    let mut suggestions = Vec::new();

    let savings_rate = insight.kpi_value(KpiKey::SavingsRate);
    let savings_goal = insight
        .kpi_goal(KpiKey::SavingsRate)
        .unwrap_or(DEFAULT_SAVINGS_RATE_GOAL);
    if savings_rate < savings_goal {
        suggestions.push(action(
            ActionId::ImproveSavings,
            "Improve your savings rate",
            "Set aside a fixed share of income before discretionary spending.",
            format!(
                "Savings rate {:.0}% is {:.0} points below the {:.0}% goal",
                savings_rate * 100.0,
                (savings_goal - savings_rate) * 100.0,
                savings_goal * 100.0
            ),
            "Raises monthly savings and builds a cash buffer",
        ));
    }

    let expense_ratio = insight.kpi_value(KpiKey::ExpenseRatio);
    let expense_goal = insight
        .kpi_goal(KpiKey::ExpenseRatio)
        .unwrap_or(DEFAULT_EXPENSE_RATIO_GOAL);
    if expense_ratio > expense_goal {
        suggestions.push(action(
            ActionId::OptimizeExpenses,
            "Optimize recurring expenses",
            "Review the largest spending categories and trim recurring charges.",
            format!(
                "Expense ratio {:.0}% exceeds the {:.0}% goal by {:.0} points",
                expense_ratio * 100.0,
                expense_goal * 100.0,
                (expense_ratio - expense_goal) * 100.0
            ),
            "Cuts roughly 5% of monthly spending",
        ));
    }

    let debt_to_income = insight.kpi_value(KpiKey::DebtToIncome);
    let debt_goal = insight
        .kpi_goal(KpiKey::DebtToIncome)
        .unwrap_or(DEFAULT_DEBT_TO_INCOME_GOAL);
    if debt_to_income > debt_goal {
        suggestions.push(action(
            ActionId::AccelerateDebt,
            "Accelerate debt repayment",
            "Direct surplus cash flow at the highest-rate balance first.",
            format!(
                "Debt-to-income {:.0}% is above the {:.0}% goal by {:.0} points",
                debt_to_income * 100.0,
                debt_goal * 100.0,
                (debt_to_income - debt_goal) * 100.0
            ),
            "Shrinks outstanding debt about 5% per month",
        ));
    }

    let investment_rate = insight.kpi_value(KpiKey::InvestmentRate);
    let investment_goal = insight
        .kpi_goal(KpiKey::InvestmentRate)
        .unwrap_or(DEFAULT_INVESTMENT_RATE_GOAL);
    if investment_rate < investment_goal {
        suggestions.push(action(
            ActionId::BoostInvestments,
            "Boost investment contributions",
            "Automate a small transfer into investments every payday.",
            format!(
                "Investment rate {:.0}% trails the {:.0}% goal by {:.0} points",
                investment_rate * 100.0,
                investment_goal * 100.0,
                (investment_goal - investment_rate) * 100.0
            ),
            "Adds about 2% of income to investments monthly",
        ));
    }

    let income = insight.kpi_value(KpiKey::Income);
    let cash_flow_score = health
        .component(KpiKey::CashFlow)
        .map(|c| c.score)
        .unwrap_or(0.5);
    if income > 0.0 && cash_flow_score < 0.5 {
        suggestions.push(action(
            ActionId::GrowIncome,
            "Grow your income",
            "Negotiate rates, add a side engagement, or review pricing.",
            format!(
                "Cash flow scores {:.3}, below the 0.5 midpoint despite positive income",
                cash_flow_score
            ),
            "Lifts income roughly 3%",
        ));
    }

    if suggestions.is_empty() {
        suggestions.push(action(
            ActionId::StayTheCourse,
            "Stay the course",
            "Everything is on track; keep the current habits going.",
            format!(
                "All tracked indicators meet their goals at a health score of {:.3}",
                health.total
            ),
            "Maintains the current trajectory",
        ));
    }

    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compute_monthly, score_health};
    use arta_types::{InsightInput, Month, Transaction, TransactionKind};
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;

    fn txn(amount: f64, kind: TransactionKind) -> Transaction {
        Transaction {
            id: Transaction::generate_id(),
            tenant_id: "t".to_string(),
            customer_id: "c".to_string(),
            amount: Decimal::from_f64(amount).unwrap(),
            currency: "MYR".to_string(),
            kind,
            category: None,
            description: None,
            occurred_at: chrono::Utc::now(),
            metadata: serde_json::Value::Null,
            idempotency_handle: None,
        }
    }

    fn pipeline(transactions: Vec<Transaction>) -> Vec<SuggestedAction> {
        let input = InsightInput {
            user_id: "u".to_string(),
            month: Month::parse("2024-05").unwrap(),
            transactions,
            balances: None,
            goals: None,
            previous: None,
        };
        let insight = compute_monthly(&input).insight;
        let health = score_health(&insight);
        suggest_actions(&insight, &health)
    }

    #[test]
    fn overspending_fires_savings_expense_and_investment_rules() {
        // income 1000, expenses 950: savings rate 5%, expense ratio 95%.
        let actions = pipeline(vec![
            txn(1_000.0, TransactionKind::Income),
            txn(-950.0, TransactionKind::Expense),
        ]);
        let ids: Vec<ActionId> = actions.iter().map(|a| a.id).collect();
        assert_eq!(
            ids,
            vec![
                ActionId::ImproveSavings,
                ActionId::OptimizeExpenses,
                ActionId::BoostInvestments,
            ]
        );
    }

    #[test]
    fn ids_are_unique_and_ordered() {
        let actions = pipeline(vec![
            txn(1_000.0, TransactionKind::Income),
            txn(-950.0, TransactionKind::Expense),
            txn(-600.0, TransactionKind::Debt),
        ]);
        let mut seen = std::collections::HashSet::new();
        for action in &actions {
            assert!(seen.insert(action.id), "duplicate {:?}", action.id);
        }
    }

    #[test]
    fn healthy_month_stays_the_course() {
        // savings 55%, investments 20%, no debt: every rule passes.
        let actions = pipeline(vec![
            txn(10_000.0, TransactionKind::Income),
            txn(-4_500.0, TransactionKind::Expense),
            txn(-2_000.0, TransactionKind::Investment),
        ]);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].id, ActionId::StayTheCourse);
    }

    #[test]
    fn grow_income_needs_positive_income_and_weak_cash_flow() {
        // Heavy debt payments push cash flow negative.
        let actions = pipeline(vec![
            txn(1_000.0, TransactionKind::Income),
            txn(-400.0, TransactionKind::Expense),
            txn(-900.0, TransactionKind::Debt),
        ]);
        assert!(actions.iter().any(|a| a.id == ActionId::GrowIncome));

        // Zero income: cash flow scores 0.5 exactly, rule must not fire.
        let actions = pipeline(vec![txn(-400.0, TransactionKind::Expense)]);
        assert!(!actions.iter().any(|a| a.id == ActionId::GrowIncome));
    }

    #[test]
    fn rationale_quotes_the_gap() {
        let actions = pipeline(vec![
            txn(1_000.0, TransactionKind::Income),
            txn(-950.0, TransactionKind::Expense),
        ]);
        let savings = actions
            .iter()
            .find(|a| a.id == ActionId::ImproveSavings)
            .unwrap();
        assert!(savings.rationale.contains("5%"));
        assert!(savings.rationale.contains("20%"));
    }
}
