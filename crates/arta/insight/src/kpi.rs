//! Monthly KPI computation.
//!
//! `compute_monthly` is referentially transparent: the same input yields the
//! same KPI values byte-for-byte (`created_at` excepted). Transaction sums
//! run in `Decimal`; derived ratios and everything downstream are `f64`.

use std::collections::BTreeMap;

use arta_types::{
    Balances, InsightInput, Kpi, KpiKey, KpiUnit, MonthlyInsight, TransactionKind,
};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::story::build_story;

/// Dimension of the internal fallback embedding.
pub const INTERNAL_EMBEDDING_DIM: usize = 7;

/// KPI set plus the deterministic fallback embedding, ready for upsert.
#[derive(Debug, Clone)]
pub struct ComputedInsight {
    pub insight: MonthlyInsight,
    /// L2-normalised, [`INTERNAL_EMBEDDING_DIM`]-dimensional.
    pub embedding: Vec<f32>,
}

pub fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

/// Compute the full KPI set, narrative and fallback embedding for one month.
pub fn compute_monthly(input: &InsightInput) -> ComputedInsight {
    let mut income_d = Decimal::ZERO;
    let mut expenses_d = Decimal::ZERO;
    let mut investments_d = Decimal::ZERO;
    let mut debt_payments_d = Decimal::ZERO;
    let mut by_category: BTreeMap<String, Decimal> = BTreeMap::new();

    for txn in &input.transactions {
        let magnitude = txn.amount.abs();
        match txn.kind {
            TransactionKind::Income => income_d += magnitude,
            TransactionKind::Expense => {
                expenses_d += magnitude;
                if let Some(category) = &txn.category {
                    *by_category.entry(category.clone()).or_default() += magnitude;
                }
            }
            TransactionKind::Investment => investments_d += magnitude,
            TransactionKind::Debt => debt_payments_d += magnitude,
            TransactionKind::Transfer => {}
        }
    }

    let income = to_f64(income_d);
    let expenses = to_f64(expenses_d);
    let investments = to_f64(investments_d);
    let debt_payments = to_f64(debt_payments_d);
    let cash_flow = income - expenses - investments - debt_payments;

    let savings_rate = if income > 0.0 {
        clamp((income - expenses) / income, 0.0, 1.5)
    } else {
        0.0
    };
    let investment_rate = if income > 0.0 {
        clamp(investments / income, 0.0, 1.5)
    } else {
        0.0
    };
    let expense_ratio = if income > 0.0 {
        clamp(expenses / income, 0.0, 2.0)
    } else {
        0.0
    };

    let balances = input.balances.clone().unwrap_or_default();
    let debt_outstanding = balance(&balances, |b| b.debt);
    let debt_to_income = if income > 0.0 {
        clamp(debt_outstanding / income, 0.0, 2.0)
    } else {
        0.0
    };
    let net_worth = balance(&balances, |b| b.cash) + balance(&balances, |b| b.investments)
        - debt_outstanding;
    let net_worth_delta = input
        .previous
        .as_ref()
        .and_then(|prev| prev.get(&KpiKey::NetWorth))
        .map(|prev| net_worth - prev);

    let (top_label, top_share) = top_expense_category(&by_category, expenses_d);

    let goal = |key: KpiKey| input.goals.as_ref().and_then(|g| g.get(&key).copied());

    let mut kpis = BTreeMap::new();
    let mut put = |kpi: Kpi| {
        kpis.insert(kpi.key, kpi);
    };
    put(Kpi::new(KpiKey::Income, income, KpiUnit::Currency).with_goal(goal(KpiKey::Income)));
    put(Kpi::new(KpiKey::Expenses, expenses, KpiUnit::Currency).with_goal(goal(KpiKey::Expenses)));
    put(Kpi::new(KpiKey::Investments, investments, KpiUnit::Currency)
        .with_goal(goal(KpiKey::Investments)));
    put(Kpi::new(KpiKey::DebtPayments, debt_payments, KpiUnit::Currency)
        .with_goal(goal(KpiKey::DebtPayments)));
    put(Kpi::new(KpiKey::CashFlow, cash_flow, KpiUnit::Currency).with_goal(goal(KpiKey::CashFlow)));
    put(Kpi::new(KpiKey::SavingsRate, savings_rate, KpiUnit::Ratio)
        .with_goal(goal(KpiKey::SavingsRate)));
    put(Kpi::new(KpiKey::InvestmentRate, investment_rate, KpiUnit::Ratio)
        .with_goal(goal(KpiKey::InvestmentRate)));
    put(Kpi::new(KpiKey::DebtToIncome, debt_to_income, KpiUnit::Ratio)
        .with_goal(goal(KpiKey::DebtToIncome)));
    put(Kpi::new(KpiKey::ExpenseRatio, expense_ratio, KpiUnit::Ratio)
        .with_goal(goal(KpiKey::ExpenseRatio)));
    put(Kpi::new(KpiKey::DebtOutstanding, debt_outstanding, KpiUnit::Currency)
        .with_goal(goal(KpiKey::DebtOutstanding)));
    let mut net_worth_kpi =
        Kpi::new(KpiKey::NetWorth, net_worth, KpiUnit::Currency).with_goal(goal(KpiKey::NetWorth));
    if let Some(delta) = net_worth_delta {
        net_worth_kpi = net_worth_kpi.with_delta(delta);
    }
    put(net_worth_kpi);
    put(
        Kpi::new(KpiKey::TopExpenseCategory, top_share, KpiUnit::Percentage)
            .with_label(top_label),
    );

    let story = build_story(&input.month, &kpis, None);
    let embedding = internal_embedding(&kpis);

    ComputedInsight {
        insight: MonthlyInsight {
            id: MonthlyInsight::compose_id(&input.user_id, &input.month),
            user_id: input.user_id.clone(),
            month: input.month.clone(),
            kpis,
            story,
            created_at: Utc::now(),
        },
        embedding,
    }
}

/// Fallback 7-dim embedding over the KPI set, L2-normalised.
///
/// Layout: `[income, expenses, cashFlow] / scale` clamped to [-1, 1] with
/// `scale = max(income, expenses, |cashFlow|, 1)`, then `savingsRate,
/// investmentRate, debtToIncome, expenseRatio` clamped to [0, 1].
pub fn internal_embedding(kpis: &BTreeMap<KpiKey, Kpi>) -> Vec<f32> {
    let value = |key: KpiKey| kpis.get(&key).map(|k| k.value).unwrap_or(0.0);
    let income = value(KpiKey::Income);
    let expenses = value(KpiKey::Expenses);
    let cash_flow = value(KpiKey::CashFlow);
    let scale = income.max(expenses).max(cash_flow.abs()).max(1.0);

    let raw = [
        clamp(income / scale, -1.0, 1.0),
        clamp(expenses / scale, -1.0, 1.0),
        clamp(cash_flow / scale, -1.0, 1.0),
        clamp(value(KpiKey::SavingsRate), 0.0, 1.0),
        clamp(value(KpiKey::InvestmentRate), 0.0, 1.0),
        clamp(value(KpiKey::DebtToIncome), 0.0, 1.0),
        clamp(value(KpiKey::ExpenseRatio), 0.0, 1.0),
    ];
    l2_normalize(&raw)
}

fn l2_normalize(raw: &[f64]) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 {
        return raw.iter().map(|_| 0.0).collect();
    }
    raw.iter().map(|x| (x / norm) as f32).collect()
}

fn top_expense_category(
    by_category: &BTreeMap<String, Decimal>,
    total_expenses: Decimal,
) -> (String, f64) {
    if by_category.is_empty() || total_expenses <= Decimal::ZERO {
        return ("general expenses".to_string(), 0.0);
    }
    let mut best: Option<(&String, Decimal)> = None;
    for (category, amount) in by_category {
        match best {
            // Strict comparison keeps the lexicographically-first category on ties.
            Some((_, current)) if *amount <= current => {}
            _ => best = Some((category, *amount)),
        }
    }
    match best {
        Some((category, amount)) => {
            let share = to_f64(amount) / to_f64(total_expenses);
            (category.clone(), clamp(share, 0.0, 1.0))
        }
        None => ("general expenses".to_string(), 0.0),
    }
}

fn balance(balances: &Balances, pick: impl Fn(&Balances) -> Option<Decimal>) -> f64 {
    pick(balances).map(to_f64).unwrap_or(0.0)
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arta_types::{Month, Transaction};
    use rust_decimal::prelude::FromPrimitive;

    fn txn(amount: f64, kind: TransactionKind, category: Option<&str>) -> Transaction {
        Transaction {
            id: Transaction::generate_id(),
            tenant_id: "tenant-a".to_string(),
            customer_id: "cust-a".to_string(),
            amount: Decimal::from_f64(amount).expect("finite amount"),
            currency: "IDR".to_string(),
            kind,
            category: category.map(str::to_string),
            description: None,
            occurred_at: Utc::now(),
            metadata: serde_json::Value::Null,
            idempotency_handle: None,
        }
    }

    fn base_input(transactions: Vec<Transaction>) -> InsightInput {
        InsightInput {
            user_id: "user-1".to_string(),
            month: Month::parse("2024-05").unwrap(),
            transactions,
            balances: None,
            goals: None,
            previous: None,
        }
    }

    #[test]
    fn monthly_aggregates_match_reference_values() {
        let input = base_input(vec![
            txn(15_000_000.0, TransactionKind::Income, None),
            txn(-850_000.0, TransactionKind::Expense, Some("groceries")),
            txn(-500_000.0, TransactionKind::Investment, None),
        ]);
        let computed = compute_monthly(&input);
        let insight = &computed.insight;

        assert_eq!(insight.kpi_value(KpiKey::Income), 15_000_000.0);
        assert_eq!(insight.kpi_value(KpiKey::Expenses), 850_000.0);
        assert_eq!(insight.kpi_value(KpiKey::Investments), 500_000.0);
        assert_eq!(insight.kpi_value(KpiKey::CashFlow), 13_650_000.0);
        assert!((insight.kpi_value(KpiKey::SavingsRate) - 0.943).abs() < 1e-3);
        assert!((insight.kpi_value(KpiKey::InvestmentRate) - 0.033).abs() < 1e-3);
        let top = insight.kpis.get(&KpiKey::TopExpenseCategory).unwrap();
        assert_eq!(top.label, "groceries");
        assert_eq!(top.value, 1.0);
        assert_eq!(insight.id, "user-1:2024-05");
    }

    #[test]
    fn cash_flow_identity_holds() {
        let input = base_input(vec![
            txn(9_000.0, TransactionKind::Income, None),
            txn(-3_000.0, TransactionKind::Expense, Some("rent")),
            txn(-1_000.0, TransactionKind::Debt, None),
            txn(-500.0, TransactionKind::Investment, None),
            txn(-200.0, TransactionKind::Transfer, None),
        ]);
        let insight = compute_monthly(&input).insight;
        let identity = insight.kpi_value(KpiKey::Income)
            - insight.kpi_value(KpiKey::Expenses)
            - insight.kpi_value(KpiKey::Investments)
            - insight.kpi_value(KpiKey::DebtPayments);
        assert!((insight.kpi_value(KpiKey::CashFlow) - identity).abs() < 1e-9);
    }

    #[test]
    fn zero_income_zeroes_rate_kpis() {
        let input = base_input(vec![txn(-2_000.0, TransactionKind::Expense, None)]);
        let insight = compute_monthly(&input).insight;
        assert_eq!(insight.kpi_value(KpiKey::SavingsRate), 0.0);
        assert_eq!(insight.kpi_value(KpiKey::InvestmentRate), 0.0);
        assert_eq!(insight.kpi_value(KpiKey::ExpenseRatio), 0.0);
        assert_eq!(insight.kpi_value(KpiKey::DebtToIncome), 0.0);
    }

    #[test]
    fn net_worth_uses_balances_and_previous() {
        let mut input = base_input(vec![txn(100.0, TransactionKind::Income, None)]);
        input.balances = Some(Balances {
            cash: Decimal::from_f64(5_000.0),
            investments: Decimal::from_f64(2_000.0),
            debt: Decimal::from_f64(1_000.0),
        });
        let mut previous = BTreeMap::new();
        previous.insert(KpiKey::NetWorth, 5_500.0);
        input.previous = Some(previous);

        let insight = compute_monthly(&input).insight;
        assert_eq!(insight.kpi_value(KpiKey::NetWorth), 6_000.0);
        let net_worth = insight.kpis.get(&KpiKey::NetWorth).unwrap();
        assert_eq!(net_worth.delta, Some(500.0));
        assert_eq!(insight.kpi_value(KpiKey::DebtOutstanding), 1_000.0);
    }

    #[test]
    fn uncategorised_expenses_fall_back_to_general() {
        let input = base_input(vec![
            txn(100.0, TransactionKind::Income, None),
            txn(-50.0, TransactionKind::Expense, None),
        ]);
        let insight = compute_monthly(&input).insight;
        let top = insight.kpis.get(&KpiKey::TopExpenseCategory).unwrap();
        assert_eq!(top.label, "general expenses");
        assert_eq!(top.value, 0.0);
    }

    #[test]
    fn category_tie_is_deterministic() {
        let input = base_input(vec![
            txn(-50.0, TransactionKind::Expense, Some("transport")),
            txn(-50.0, TransactionKind::Expense, Some("dining")),
        ]);
        let insight = compute_monthly(&input).insight;
        let top = insight.kpis.get(&KpiKey::TopExpenseCategory).unwrap();
        assert_eq!(top.label, "dining");
        assert_eq!(top.value, 0.5);
    }

    #[test]
    fn embedding_is_unit_norm() {
        let input = base_input(vec![
            txn(15_000_000.0, TransactionKind::Income, None),
            txn(-850_000.0, TransactionKind::Expense, Some("groceries")),
        ]);
        let computed = compute_monthly(&input);
        assert_eq!(computed.embedding.len(), INTERNAL_EMBEDDING_DIM);
        let norm = computed
            .embedding
            .iter()
            .map(|x| (*x as f64) * (*x as f64))
            .sum::<f64>()
            .sqrt();
        assert!((norm - 1.0).abs() < 1e-6, "norm = {norm}");
    }

    #[test]
    fn empty_input_embedding_is_zero_vector() {
        let input = base_input(vec![]);
        let computed = compute_monthly(&input);
        assert!(computed.embedding.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn recomputation_is_deterministic() {
        let input = base_input(vec![
            txn(12_345.67, TransactionKind::Income, None),
            txn(-2_345.99, TransactionKind::Expense, Some("utilities")),
        ]);
        let first = compute_monthly(&input);
        let second = compute_monthly(&input);
        let a = serde_json::to_value(&first.insight.kpis).unwrap();
        let b = serde_json::to_value(&second.insight.kpis).unwrap();
        assert_eq!(a, b);
        assert_eq!(first.insight.story, second.insight.story);
        assert_eq!(first.embedding, second.embedding);
    }

    #[test]
    fn story_length_in_bounds() {
        let input = base_input(vec![txn(100.0, TransactionKind::Income, None)]);
        let insight = compute_monthly(&input).insight;
        let len = insight.story.chars().count();
        assert!((200..=400).contains(&len), "len = {len}");
    }
}
