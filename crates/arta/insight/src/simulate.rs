//! What-if simulation over suggested actions.
//!
//! Each selected action mutates a deep copy of the insight by a fixed delta;
//! a final `refresh_derived` pass recomputes every derived KPI from
//! primitives so the projected set stays internally consistent, then health
//! is re-scored and the narrative regenerated with a `(projected)` marker.

use std::collections::BTreeMap;

use arta_types::{ActionId, HealthScore, Kpi, KpiKey, KpiUnit, MonthlyInsight};

use crate::health::score_health;
use crate::kpi::clamp;
use crate::story::build_story;

/// Projection result: adjusted insight, re-scored health, and the absolute
/// delta applied per requested action id (0 for no-ops and unknown ids).
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub projected_insight: MonthlyInsight,
    pub projected_health: HealthScore,
    pub adjustments: BTreeMap<String, f64>,
}

fn value(kpis: &BTreeMap<KpiKey, Kpi>, key: KpiKey) -> f64 {
    kpis.get(&key).map(|k| k.value).unwrap_or(0.0)
}

fn set_value(kpis: &mut BTreeMap<KpiKey, Kpi>, key: KpiKey, new_value: f64, unit: KpiUnit) {
    match kpis.get_mut(&key) {
        Some(kpi) => kpi.value = new_value,
        None => {
            kpis.insert(key, Kpi::new(key, new_value, unit));
        }
    }
}

fn apply_action(kpis: &mut BTreeMap<KpiKey, Kpi>, id: ActionId) -> f64 {
    let income = value(kpis, KpiKey::Income);
    match id {
        ActionId::ImproveSavings => {
            let savings_rate = value(kpis, KpiKey::SavingsRate);
            let target = clamp(savings_rate + 0.03, 0.0, 0.8);
            let delta_rate = target - savings_rate;
            let moved = income * delta_rate;
            set_value(kpis, KpiKey::SavingsRate, target, KpiUnit::Ratio);
            set_value(
                kpis,
                KpiKey::Expenses,
                value(kpis, KpiKey::Expenses) - moved,
                KpiUnit::Currency,
            );
            set_value(
                kpis,
                KpiKey::CashFlow,
                value(kpis, KpiKey::CashFlow) + moved,
                KpiUnit::Currency,
            );
            moved
        }
        ActionId::OptimizeExpenses => {
            let expenses = value(kpis, KpiKey::Expenses);
            let saved = expenses * 0.05;
            set_value(kpis, KpiKey::Expenses, expenses - saved, KpiUnit::Currency);
            set_value(
                kpis,
                KpiKey::CashFlow,
                value(kpis, KpiKey::CashFlow) + saved,
                KpiUnit::Currency,
            );
            saved
        }
        ActionId::AccelerateDebt => {
            let debt = value(kpis, KpiKey::DebtOutstanding);
            let repaid = debt * 0.05;
            set_value(
                kpis,
                KpiKey::DebtOutstanding,
                debt - repaid,
                KpiUnit::Currency,
            );
            repaid
        }
        ActionId::BoostInvestments => {
            let added = income * 0.02;
            set_value(
                kpis,
                KpiKey::Investments,
                value(kpis, KpiKey::Investments) + added,
                KpiUnit::Currency,
            );
            set_value(
                kpis,
                KpiKey::CashFlow,
                value(kpis, KpiKey::CashFlow) - added,
                KpiUnit::Currency,
            );
            added
        }
        ActionId::GrowIncome => {
            let raise = income * 0.03;
            set_value(kpis, KpiKey::Income, income + raise, KpiUnit::Currency);
            raise
        }
        ActionId::StayTheCourse => 0.0,
    }
}

/// Recompute every derived KPI from the primitive ones.
fn refresh_derived(kpis: &mut BTreeMap<KpiKey, Kpi>) {
    let income = value(kpis, KpiKey::Income);
    let expenses = value(kpis, KpiKey::Expenses);
    let investments = value(kpis, KpiKey::Investments);
    let debt_payments = value(kpis, KpiKey::DebtPayments);
    let debt_outstanding = value(kpis, KpiKey::DebtOutstanding);

    set_value(
        kpis,
        KpiKey::CashFlow,
        income - expenses - investments - debt_payments,
        KpiUnit::Currency,
    );
    let (savings, invest, expense, debt) = if income > 0.0 {
        (
            clamp((income - expenses) / income, 0.0, 1.5),
            clamp(investments / income, 0.0, 1.5),
            clamp(expenses / income, 0.0, 2.0),
            clamp(debt_outstanding / income, 0.0, 2.0),
        )
    } else {
        (0.0, 0.0, 0.0, 0.0)
    };
    set_value(kpis, KpiKey::SavingsRate, savings, KpiUnit::Ratio);
    set_value(kpis, KpiKey::InvestmentRate, invest, KpiUnit::Ratio);
    set_value(kpis, KpiKey::ExpenseRatio, expense, KpiUnit::Ratio);
    set_value(kpis, KpiKey::DebtToIncome, debt, KpiUnit::Ratio);
}

/// Project the insight under the selected actions. Action ids arrive as raw
/// strings so unknown ids can be reported as explicit no-ops.
pub fn simulate(insight: &MonthlyInsight, action_ids: &[String]) -> SimulationOutcome {
    let mut projected = insight.clone();
    let mut adjustments = BTreeMap::new();

    for raw in action_ids {
        let applied = match ActionId::parse(raw) {
            Some(id) => apply_action(&mut projected.kpis, id),
            None => 0.0,
        };
        adjustments.insert(raw.clone(), applied);
    }

    refresh_derived(&mut projected.kpis);
    projected.story = build_story(&projected.month, &projected.kpis, Some("(projected)"));
    let projected_health = score_health(&projected);

    SimulationOutcome {
        projected_insight: projected,
        projected_health,
        adjustments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arta_types::Month;

    fn insight(values: &[(KpiKey, f64)]) -> MonthlyInsight {
        let kpis: BTreeMap<KpiKey, Kpi> = values
            .iter()
            .map(|(key, v)| {
                let unit = match key {
                    KpiKey::SavingsRate
                    | KpiKey::InvestmentRate
                    | KpiKey::ExpenseRatio
                    | KpiKey::DebtToIncome => KpiUnit::Ratio,
                    _ => KpiUnit::Currency,
                };
                (*key, Kpi::new(*key, *v, unit))
            })
            .collect();
        MonthlyInsight {
            id: "u:2024-05".to_string(),
            user_id: "u".to_string(),
            month: Month::parse("2024-05").unwrap(),
            kpis,
            story: String::new(),
            created_at: chrono::Utc::now(),
        }
    }

    fn baseline() -> MonthlyInsight {
        insight(&[
            (KpiKey::Income, 10_000_000.0),
            (KpiKey::Expenses, 9_000_000.0),
            (KpiKey::CashFlow, 1_000_000.0),
            (KpiKey::SavingsRate, 0.10),
            (KpiKey::Investments, 0.0),
            (KpiKey::DebtPayments, 0.0),
            (KpiKey::InvestmentRate, 0.0),
            (KpiKey::ExpenseRatio, 0.9),
            (KpiKey::DebtOutstanding, 0.0),
            (KpiKey::DebtToIncome, 0.0),
        ])
    }

    #[test]
    fn improve_savings_matches_reference_deltas() {
        let base = baseline();
        let baseline_health = score_health(&base);
        let outcome = simulate(&base, &["improve-savings".to_string()]);
        let kpis = &outcome.projected_insight;

        assert!((kpis.kpi_value(KpiKey::SavingsRate) - 0.13).abs() < 1e-9);
        assert!((kpis.kpi_value(KpiKey::Expenses) - 8_700_000.0).abs() < 1e-6);
        assert!((kpis.kpi_value(KpiKey::CashFlow) - 1_300_000.0).abs() < 1e-6);
        assert!(outcome.projected_health.total > baseline_health.total);
        assert_eq!(outcome.adjustments["improve-savings"], 300_000.0);
    }

    #[test]
    fn empty_action_list_is_identity_on_kpis() {
        let base = baseline();
        let outcome = simulate(&base, &[]);
        let before = serde_json::to_value(&base.kpis).unwrap();
        let after = serde_json::to_value(&outcome.projected_insight.kpis).unwrap();
        assert_eq!(before, after);
        assert!(outcome.adjustments.is_empty());
    }

    #[test]
    fn unknown_action_is_a_recorded_noop() {
        let base = baseline();
        let outcome = simulate(&base, &["win-lottery".to_string()]);
        assert_eq!(outcome.adjustments["win-lottery"], 0.0);
        let before = serde_json::to_value(&base.kpis).unwrap();
        let after = serde_json::to_value(&outcome.projected_insight.kpis).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn optimize_expenses_moves_five_percent() {
        let outcome = simulate(&baseline(), &["optimize-expenses".to_string()]);
        let kpis = &outcome.projected_insight;
        assert!((kpis.kpi_value(KpiKey::Expenses) - 8_550_000.0).abs() < 1e-6);
        assert!((kpis.kpi_value(KpiKey::CashFlow) - 1_450_000.0).abs() < 1e-6);
        assert!((kpis.kpi_value(KpiKey::ExpenseRatio) - 0.855).abs() < 1e-9);
        assert!((kpis.kpi_value(KpiKey::SavingsRate) - 0.145).abs() < 1e-9);
    }

    #[test]
    fn accelerate_debt_shrinks_outstanding_and_ratio() {
        let base = insight(&[
            (KpiKey::Income, 10_000.0),
            (KpiKey::Expenses, 5_000.0),
            (KpiKey::DebtOutstanding, 4_000.0),
            (KpiKey::DebtToIncome, 0.4),
        ]);
        let outcome = simulate(&base, &["accelerate-debt".to_string()]);
        let kpis = &outcome.projected_insight;
        assert!((kpis.kpi_value(KpiKey::DebtOutstanding) - 3_800.0).abs() < 1e-9);
        assert!((kpis.kpi_value(KpiKey::DebtToIncome) - 0.38).abs() < 1e-9);
    }

    #[test]
    fn grow_income_refreshes_every_rate() {
        let outcome = simulate(&baseline(), &["grow-income".to_string()]);
        let kpis = &outcome.projected_insight;
        let income = kpis.kpi_value(KpiKey::Income);
        assert!((income - 10_300_000.0).abs() < 1e-6);
        assert!((kpis.kpi_value(KpiKey::CashFlow) - (income - 9_000_000.0)).abs() < 1e-6);
        assert!(
            (kpis.kpi_value(KpiKey::ExpenseRatio) - 9_000_000.0 / income).abs() < 1e-9
        );
    }

    #[test]
    fn savings_rate_clamps_at_eighty_percent() {
        let base = insight(&[
            (KpiKey::Income, 1_000.0),
            (KpiKey::Expenses, 210.0),
            (KpiKey::SavingsRate, 0.79),
        ]);
        let outcome = simulate(&base, &["improve-savings".to_string()]);
        let sr = outcome.projected_insight.kpi_value(KpiKey::SavingsRate);
        assert!((sr - 0.8).abs() < 1e-9);
        assert!((outcome.adjustments["improve-savings"] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn projected_story_carries_marker_and_bounds() {
        let outcome = simulate(&baseline(), &["improve-savings".to_string()]);
        let story = &outcome.projected_insight.story;
        assert!(story.contains("(projected)"));
        let len = story.chars().count();
        assert!((200..=400).contains(&len));
    }
}
