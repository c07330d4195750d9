//! Weighted health scoring over the monthly KPI set.

use arta_types::{HealthComponent, HealthScore, KpiKey, MonthlyInsight};

use crate::kpi::clamp;

/// Fixed component weights; the order here is the output order.
const WEIGHTS: [(KpiKey, f64); 4] = [
    (KpiKey::CashFlow, 0.35),
    (KpiKey::SavingsRate, 0.25),
    (KpiKey::DebtToIncome, 0.20),
    (KpiKey::InvestmentRate, 0.20),
];

/// Reference point for a "full" investment rate score.
const INVESTMENT_RATE_TARGET: f64 = 0.3;

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

fn component_score(key: KpiKey, insight: &MonthlyInsight) -> f64 {
    match key {
        KpiKey::CashFlow => {
            let income = insight.kpi_value(KpiKey::Income);
            if income <= 0.0 {
                0.5
            } else {
                let cash_flow = insight.kpi_value(KpiKey::CashFlow);
                clamp((cash_flow / income + 1.0) / 2.0, 0.0, 1.0)
            }
        }
        KpiKey::SavingsRate => clamp(insight.kpi_value(KpiKey::SavingsRate), 0.0, 1.0),
        KpiKey::DebtToIncome => {
            let ratio = insight.kpi_value(KpiKey::DebtToIncome);
            if ratio <= 0.0 {
                1.0
            } else {
                clamp(1.0 - ratio, 0.0, 1.0)
            }
        }
        KpiKey::InvestmentRate => clamp(
            insight.kpi_value(KpiKey::InvestmentRate) / INVESTMENT_RATE_TARGET,
            0.0,
            1.0,
        ),
        _ => 0.0,
    }
}

/// True when the KPI value misses its declared goal, respecting the
/// direction of each indicator.
fn goal_failed(key: KpiKey, value: f64, goal: f64) -> bool {
    match key {
        // Lower is better.
        KpiKey::Expenses
        | KpiKey::ExpenseRatio
        | KpiKey::DebtToIncome
        | KpiKey::DebtPayments
        | KpiKey::DebtOutstanding => value > goal,
        // Higher is better.
        _ => value < goal,
    }
}

/// Score the four weighted components and collect notes: KPIs failing their
/// declared goals, or the weakest component when every goal is met.
pub fn score_health(insight: &MonthlyInsight) -> HealthScore {
    let components: Vec<HealthComponent> = WEIGHTS
        .iter()
        .map(|(key, weight)| HealthComponent {
            key: *key,
            label: key.default_label().to_string(),
            weight: *weight,
            score: round3(component_score(*key, insight)),
        })
        .collect();

    let total = components.iter().map(|c| c.weight * c.score).sum::<f64>();

    let mut notes: Vec<String> = insight
        .kpis
        .values()
        .filter_map(|kpi| {
            let goal = kpi.goal?;
            goal_failed(kpi.key, kpi.value, goal).then(|| {
                format!(
                    "{} is at {:.2}, missing its goal of {:.2}",
                    kpi.label, kpi.value, goal
                )
            })
        })
        .collect();

    if notes.is_empty() {
        if let Some(weakest) = components
            .iter()
            .min_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
        {
            notes.push(format!(
                "{} is the weakest area at {:.3}",
                weakest.label, weakest.score
            ));
        }
    }

    HealthScore {
        total,
        components,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arta_types::{InsightInput, Month, MonthlyInsight};
    use std::collections::BTreeMap;

    fn insight_from(values: &[(KpiKey, f64)]) -> MonthlyInsight {
        use arta_types::{Kpi, KpiUnit};
        let kpis: BTreeMap<KpiKey, Kpi> = values
            .iter()
            .map(|(key, value)| (*key, Kpi::new(*key, *value, KpiUnit::Ratio)))
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

    #[test]
    fn total_is_weighted_sum() {
        let insight = insight_from(&[
            (KpiKey::Income, 10_000.0),
            (KpiKey::CashFlow, 2_000.0),
            (KpiKey::SavingsRate, 0.25),
            (KpiKey::DebtToIncome, 0.5),
            (KpiKey::InvestmentRate, 0.15),
        ]);
        let health = score_health(&insight);
        let weighted: f64 = health.components.iter().map(|c| c.weight * c.score).sum();
        assert!((health.total - weighted).abs() < 1e-3);
        assert_eq!(health.components.len(), 4);
    }

    #[test]
    fn zero_income_cash_flow_scores_half() {
        let insight = insight_from(&[(KpiKey::Income, 0.0), (KpiKey::CashFlow, -500.0)]);
        let health = score_health(&insight);
        assert_eq!(health.component(KpiKey::CashFlow).unwrap().score, 0.5);
    }

    #[test]
    fn zero_debt_scores_full() {
        let insight = insight_from(&[(KpiKey::Income, 100.0), (KpiKey::DebtToIncome, 0.0)]);
        let health = score_health(&insight);
        assert_eq!(health.component(KpiKey::DebtToIncome).unwrap().score, 1.0);
    }

    #[test]
    fn investment_rate_saturates_at_target() {
        let insight = insight_from(&[(KpiKey::Income, 100.0), (KpiKey::InvestmentRate, 0.45)]);
        let health = score_health(&insight);
        assert_eq!(health.component(KpiKey::InvestmentRate).unwrap().score, 1.0);
    }

    #[test]
    fn failed_goal_lands_in_notes() {
        let mut insight = insight_from(&[
            (KpiKey::Income, 100.0),
            (KpiKey::SavingsRate, 0.05),
            (KpiKey::CashFlow, 10.0),
        ]);
        if let Some(kpi) = insight.kpis.get_mut(&KpiKey::SavingsRate) {
            kpi.goal = Some(0.2);
        }
        let health = score_health(&insight);
        assert!(health.notes.iter().any(|n| n.contains("Savings rate")));
    }

    #[test]
    fn no_failures_surface_weakest_component() {
        let insight = insight_from(&[
            (KpiKey::Income, 100.0),
            (KpiKey::CashFlow, 80.0),
            (KpiKey::SavingsRate, 0.9),
            (KpiKey::DebtToIncome, 0.0),
            (KpiKey::InvestmentRate, 0.01),
        ]);
        let health = score_health(&insight);
        assert_eq!(health.notes.len(), 1);
        assert!(health.notes[0].contains("Investment rate"));
    }

    #[test]
    fn empty_input_pipeline_scores_cleanly() {
        let input = InsightInput {
            user_id: "u".to_string(),
            month: Month::parse("2024-01").unwrap(),
            transactions: vec![],
            balances: None,
            goals: None,
            previous: None,
        };
        let insight = crate::compute_monthly(&input).insight;
        let health = score_health(&insight);
        assert!(health.total >= 0.0 && health.total <= 1.0);
        // income = 0: cash flow 0.5, debt 1.0, rates 0.
        assert!((health.total - (0.35 * 0.5 + 0.20 * 1.0)).abs() < 1e-9);
    }
}
