//! Deterministic narrative generation and number formatting.

use std::collections::BTreeMap;

use arta_types::{Kpi, KpiKey, Month};

/// Narrative length bounds in characters.
const STORY_MIN: usize = 200;
const STORY_MAX: usize = 400;

/// Whole-unit currency with thousands separators: `15000000.4` → `15,000,000`.
pub fn format_currency(value: f64) -> String {
    let rounded = value.round();
    let negative = rounded < 0.0;
    let digits = format!("{}", rounded.abs() as i64);
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    let offset = digits.len() % 3;
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (i + 3 - offset) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if negative {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Ratio to whole percent: `0.943…` → `94`.
pub fn format_percent(ratio: f64) -> String {
    format!("{}", (ratio * 100.0).round() as i64)
}

fn value_of(kpis: &BTreeMap<KpiKey, Kpi>, key: KpiKey) -> f64 {
    kpis.get(&key).map(|k| k.value).unwrap_or(0.0)
}

/// Build the fixed three-sentence narrative and force its length into
/// [200, 400] characters: short stories are padded with `.`, long ones are
/// truncated with an ellipsis.
pub fn build_story(month: &Month, kpis: &BTreeMap<KpiKey, Kpi>, suffix: Option<&str>) -> String {
    let income = value_of(kpis, KpiKey::Income);
    let expenses = value_of(kpis, KpiKey::Expenses);
    let cash_flow = value_of(kpis, KpiKey::CashFlow);
    let savings_rate = value_of(kpis, KpiKey::SavingsRate);
    let investment_rate = value_of(kpis, KpiKey::InvestmentRate);
    let expense_ratio = value_of(kpis, KpiKey::ExpenseRatio);
    let net_worth = value_of(kpis, KpiKey::NetWorth);
    let top_label = kpis
        .get(&KpiKey::TopExpenseCategory)
        .map(|k| k.label.clone())
        .unwrap_or_else(|| "general expenses".to_string());
    let top_share = value_of(kpis, KpiKey::TopExpenseCategory);

    let mut story = format!(
        "In {month}, income totaled {} while spending reached {}, leaving a cash flow of {}. \
         The savings rate landed at {}% with {}% of income invested, and the expense ratio \
         stood at {}%. The largest expense share was {} at {}% of total spending, and \
         estimated net worth is {}.",
        format_currency(income),
        format_currency(expenses),
        format_currency(cash_flow),
        format_percent(savings_rate),
        format_percent(investment_rate),
        format_percent(expense_ratio),
        top_label,
        format_percent(top_share),
        format_currency(net_worth),
    );
    if let Some(suffix) = suffix {
        story.push(' ');
        story.push_str(suffix);
    }
    normalize_story(story)
}

fn normalize_story(mut story: String) -> String {
    let mut len = story.chars().count();
    while len < STORY_MIN {
        story.push('.');
        len += 1;
    }
    if len > STORY_MAX {
        story = story.chars().take(STORY_MAX - 1).collect();
        story.push('…');
    }
    story
}

#[cfg(test)]
mod tests {
    use super::*;
    use arta_types::KpiUnit;

    fn kpis_with(values: &[(KpiKey, f64)]) -> BTreeMap<KpiKey, Kpi> {
        values
            .iter()
            .map(|(key, value)| (*key, Kpi::new(*key, *value, KpiUnit::Currency)))
            .collect()
    }

    #[test]
    fn currency_grouping() {
        assert_eq!(format_currency(0.0), "0");
        assert_eq!(format_currency(999.0), "999");
        assert_eq!(format_currency(1000.0), "1,000");
        assert_eq!(format_currency(15_000_000.0), "15,000,000");
        assert_eq!(format_currency(-850_000.4), "-850,000");
    }

    #[test]
    fn percent_rounding() {
        assert_eq!(format_percent(0.9433), "94");
        assert_eq!(format_percent(0.005), "1");
        assert_eq!(format_percent(0.0), "0");
    }

    #[test]
    fn story_length_is_bounded() {
        let small = kpis_with(&[(KpiKey::Income, 1.0)]);
        let month = Month::parse("2024-05").unwrap();
        let story = build_story(&month, &small, None);
        let len = story.chars().count();
        assert!((200..=400).contains(&len), "len = {len}");

        let huge = kpis_with(&[
            (KpiKey::Income, 123_456_789_012.0),
            (KpiKey::Expenses, 98_765_432_109.0),
            (KpiKey::CashFlow, 11_111_111_111.0),
            (KpiKey::NetWorth, 222_222_222_222.0),
        ]);
        let story = build_story(&month, &huge, Some("(projected)"));
        let len = story.chars().count();
        assert!((200..=400).contains(&len), "len = {len}");
    }

    #[test]
    fn projected_suffix_is_embedded() {
        let month = Month::parse("2024-05").unwrap();
        let story = build_story(&month, &kpis_with(&[]), Some("(projected)"));
        assert!(story.contains("(projected)"));
    }
}
