//! Privacy-preserving aggregation: cohort benchmarks and leaderboard.
//!
//! Both views only ever read customers with `allow_benchmarking == true`,
//! and the caller must be opted in themselves. Users appear solely under a
//! deterministic emoji+hex alias; nothing in the output says "You".

#![deny(unsafe_code)]

use std::collections::BTreeMap;

use arta_insight::score_health;
use arta_storage::{CoreStorage, InsightStore, StorageError, TenantStore};
use arta_types::{Customer, ErrorCode, KpiKey};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Alias symbol pool. Deliberately a named constant: swapping the pool is a
/// configuration change, and the derivation only depends on its length.
pub const ALIAS_EMOJI_POOL: [&str; 10] = ["🦊", "🐢", "🦉", "🐙", "🦜", "🐝", "🦄", "🐨", "🦋", "🐧"];

/// Rows returned by the leaderboard view.
pub const LEADERBOARD_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum AggregateError {
    /// The caller has not opted into benchmarking.
    #[error("benchmarking requires opt-in")]
    OptInRequired,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AggregateError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AggregateError::OptInRequired => ErrorCode::BenchmarkOptInRequired,
            AggregateError::Storage(_) => ErrorCode::InternalError,
        }
    }
}

pub type AggregateResult<T> = Result<T, AggregateError>;

/// `(region, income_band)` bucket; missing profile fields become "unknown".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Cohort {
    pub region: String,
    pub income_band: String,
}

impl Cohort {
    fn of(customer: &Customer) -> Self {
        let profile = &customer.metadata.profile;
        Self {
            region: profile
                .region
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            income_band: profile
                .income_band
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

/// Cohort averages over every opted-in user's monthly insights.
#[derive(Debug, Clone, Serialize)]
pub struct CohortBenchmark {
    pub cohort: Cohort,
    pub income_avg: f64,
    pub savings_rate_avg: f64,
    pub sample_size: usize,
}

/// One anonymised leaderboard row.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    pub alias: String,
    /// Health score scaled to 0..100.
    pub score: f64,
    pub region: String,
    pub income_band: String,
}

/// Leaderboard plus the caller's own (aliased) standing.
#[derive(Debug, Clone, Serialize)]
pub struct Leaderboard {
    pub leaderboard: Vec<LeaderboardRow>,
    pub you: LeaderboardRow,
}

/// Deterministic pseudonym: `emoji[hex[0] mod pool] ∥ hex[1..7]` over
/// `SHA256(user_id)`.
pub fn alias_for(user_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    let first = u32::from_str_radix(&hex[0..1], 16).unwrap_or(0) as usize;
    let emoji = ALIAS_EMOJI_POOL[first % ALIAS_EMOJI_POOL.len()];
    format!("{emoji}{}", &hex[1..7])
}

async fn require_opt_in(
    storage: &dyn CoreStorage,
    tenant_id: &str,
    customer_id: &str,
) -> AggregateResult<Customer> {
    let caller = storage
        .get_customer(tenant_id, customer_id)
        .await?
        .ok_or(AggregateError::OptInRequired)?;
    if !caller.allows_benchmarking() {
        return Err(AggregateError::OptInRequired);
    }
    Ok(caller)
}

/// Cohort means of `income` and `savingsRate` across all opted-in users'
/// insights (one per month each by construction).
pub async fn benchmarks(
    storage: &dyn CoreStorage,
    tenant_id: &str,
    caller_customer_id: &str,
) -> AggregateResult<Vec<CohortBenchmark>> {
    require_opt_in(storage, tenant_id, caller_customer_id).await?;

    let mut sums: BTreeMap<Cohort, (f64, f64, usize)> = BTreeMap::new();
    for customer in storage.list_opted_in_customers(tenant_id).await? {
        let cohort = Cohort::of(&customer);
        for insight in storage.list_insights(&customer.id, 0).await? {
            let entry = sums.entry(cohort.clone()).or_insert((0.0, 0.0, 0));
            entry.0 += insight.kpi_value(KpiKey::Income);
            entry.1 += insight.kpi_value(KpiKey::SavingsRate);
            entry.2 += 1;
        }
    }

    Ok(sums
        .into_iter()
        .filter(|(_, (_, _, count))| *count > 0)
        .map(|(cohort, (income_sum, savings_sum, count))| CohortBenchmark {
            cohort,
            income_avg: income_sum / count as f64,
            savings_rate_avg: savings_sum / count as f64,
            sample_size: count,
        })
        .collect())
}

/// Top-N opted-in users by latest-month health score, fully aliased. The
/// caller's own row carries their alias and score, never a "You" label.
pub async fn leaderboard(
    storage: &dyn CoreStorage,
    tenant_id: &str,
    caller_customer_id: &str,
) -> AggregateResult<Leaderboard> {
    let caller = require_opt_in(storage, tenant_id, caller_customer_id).await?;

    let mut rows: Vec<LeaderboardRow> = Vec::new();
    let mut you: Option<LeaderboardRow> = None;

    for customer in storage.list_opted_in_customers(tenant_id).await? {
        let Some(latest) = storage
            .list_insights(&customer.id, 1)
            .await?
            .into_iter()
            .next()
        else {
            continue;
        };
        let health = score_health(&latest);
        let cohort = Cohort::of(&customer);
        let row = LeaderboardRow {
            alias: alias_for(&customer.id),
            score: (health.total * 100.0).round(),
            region: cohort.region,
            income_band: cohort.income_band,
        };
        if customer.id == caller.id {
            you = Some(row.clone());
        }
        rows.push(row);
    }

    rows.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.alias.cmp(&b.alias))
    });
    rows.truncate(LEADERBOARD_LIMIT);

    let you = you.unwrap_or(LeaderboardRow {
        alias: alias_for(&caller.id),
        score: 0.0,
        region: Cohort::of(&caller).region,
        income_band: Cohort::of(&caller).income_band,
    });

    Ok(Leaderboard {
        leaderboard: rows,
        you,
    })
}
