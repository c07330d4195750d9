//! Weighted financial health score.

use serde::{Deserialize, Serialize};

use crate::insight::KpiKey;

/// One weighted component of the health score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthComponent {
    pub key: KpiKey,
    pub label: String,
    pub weight: f64,
    /// Component score in [0, 1], rounded to 3 decimals.
    pub score: f64,
}

/// Overall health: `total = Σ weight_i · score_i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthScore {
    pub total: f64,
    pub components: Vec<HealthComponent>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl HealthScore {
    pub fn component(&self, key: KpiKey) -> Option<&HealthComponent> {
        self.components.iter().find(|c| c.key == key)
    }
}
