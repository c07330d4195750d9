//! Deterministic financial pipeline.
//!
//! Four pure stages feed the orchestrator and the HTTP surface:
//!
//! 1. [`kpi::compute_monthly`] — transactions in, KPI set + narrative +
//!    fallback embedding out. Decimal arithmetic up to the aggregation
//!    boundary, floats after.
//! 2. [`health::score_health`] — weighted 0..1 score over four components.
//! 3. [`actions::suggest_actions`] — fixed-order rule set with stable ids.
//! 4. [`simulate::simulate`] — what-if projection over selected actions.
//!
//! Nothing in this crate performs I/O; persistence of insights and
//! embeddings belongs to the callers.

#![deny(unsafe_code)]

pub mod actions;
pub mod health;
pub mod kpi;
pub mod simulate;
mod story;

pub use actions::suggest_actions;
pub use health::score_health;
pub use kpi::{compute_monthly, ComputedInsight};
pub use simulate::{simulate, SimulationOutcome};
pub use story::{format_currency, format_percent};
