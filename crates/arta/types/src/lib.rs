//! Shared domain model for the Arta orchestration core.
//!
//! Every other crate in the workspace builds on these types: the tenant and
//! customer scope, the transaction ledger entries, the monthly insight (KPI
//! set + narrative), health scoring and suggested actions, conversation
//! messages, and the plan DAG executed per chat turn. The error taxonomy that
//! maps onto the HTTP envelope also lives here so that every layer speaks the
//! same set of error codes.

#![deny(unsafe_code)]

mod action;
mod conversation;
mod error;
mod health;
mod insight;
mod plan;
mod tenant;
mod transaction;

pub use action::{ActionCategory, ActionId, SuggestedAction};
pub use conversation::{
    ConversationMessage, ExtractedTransaction, Intent, IntentClassification, MessageRole,
    MonthlySummary, RetrievalDocument,
};
pub use error::{ErrorCode, ErrorEnvelope, ValidationIssue};
pub use health::{HealthComponent, HealthScore};
pub use insight::{Balances, InsightInput, Kpi, KpiKey, KpiUnit, Month, MonthlyInsight};
pub use plan::{Plan, PlanStep, StepKind};
pub use tenant::{
    AuthenticatedUser, Customer, CustomerMetadata, CustomerPreferences, CustomerProfile, Tenant,
};
pub use transaction::{valid_currency, Transaction, TransactionKind};
