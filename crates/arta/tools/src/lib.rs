//! Idempotent tool registry.
//!
//! A tool is a named, side-effecting operation with serde-typed input and
//! output. Invocation follows a strict protocol: validate, acquire the
//! idempotency record (replaying completed calls, rejecting mismatched
//! payloads), run the resolver, then persist the response and clear the
//! lock. A cancelled request never completes its record; locked rows age out
//! through `expires_at`.

#![deny(unsafe_code)]

mod canonical;
mod insights;
mod registry;
mod transactions;

pub use canonical::{canonical_json, derive_transaction_key, request_hash, sha256_hex};
pub use insights::{
    ActionsSuggestTool, HealthScoreTool, InsightsComputeTool, InsightsListTool,
    SimulationsRunTool,
};
pub use registry::{
    idempotency_ttl, Tool, ToolContext, ToolFailure, ToolOutcome, ToolRegistry, ToolStatus,
};
pub use transactions::{TransactionsCreateTool, TransactionsListTool};
