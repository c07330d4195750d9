//! Tool trait, invocation context, outcome shape and the registry protocol.

use std::collections::HashMap;
use std::sync::Arc;

use arta_providers::ModelGateway;
use arta_storage::{AcquireDecision, CoreStorage, IdempotencyStore};
use arta_types::{ErrorCode, ErrorEnvelope, ValidationIssue};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::canonical::request_hash;

/// Idempotency records age out after this long.
pub fn idempotency_ttl() -> Duration {
    Duration::hours(24)
}

/// Per-invocation scope and collaborators.
#[derive(Clone)]
pub struct ToolContext {
    pub tenant_id: String,
    pub customer_id: String,
    pub storage: Arc<dyn CoreStorage>,
    /// Present when an external embedder should produce insight vectors.
    pub gateway: Option<Arc<dyn ModelGateway>>,
    pub cx: CancellationToken,
}

/// Resolver-level failures. Infrastructure errors map onto the same
/// envelope codes as everything else.
#[derive(Debug, thiserror::Error)]
pub enum ToolFailure {
    #[error("validation failed")]
    Validation(Vec<ValidationIssue>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Internal(String),
}

impl ToolFailure {
    fn envelope(&self) -> ErrorEnvelope {
        match self {
            ToolFailure::Validation(issues) => ErrorEnvelope::validation(issues.clone()),
            ToolFailure::NotFound(what) => ErrorEnvelope::new(ErrorCode::NotFound, what.clone()),
            ToolFailure::Cancelled => {
                ErrorEnvelope::new(ErrorCode::Cancelled, "operation cancelled")
            }
            ToolFailure::Internal(message) => {
                ErrorEnvelope::new(ErrorCode::InternalError, message.clone())
            }
        }
    }
}

/// A named, side-effecting operation with typed input/output.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    /// The idempotency key governing this invocation, if any. The default
    /// reads the caller-supplied `idempotencyKey` field; tools may derive
    /// their own fallback.
    fn idempotency_key(&self, ctx: &ToolContext, input: &Value) -> Option<String> {
        let _ = ctx;
        input
            .get("idempotencyKey")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    async fn resolve(&self, ctx: &ToolContext, input: &Value) -> Result<Value, ToolFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Ok,
    Error,
    /// The executor decided not to run the step (unregistered handler or a
    /// low-confidence turn).
    Skipped,
}

/// Invocation result handed to the executor and serialized to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutcome {
    pub tool: String,
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
    /// Present on skipped steps only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub replayed: bool,
}

impl ToolOutcome {
    fn ok(tool: &str, data: Value, replayed: bool) -> Self {
        Self {
            tool: tool.to_string(),
            status: ToolStatus::Ok,
            data: Some(data),
            error: None,
            reason: None,
            replayed,
        }
    }

    fn error(tool: &str, envelope: ErrorEnvelope) -> Self {
        Self {
            tool: tool.to_string(),
            status: ToolStatus::Error,
            data: None,
            error: Some(envelope),
            reason: None,
            replayed: false,
        }
    }

    /// A step the executor chose not to run.
    pub fn skipped(tool: &str, reason: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            status: ToolStatus::Skipped,
            data: None,
            error: None,
            reason: Some(reason.into()),
            replayed: false,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ToolStatus::Ok
    }
}

/// Named tool registry with the idempotent invocation protocol.
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry preloaded with the canonical tool set.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::transactions::TransactionsCreateTool));
        registry.register(Arc::new(crate::transactions::TransactionsListTool));
        registry.register(Arc::new(crate::insights::InsightsComputeTool));
        registry.register(Arc::new(crate::insights::InsightsListTool));
        registry.register(Arc::new(crate::insights::HealthScoreTool));
        registry.register(Arc::new(crate::insights::ActionsSuggestTool));
        registry.register(Arc::new(crate::insights::SimulationsRunTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Invoke a tool under the idempotency protocol.
    pub async fn invoke(&self, ctx: &ToolContext, name: &str, input: Value) -> ToolOutcome {
        let Some(tool) = self.get(name) else {
            return ToolOutcome::error(
                name,
                ErrorEnvelope::new(ErrorCode::NotFound, format!("tool {name} not registered")),
            );
        };

        let key = tool.idempotency_key(ctx, &input);
        let Some(key) = key else {
            // No idempotency key: run the resolver directly.
            return match tool.resolve(ctx, &input).await {
                Ok(data) => ToolOutcome::ok(name, data, false),
                Err(failure) => ToolOutcome::error(name, failure.envelope()),
            };
        };

        let hash = request_hash(&input);
        let now = Utc::now();
        let decision = ctx
            .storage
            .acquire(&ctx.tenant_id, &key, &hash, now, Some(now + idempotency_ttl()))
            .await;

        match decision {
            Ok(AcquireDecision::Replay(payload)) => {
                let mut outcome = ToolOutcome::ok(name, payload, true);
                annotate_idempotency(&mut outcome, &key, true);
                outcome
            }
            Ok(AcquireDecision::Conflict) => ToolOutcome::error(
                name,
                ErrorEnvelope::new(
                    ErrorCode::IdempotencyConflict,
                    format!("idempotency key {key} was used with a different payload"),
                ),
            ),
            Ok(AcquireDecision::Fresh) => match tool.resolve(ctx, &input).await {
                Ok(data) => {
                    if let Err(err) = ctx
                        .storage
                        .complete(&ctx.tenant_id, &key, data.clone())
                        .await
                    {
                        tracing::error!(tool = name, error = %err, "failed to persist idempotent response");
                        return ToolOutcome::error(
                            name,
                            ErrorEnvelope::new(ErrorCode::InternalError, err.to_string()),
                        );
                    }
                    let mut outcome = ToolOutcome::ok(name, data, false);
                    annotate_idempotency(&mut outcome, &key, false);
                    outcome
                }
                Err(ToolFailure::Cancelled) => {
                    // Leave the record locked; it expires via `expires_at`.
                    ToolOutcome::error(name, ToolFailure::Cancelled.envelope())
                }
                Err(failure) => {
                    if let Err(err) = ctx.storage.release(&ctx.tenant_id, &key).await {
                        tracing::warn!(tool = name, error = %err, "failed to release idempotency lock");
                    }
                    ToolOutcome::error(name, failure.envelope())
                }
            },
            Err(err) => ToolOutcome::error(
                name,
                ErrorEnvelope::new(ErrorCode::InternalError, err.to_string()),
            ),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// Record the governing key (and replay flag) in the outcome data.
fn annotate_idempotency(outcome: &mut ToolOutcome, key: &str, replayed: bool) {
    if let Some(Value::Object(map)) = outcome.data.as_mut() {
        map.insert(
            "idempotency".to_string(),
            serde_json::json!({ "key": key, "replayed": replayed }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arta_storage::InMemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTool {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &'static str {
            "test.counting"
        }

        async fn resolve(&self, _ctx: &ToolContext, input: &Value) -> Result<Value, ToolFailure> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(ToolFailure::Internal("resolver exploded".to_string()));
            }
            Ok(serde_json::json!({ "run": run, "echo": input["value"] }))
        }
    }

    fn context() -> ToolContext {
        ToolContext {
            tenant_id: "tenant-a".to_string(),
            customer_id: "cust-a".to_string(),
            storage: Arc::new(InMemoryStorage::new(7)),
            gateway: None,
            cx: CancellationToken::new(),
        }
    }

    fn registry_with(tool: Arc<dyn Tool>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        registry
    }

    #[tokio::test]
    async fn unregistered_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let outcome = registry
            .invoke(&context(), "missing.tool", serde_json::json!({}))
            .await;
        assert_eq!(outcome.status, ToolStatus::Error);
        assert_eq!(outcome.error.unwrap().code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn replay_returns_identical_payload_without_rerunning() {
        let tool = Arc::new(CountingTool {
            runs: AtomicUsize::new(0),
            fail: false,
        });
        let registry = registry_with(tool.clone());
        let ctx = context();
        let input = serde_json::json!({ "value": 42, "idempotencyKey": "key-1" });

        let first = registry.invoke(&ctx, "test.counting", input.clone()).await;
        assert!(first.is_ok());
        assert!(!first.replayed);

        let second = registry.invoke(&ctx, "test.counting", input).await;
        assert!(second.is_ok());
        assert!(second.replayed);
        assert_eq!(tool.runs.load(Ordering::SeqCst), 1);

        // Payloads are identical apart from the replay flag.
        let mut a = first.data.unwrap();
        let mut b = second.data.unwrap();
        a["idempotency"]["replayed"].take();
        b["idempotency"]["replayed"].take();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn changed_payload_same_key_conflicts() {
        let tool = Arc::new(CountingTool {
            runs: AtomicUsize::new(0),
            fail: false,
        });
        let registry = registry_with(tool);
        let ctx = context();

        let first = registry
            .invoke(
                &ctx,
                "test.counting",
                serde_json::json!({ "value": 1, "idempotencyKey": "key-1" }),
            )
            .await;
        assert!(first.is_ok());

        let second = registry
            .invoke(
                &ctx,
                "test.counting",
                serde_json::json!({ "value": 2, "idempotencyKey": "key-1" }),
            )
            .await;
        assert_eq!(second.status, ToolStatus::Error);
        assert_eq!(second.error.unwrap().code, ErrorCode::IdempotencyConflict);
    }

    #[tokio::test]
    async fn resolver_failure_releases_lock_and_allows_retry() {
        let failing = Arc::new(CountingTool {
            runs: AtomicUsize::new(0),
            fail: true,
        });
        let registry = registry_with(failing);
        let ctx = context();
        let input = serde_json::json!({ "value": 7, "idempotencyKey": "key-x" });

        let first = registry.invoke(&ctx, "test.counting", input.clone()).await;
        assert_eq!(first.status, ToolStatus::Error);

        // Retry is allowed: the same key runs the resolver again.
        let working = Arc::new(CountingTool {
            runs: AtomicUsize::new(0),
            fail: false,
        });
        let registry = registry_with(working.clone());
        let second = registry.invoke(&ctx, "test.counting", input).await;
        assert!(second.is_ok());
        assert_eq!(working.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn keyless_invocation_skips_idempotency() {
        let tool = Arc::new(CountingTool {
            runs: AtomicUsize::new(0),
            fail: false,
        });
        let registry = registry_with(tool.clone());
        let ctx = context();
        let input = serde_json::json!({ "value": 1 });

        registry.invoke(&ctx, "test.counting", input.clone()).await;
        registry.invoke(&ctx, "test.counting", input).await;
        assert_eq!(tool.runs.load(Ordering::SeqCst), 2);
    }
}
