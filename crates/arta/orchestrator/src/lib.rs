//! Conversational orchestration: classify, plan, execute, assemble.
//!
//! One chat turn flows through four stages. The classifier labels the latest
//! user message; the planner maps the label onto a short step DAG; the
//! executor walks the steps sequentially over a request-scoped state bag;
//! the assembler folds the executor's final message together with the
//! caller's latest KPIs, suggested actions and an optional clarifier.
//! Nothing here holds state across requests.

#![deny(unsafe_code)]

mod error;
mod executor;
mod options;
mod planner;

pub use error::{OrchestratorError, OrchestratorResult};
pub use executor::{ExecutionState, PlanExecutor};
pub use options::{ChatRequestOptions, StageOptions};
pub use planner::{plan_for, CLARIFIER_FOLLOWUP, CONFIDENCE_FLOOR};

use std::collections::BTreeMap;
use std::sync::Arc;

use arta_insight::{score_health, suggest_actions};
use arta_providers::{ModelGateway, ProviderError};
use arta_storage::InsightStore;
use arta_tools::{ToolContext, ToolOutcome, ToolRegistry};
use arta_types::{ConversationMessage, IntentClassification, Kpi, KpiKey, Plan, SuggestedAction};

/// Fully assembled result of one chat turn.
#[derive(Debug, Clone)]
pub struct ChatTurnOutcome {
    pub classification: IntentClassification,
    pub plan: Plan,
    pub reply: String,
    pub kpis: Option<BTreeMap<KpiKey, Kpi>>,
    pub actions: Option<Vec<SuggestedAction>>,
    pub followup: Option<String>,
    pub result_data: Option<serde_json::Value>,
    pub tool_results: Vec<ToolOutcome>,
}

/// Per-request orchestration over shared collaborators.
pub struct Orchestrator {
    gateway: Arc<dyn ModelGateway>,
    tools: Arc<ToolRegistry>,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn ModelGateway>, tools: Arc<ToolRegistry>) -> Self {
        Self { gateway, tools }
    }

    /// Handle one chat turn end to end. The tool context carries the
    /// authenticated scope and the cancellation token.
    pub async fn handle_turn(
        &self,
        ctx: &ToolContext,
        conversation: &[ConversationMessage],
        options: &ChatRequestOptions,
    ) -> OrchestratorResult<ChatTurnOutcome> {
        let classification = self.classify(ctx, conversation, options).await?;
        tracing::info!(
            intent = classification.intent.as_str(),
            confidence = classification.confidence,
            "intent classified"
        );

        let low_confidence = classification.confidence < CONFIDENCE_FLOOR;
        let plan = plan_for(classification.intent);

        let executor = PlanExecutor::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.tools),
            classification.intent,
            low_confidence,
        );
        let state = executor.execute(ctx, &plan, conversation, options).await?;

        let (kpis, actions) = self.latest_snapshot(ctx).await;

        Ok(ChatTurnOutcome {
            classification,
            plan,
            reply: state
                .final_message
                .unwrap_or_else(|| planner::unknown_intent_reply().to_string()),
            kpis,
            actions,
            followup: low_confidence.then(|| CLARIFIER_FOLLOWUP.to_string()),
            result_data: state.result_data,
            tool_results: state.tool_results,
        })
    }

    async fn classify(
        &self,
        ctx: &ToolContext,
        conversation: &[ConversationMessage],
        options: &ChatRequestOptions,
    ) -> OrchestratorResult<IntentClassification> {
        let chat_options = options.classification.to_chat_options();
        let first = self
            .gateway
            .classify_intent(conversation, &chat_options, false, &ctx.cx)
            .await;
        let result = match first {
            Err(ProviderError::InvalidOutput(_)) => {
                self.gateway
                    .classify_intent(conversation, &chat_options, true, &ctx.cx)
                    .await
            }
            other => other,
        };

        match result {
            Ok(classification) => Ok(classification),
            // Keyless deployments still answer, through the unknown path.
            Err(ProviderError::MissingApiKey(provider)) => {
                tracing::warn!(%provider, "no classifier provider configured, treating intent as unknown");
                Ok(arta_providers::unknown_classification())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Latest computed KPIs and the actions they suggest, if any month has
    /// been computed for this user.
    async fn latest_snapshot(
        &self,
        ctx: &ToolContext,
    ) -> (Option<BTreeMap<KpiKey, Kpi>>, Option<Vec<SuggestedAction>>) {
        match ctx.storage.list_insights(&ctx.customer_id, 1).await {
            Ok(insights) => match insights.into_iter().next() {
                Some(insight) => {
                    let health = score_health(&insight);
                    let actions = suggest_actions(&insight, &health);
                    (Some(insight.kpis), Some(actions))
                }
                None => (None, None),
            },
            Err(err) => {
                tracing::warn!(error = %err, "failed to load latest insight for response assembly");
                (None, None)
            }
        }
    }
}
