//! Dependency-ordered plan execution over a request-scoped state bag.
//!
//! Steps run strictly sequentially. Each step writes its result exactly once
//! into `step_results` before any dependent step runs; tool failures are
//! captured, not thrown, and synthesis decides whether they are fatal.

use std::collections::HashMap;
use std::sync::Arc;

use arta_providers::{ModelGateway, ProviderError, SummarizeRequest};
use arta_storage::{InsightStore, TransactionStore, VectorStore};
use arta_tools::{ToolContext, ToolOutcome, ToolRegistry};
use arta_types::{
    ConversationMessage, Intent, MessageRole, Month, Plan, PlanStep, RetrievalDocument, StepKind,
};
use chrono::Utc;
use serde_json::Value;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::options::ChatRequestOptions;
use crate::planner::unknown_intent_reply;

/// Documents fetched per retrieval step.
const RETRIEVAL_LIMIT: usize = 5;

/// Request-scoped execution state, discarded when the turn completes.
#[derive(Debug, Default)]
pub struct ExecutionState {
    pub retrieved_documents: Vec<RetrievalDocument>,
    pub step_results: HashMap<String, Value>,
    pub tool_results: Vec<ToolOutcome>,
    pub final_message: Option<String>,
    pub result_data: Option<Value>,
}

/// Walks one plan for one intent.
pub struct PlanExecutor {
    gateway: Arc<dyn ModelGateway>,
    tools: Arc<ToolRegistry>,
    intent: Intent,
    low_confidence: bool,
}

impl PlanExecutor {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        tools: Arc<ToolRegistry>,
        intent: Intent,
        low_confidence: bool,
    ) -> Self {
        Self {
            gateway,
            tools,
            intent,
            low_confidence,
        }
    }

    pub async fn execute(
        &self,
        ctx: &ToolContext,
        plan: &Plan,
        conversation: &[ConversationMessage],
        options: &ChatRequestOptions,
    ) -> OrchestratorResult<ExecutionState> {
        let mut state = ExecutionState::default();

        for step in &plan.steps {
            for dependency in &step.depends_on {
                if !state.step_results.contains_key(dependency) {
                    return Err(OrchestratorError::DependencyUnmet {
                        step: step.id.clone(),
                        missing: dependency.clone(),
                    });
                }
            }

            tracing::debug!(step = %step.id, kind = ?step.kind, "executing plan step");
            match step.kind {
                StepKind::Retrieval => {
                    self.run_retrieval(ctx, step, conversation, options, &mut state)
                        .await?
                }
                StepKind::Llm => {
                    self.run_llm(ctx, step, conversation, options, &mut state)
                        .await?
                }
                StepKind::Tool => self.run_tool(ctx, step, &mut state).await,
                StepKind::Synthesis => {
                    self.run_synthesis(ctx, conversation, &mut state).await?;
                    state
                        .step_results
                        .insert(step.id.clone(), serde_json::json!({ "composed": true }));
                }
            }
        }

        // A plan that never synthesised still answers.
        if state.final_message.is_none() {
            self.run_synthesis(ctx, conversation, &mut state).await?;
        }

        Ok(state)
    }

    fn latest_user_message(conversation: &[ConversationMessage]) -> String {
        conversation
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    // ── retrieval ────────────────────────────────────────────────────

    async fn run_retrieval(
        &self,
        ctx: &ToolContext,
        step: &PlanStep,
        conversation: &[ConversationMessage],
        options: &ChatRequestOptions,
        state: &mut ExecutionState,
    ) -> OrchestratorResult<()> {
        let query = step
            .input
            .as_ref()
            .and_then(|input| input.get("query"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Self::latest_user_message(conversation));

        let documents = match self
            .gateway
            .embed(
                &[query],
                &options.retrieval.to_embed_options(),
                &ctx.cx,
            )
            .await
        {
            Ok(outcome) => {
                let vector = outcome.embeddings.into_iter().next().unwrap_or_default();
                if vector.len() == ctx.storage.dimension() {
                    ctx.storage
                        .search(&ctx.customer_id, &vector, RETRIEVAL_LIMIT)
                        .await
                        .map_err(|e| OrchestratorError::Storage(e.to_string()))?
                } else {
                    tracing::warn!(
                        got = vector.len(),
                        want = ctx.storage.dimension(),
                        "embedder dimension mismatch, falling back to recency retrieval"
                    );
                    self.recency_documents(ctx).await?
                }
            }
            // No embedder configured: recent insights stand in for
            // similarity search.
            Err(ProviderError::MissingApiKey(_)) | Err(ProviderError::InvalidConfig(_)) => {
                self.recency_documents(ctx).await?
            }
            Err(err) => return Err(err.into()),
        };

        // The store scopes by user already; filter again anyway.
        let documents: Vec<RetrievalDocument> = documents
            .into_iter()
            .filter(|doc| doc.user_id == ctx.customer_id)
            .collect();

        state.step_results.insert(
            step.id.clone(),
            serde_json::to_value(&documents).unwrap_or(Value::Null),
        );
        state.retrieved_documents = documents;
        Ok(())
    }

    async fn recency_documents(
        &self,
        ctx: &ToolContext,
    ) -> OrchestratorResult<Vec<RetrievalDocument>> {
        let insights = ctx
            .storage
            .list_insights(&ctx.customer_id, RETRIEVAL_LIMIT)
            .await
            .map_err(|e| OrchestratorError::Storage(e.to_string()))?;
        Ok(insights
            .into_iter()
            .map(|insight| RetrievalDocument {
                id: insight.id.clone(),
                user_id: insight.user_id.clone(),
                content: insight.story.clone(),
                metadata: serde_json::json!({
                    "month": insight.month,
                    "kpis": insight.kpis,
                    "score": 0.0,
                }),
            })
            .collect())
    }

    // ── llm steps ────────────────────────────────────────────────────

    async fn run_llm(
        &self,
        ctx: &ToolContext,
        step: &PlanStep,
        conversation: &[ConversationMessage],
        options: &ChatRequestOptions,
        state: &mut ExecutionState,
    ) -> OrchestratorResult<()> {
        match step.action.as_deref() {
            Some("extract-transaction") => {
                let text = Self::latest_user_message(conversation);
                let chat_options = options.extraction.to_chat_options();
                let first = self
                    .gateway
                    .extract_transaction(&text, &chat_options, false, &ctx.cx)
                    .await;
                let extracted = match first {
                    Err(ProviderError::InvalidOutput(_)) => {
                        self.gateway
                            .extract_transaction(&text, &chat_options, true, &ctx.cx)
                            .await?
                    }
                    other => other?,
                };
                state.step_results.insert(
                    step.id.clone(),
                    serde_json::to_value(&extracted).unwrap_or(Value::Null),
                );
            }
            Some("summarize-month") => {
                let month = step
                    .input
                    .as_ref()
                    .and_then(|input| input.get("month"))
                    .and_then(Value::as_str)
                    .and_then(|raw| Month::parse(raw).ok())
                    .unwrap_or_else(current_month);
                let transactions = ctx
                    .storage
                    .list_transactions(&ctx.tenant_id, &ctx.customer_id, Some(&month), 0)
                    .await
                    .map_err(|e| OrchestratorError::Storage(e.to_string()))?;
                let request = SummarizeRequest {
                    user_id: ctx.customer_id.clone(),
                    month,
                    transactions,
                    context: state.retrieved_documents.clone(),
                    tone: None,
                };
                let chat_options = options.summarization.to_chat_options();
                let first = self
                    .gateway
                    .summarize_month(&request, &chat_options, false, &ctx.cx)
                    .await;
                let summary = match first {
                    Err(ProviderError::InvalidOutput(_)) => {
                        self.gateway
                            .summarize_month(&request, &chat_options, true, &ctx.cx)
                            .await?
                    }
                    other => other?,
                };
                state.step_results.insert(
                    step.id.clone(),
                    serde_json::to_value(&summary).unwrap_or(Value::Null),
                );
            }
            other => {
                return Err(OrchestratorError::Internal(format!(
                    "unknown llm action {other:?}"
                )))
            }
        }
        Ok(())
    }

    // ── tool steps ───────────────────────────────────────────────────

    async fn run_tool(&self, ctx: &ToolContext, step: &PlanStep, state: &mut ExecutionState) {
        let name = step.tool.as_deref().unwrap_or("");

        if self.low_confidence {
            let outcome =
                ToolOutcome::skipped(name, "low classification confidence, side effects demoted");
            state.step_results.insert(
                step.id.clone(),
                serde_json::to_value(&outcome).unwrap_or(Value::Null),
            );
            state.tool_results.push(outcome);
            return;
        }
        if !self.tools.contains(name) {
            let outcome = ToolOutcome::skipped(name, "Tool handler not registered");
            state.step_results.insert(
                step.id.clone(),
                serde_json::to_value(&outcome).unwrap_or(Value::Null),
            );
            state.tool_results.push(outcome);
            return;
        }

        let mut input = step
            .input
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        if name == "transactions.create" && input.get("transaction").is_none() {
            if let Some(extracted) = state.step_results.get("extract-transaction") {
                input["transaction"] = extracted.clone();
            }
        }

        let outcome = self.tools.invoke(ctx, name, input).await;
        state.step_results.insert(
            step.id.clone(),
            serde_json::to_value(&outcome).unwrap_or(Value::Null),
        );
        state.tool_results.push(outcome);
    }

    // ── synthesis ────────────────────────────────────────────────────

    async fn run_synthesis(
        &self,
        ctx: &ToolContext,
        conversation: &[ConversationMessage],
        state: &mut ExecutionState,
    ) -> OrchestratorResult<()> {
        match self.intent {
            Intent::RecordTransaction => self.synthesize_record(state),
            Intent::BudgetSummary => self.synthesize_summary(state),
            Intent::GeneralQuestion => {
                self.synthesize_grounded_answer(ctx, conversation, state)
                    .await?
            }
            Intent::Unknown => {
                state.final_message = Some(unknown_intent_reply().to_string());
            }
        }
        Ok(())
    }

    fn synthesize_record(&self, state: &mut ExecutionState) {
        let persisted = state
            .tool_results
            .iter()
            .find(|outcome| outcome.tool == "transactions.create");
        let extracted = state.step_results.get("extract-transaction");

        match persisted {
            Some(outcome) if outcome.is_ok() => {
                let data = outcome.data.clone().unwrap_or(Value::Null);
                let amount = extracted
                    .and_then(|e| e["amount"].as_f64())
                    .or_else(|| decimal_field(&data["transaction"]["amount"]))
                    .unwrap_or(0.0);
                let currency = extracted
                    .and_then(|e| e["currency"].as_str().map(str::to_string))
                    .or_else(|| data["transaction"]["currency"].as_str().map(str::to_string))
                    .unwrap_or_else(|| "USD".to_string());
                let merchant = extracted
                    .and_then(|e| e["merchant"].as_str().map(str::to_string))
                    .unwrap_or_else(|| "the merchant".to_string());
                let date = extracted
                    .and_then(|e| e["occurredAt"].as_str().map(str::to_string))
                    .unwrap_or_else(|| "the specified date".to_string());

                state.final_message = Some(format!(
                    "Got it! I've recorded {currency} {:.2} for {merchant} on {date}. Anything else you need?",
                    amount.abs()
                ));
                state.result_data = Some(data);
            }
            Some(outcome) if outcome.status == arta_tools::ToolStatus::Skipped => {
                state.final_message = Some(
                    "I held off on saving that transaction for now.".to_string(),
                );
                state.result_data = Some(serde_json::json!({ "code": null }));
            }
            _ => {
                state.final_message = Some(
                    "Sorry, I couldn't save that transaction right now. Please try again shortly."
                        .to_string(),
                );
                state.result_data = Some(serde_json::json!({ "code": null }));
            }
        }
    }

    fn synthesize_summary(&self, state: &mut ExecutionState) {
        let summary = state.step_results.get("summarize-month").cloned();
        match summary {
            Some(value) => {
                // The validated summary text is used verbatim.
                let text = value["summary"].as_str().unwrap_or_default().to_string();
                state.final_message = Some(if text.is_empty() {
                    "I don't have a summary for this month yet.".to_string()
                } else {
                    text
                });
                state.result_data = Some(value);
            }
            None => {
                state.final_message =
                    Some("I don't have a summary for this month yet.".to_string());
            }
        }
    }

    async fn synthesize_grounded_answer(
        &self,
        ctx: &ToolContext,
        conversation: &[ConversationMessage],
        state: &mut ExecutionState,
    ) -> OrchestratorResult<()> {
        let context = if state.retrieved_documents.is_empty() {
            "(no stored records)".to_string()
        } else {
            state
                .retrieved_documents
                .iter()
                .map(|doc| doc.content.as_str())
                .collect::<Vec<_>>()
                .join("\n---\n")
        };
        let system = format!(
            "You are a personal-finance assistant. Answer strictly from the \
             context below. If the context does not cover the question, say \
             that you have no records for it yet.\n\nContext:\n{context}"
        );

        let mut messages = vec![ConversationMessage::system(system)];
        messages.extend(conversation.iter().cloned());

        match self
            .gateway
            .chat(&messages, &Default::default(), &ctx.cx)
            .await
        {
            Ok(outcome) => {
                state.final_message = Some(outcome.message.content);
            }
            Err(ProviderError::MissingApiKey(_)) => {
                state.final_message = Some(if state.retrieved_documents.is_empty() {
                    "I don't have any records for you yet.".to_string()
                } else {
                    // Keyless mode: surface the freshest stored narrative.
                    state.retrieved_documents[0].content.clone()
                });
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }
}

fn current_month() -> Month {
    // The formatter always yields a valid YYYY-MM.
    Month::parse(&Utc::now().format("%Y-%m").to_string())
        .unwrap_or_else(|_| Month::parse("1970-01").expect("static month"))
}

fn decimal_field(value: &Value) -> Option<f64> {
    match value {
        Value::String(raw) => raw.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ChatRequestOptions;
    use crate::planner::plan_for;
    use arta_providers::{
        ChatOptions, ChatOutcome, EmbedOptions, EmbedOutcome, ProviderName, ProviderResult,
    };
    use arta_storage::{InMemoryStorage, TransactionStore};
    use arta_types::{ExtractedTransaction, IntentClassification, MonthlySummary};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Scripted gateway: canned answers per operation, records strict flags.
    #[derive(Default)]
    struct ScriptedGateway {
        extractions: Mutex<Vec<ProviderResult<ExtractedTransaction>>>,
        summaries: Mutex<Vec<ProviderResult<MonthlySummary>>>,
        chat_reply: Option<String>,
        strict_extractions: AtomicUsize,
    }

    #[async_trait]
    impl ModelGateway for ScriptedGateway {
        async fn chat(
            &self,
            _messages: &[ConversationMessage],
            _options: &ChatOptions,
            _cx: &CancellationToken,
        ) -> ProviderResult<ChatOutcome> {
            match &self.chat_reply {
                Some(reply) => Ok(ChatOutcome {
                    provider: ProviderName::OpenAi,
                    model: "scripted".to_string(),
                    message: ConversationMessage::assistant(reply.clone()),
                    usage: None,
                }),
                None => Err(ProviderError::MissingApiKey("openai".to_string())),
            }
        }

        async fn embed(
            &self,
            _texts: &[String],
            _options: &EmbedOptions,
            _cx: &CancellationToken,
        ) -> ProviderResult<EmbedOutcome> {
            Err(ProviderError::MissingApiKey("openai".to_string()))
        }

        async fn classify_intent(
            &self,
            _conversation: &[ConversationMessage],
            _options: &ChatOptions,
            _strict: bool,
            _cx: &CancellationToken,
        ) -> ProviderResult<IntentClassification> {
            Err(ProviderError::MissingApiKey("openai".to_string()))
        }

        async fn extract_transaction(
            &self,
            _text: &str,
            _options: &ChatOptions,
            strict: bool,
            _cx: &CancellationToken,
        ) -> ProviderResult<ExtractedTransaction> {
            if strict {
                self.strict_extractions.fetch_add(1, Ordering::SeqCst);
            }
            let mut queue = self.extractions.lock().unwrap();
            if queue.is_empty() {
                return Err(ProviderError::InvalidOutput("queue empty".into()));
            }
            queue.remove(0)
        }

        async fn summarize_month(
            &self,
            _request: &SummarizeRequest,
            _options: &ChatOptions,
            _strict: bool,
            _cx: &CancellationToken,
        ) -> ProviderResult<MonthlySummary> {
            let mut queue = self.summaries.lock().unwrap();
            if queue.is_empty() {
                return Err(ProviderError::InvalidOutput("queue empty".into()));
            }
            queue.remove(0)
        }
    }

    fn extraction() -> ExtractedTransaction {
        ExtractedTransaction {
            amount: Some(125000.0),
            currency: Some("IDR".to_string()),
            occurred_at: Some("2024-05-11T13:00:00+07:00".to_string()),
            merchant: Some("the corner warung".to_string()),
            category: Some("food".to_string()),
            notes: None,
            description: Some("lunch".to_string()),
            raw_text: "I spent IDR 125000 on lunch today".to_string(),
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

    fn conversation(text: &str) -> Vec<ConversationMessage> {
        vec![ConversationMessage::user(text)]
    }

    fn executor(gateway: Arc<dyn ModelGateway>, intent: Intent, low: bool) -> PlanExecutor {
        PlanExecutor::new(gateway, Arc::new(ToolRegistry::with_builtin()), intent, low)
    }

    #[tokio::test]
    async fn record_transaction_happy_path() {
        let gateway = Arc::new(ScriptedGateway {
            extractions: Mutex::new(vec![Ok(extraction())]),
            ..ScriptedGateway::default()
        });
        let ctx = context();
        let exec = executor(gateway, Intent::RecordTransaction, false);
        let state = exec
            .execute(
                &ctx,
                &plan_for(Intent::RecordTransaction),
                &conversation("I spent IDR 125000 on lunch today"),
                &ChatRequestOptions::default(),
            )
            .await
            .unwrap();

        let reply = state.final_message.unwrap();
        assert!(
            reply.starts_with("Got it! I've recorded IDR 125000.00 for "),
            "{reply}"
        );
        assert!(reply.ends_with(". Anything else you need?"), "{reply}");

        let rows = ctx
            .storage
            .list_transactions("tenant-a", "cust-a", None, 0)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].currency, "IDR");
    }

    #[tokio::test]
    async fn extraction_retries_once_with_strict_directive() {
        let gateway = Arc::new(ScriptedGateway {
            extractions: Mutex::new(vec![
                Err(ProviderError::InvalidOutput("prose".into())),
                Ok(extraction()),
            ]),
            ..ScriptedGateway::default()
        });
        let ctx = context();
        let exec = executor(gateway.clone(), Intent::RecordTransaction, false);
        let state = exec
            .execute(
                &ctx,
                &plan_for(Intent::RecordTransaction),
                &conversation("spent 125000"),
                &ChatRequestOptions::default(),
            )
            .await
            .unwrap();

        assert!(state.final_message.unwrap().starts_with("Got it!"));
        assert_eq!(gateway.strict_extractions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn double_extraction_failure_surfaces_invalid_output() {
        let gateway = Arc::new(ScriptedGateway {
            extractions: Mutex::new(vec![
                Err(ProviderError::InvalidOutput("prose".into())),
                Err(ProviderError::InvalidOutput("still prose".into())),
            ]),
            ..ScriptedGateway::default()
        });
        let ctx = context();
        let exec = executor(gateway, Intent::RecordTransaction, false);
        let err = exec
            .execute(
                &ctx,
                &plan_for(Intent::RecordTransaction),
                &conversation("spent 125000"),
                &ChatRequestOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Provider(ProviderError::InvalidOutput(_))
        ));
    }

    #[tokio::test]
    async fn low_confidence_demotes_tool_steps() {
        let gateway = Arc::new(ScriptedGateway {
            extractions: Mutex::new(vec![Ok(extraction())]),
            ..ScriptedGateway::default()
        });
        let ctx = context();
        let exec = executor(gateway, Intent::RecordTransaction, true);
        let state = exec
            .execute(
                &ctx,
                &plan_for(Intent::RecordTransaction),
                &conversation("maybe something with money?"),
                &ChatRequestOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(state.tool_results.len(), 1);
        assert_eq!(
            state.tool_results[0].status,
            arta_tools::ToolStatus::Skipped
        );
        let rows = ctx
            .storage
            .list_transactions("tenant-a", "cust-a", None, 0)
            .await
            .unwrap();
        assert!(rows.is_empty(), "no side effects under low confidence");
    }

    #[tokio::test]
    async fn unregistered_tool_is_recorded_and_plan_continues() {
        let gateway = Arc::new(ScriptedGateway {
            extractions: Mutex::new(vec![Ok(extraction())]),
            ..ScriptedGateway::default()
        });
        let ctx = context();
        let exec = PlanExecutor::new(
            gateway,
            Arc::new(ToolRegistry::new()),
            Intent::RecordTransaction,
            false,
        );
        let state = exec
            .execute(
                &ctx,
                &plan_for(Intent::RecordTransaction),
                &conversation("spent 125000"),
                &ChatRequestOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(state.tool_results.len(), 1);
        assert_eq!(
            state.tool_results[0].reason.as_deref(),
            Some("Tool handler not registered")
        );
        // Synthesis still produced a message.
        assert!(state.final_message.is_some());
    }

    #[tokio::test]
    async fn dependency_unmet_fails_fast() {
        let gateway = Arc::new(ScriptedGateway::default());
        let ctx = context();
        let exec = executor(gateway, Intent::Unknown, false);
        let plan = Plan::new(vec![PlanStep::new(
            "respond-user",
            StepKind::Synthesis,
            "needs a missing step",
        )
        .depends_on(&["never-ran"])]);
        let err = exec
            .execute(&ctx, &plan, &conversation("hi"), &ChatRequestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::DependencyUnmet { .. }));
    }

    #[tokio::test]
    async fn budget_summary_uses_summary_verbatim() {
        let gateway = Arc::new(ScriptedGateway {
            summaries: Mutex::new(vec![Ok(MonthlySummary {
                summary: "May was a strong month for savings.".to_string(),
                highlights: vec!["income up".to_string()],
                savings_opportunities: vec![],
                follow_ups: None,
            })]),
            ..ScriptedGateway::default()
        });
        let ctx = context();
        let exec = executor(gateway, Intent::BudgetSummary, false);
        let state = exec
            .execute(
                &ctx,
                &plan_for(Intent::BudgetSummary),
                &conversation("how did I do this month?"),
                &ChatRequestOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            state.final_message.unwrap(),
            "May was a strong month for savings."
        );
    }

    #[tokio::test]
    async fn unknown_intent_answers_with_fixed_line() {
        let gateway = Arc::new(ScriptedGateway::default());
        let ctx = context();
        let exec = executor(gateway, Intent::Unknown, false);
        let state = exec
            .execute(
                &ctx,
                &plan_for(Intent::Unknown),
                &conversation("???"),
                &ChatRequestOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            state.final_message.unwrap(),
            "I'm not sure how to help with that yet, but I'm learning more every day!"
        );
    }

    #[tokio::test]
    async fn general_question_keyless_falls_back_to_stored_story() {
        let gateway = Arc::new(ScriptedGateway::default());
        let ctx = context();
        let exec = executor(gateway, Intent::GeneralQuestion, false);
        let state = exec
            .execute(
                &ctx,
                &plan_for(Intent::GeneralQuestion),
                &conversation("what do you know about my spending?"),
                &ChatRequestOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            state.final_message.unwrap(),
            "I don't have any records for you yet."
        );
    }
}
