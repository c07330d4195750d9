//! Typed language-model operations on top of raw `chat`.
//!
//! Classifier, extractor and summariser all share the same contract: build a
//! constrained prompt, run `chat`, coerce the reply into JSON and validate it
//! with serde. Schema failures surface as `MODEL_OUTPUT_INVALID`; the plan
//! executor owns the single strict-JSON retry.

use arta_types::{
    ConversationMessage, ExtractedTransaction, Intent, IntentClassification, Month,
    MonthlySummary, RetrievalDocument, Transaction,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, ProviderResult};
use crate::router::{ChatOptions, ChatOutcome, EmbedOptions, EmbedOutcome, ProviderRouter};

/// Extra system directive applied on the strict retry.
const STRICT_JSON_DIRECTIVE: &str =
    "Respond with strict JSON only. No prose, no code fences, no commentary.";

/// Input to the month summariser.
#[derive(Debug, Clone)]
pub struct SummarizeRequest {
    pub user_id: String,
    pub month: Month,
    pub transactions: Vec<Transaction>,
    pub context: Vec<RetrievalDocument>,
    pub tone: Option<String>,
}

/// Locate the first `{` and last `}` in a model reply and parse the slice as
/// JSON. Anything else is `MODEL_OUTPUT_INVALID`.
pub fn coerce_json(raw: &str) -> ProviderResult<serde_json::Value> {
    let start = raw
        .find('{')
        .ok_or_else(|| ProviderError::InvalidOutput("no JSON object in model output".into()))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| ProviderError::InvalidOutput("unterminated JSON object".into()))?;
    if end < start {
        return Err(ProviderError::InvalidOutput(
            "malformed JSON object bounds".into(),
        ));
    }
    serde_json::from_str(&raw[start..=end])
        .map_err(|e| ProviderError::InvalidOutput(format!("JSON parse failed: {e}")))
}

/// The uniform model surface consumed by the orchestrator. `ProviderRouter`
/// is the production implementation; tests script their own.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn chat(
        &self,
        messages: &[ConversationMessage],
        options: &ChatOptions,
        cx: &CancellationToken,
    ) -> ProviderResult<ChatOutcome>;

    async fn embed(
        &self,
        texts: &[String],
        options: &EmbedOptions,
        cx: &CancellationToken,
    ) -> ProviderResult<EmbedOutcome>;

    async fn classify_intent(
        &self,
        conversation: &[ConversationMessage],
        options: &ChatOptions,
        strict: bool,
        cx: &CancellationToken,
    ) -> ProviderResult<IntentClassification>;

    async fn extract_transaction(
        &self,
        text: &str,
        options: &ChatOptions,
        strict: bool,
        cx: &CancellationToken,
    ) -> ProviderResult<ExtractedTransaction>;

    async fn summarize_month(
        &self,
        request: &SummarizeRequest,
        options: &ChatOptions,
        strict: bool,
        cx: &CancellationToken,
    ) -> ProviderResult<MonthlySummary>;
}

fn classifier_prompt() -> String {
    "You classify the latest user message of a personal-finance conversation. \
     Reply with a JSON object: {\"intent\": one of \"record_transaction\", \
     \"budget_summary\", \"general_question\", \"unknown\", \"confidence\": \
     number in [0,1], \"reasoning\": short string}."
        .to_string()
}

fn extractor_prompt() -> String {
    "Extract transaction fields from the user's message. Reply with a JSON \
     object with any of: amount (number), currency (ISO 4217 code), \
     occurredAt (ISO 8601), merchant, category, notes, description. Omit \
     fields you cannot determine."
        .to_string()
}

fn summarizer_prompt(request: &SummarizeRequest) -> String {
    let tone = request.tone.as_deref().unwrap_or("encouraging");
    format!(
        "Summarise the month {} for the user in a {tone} tone. Reply with a \
         JSON object: {{\"summary\": string, \"highlights\": [string], \
         \"savingsOpportunities\": [string], \"followUps\": [string]}}.",
        request.month
    )
}

fn with_strict(mut messages: Vec<ConversationMessage>, strict: bool) -> Vec<ConversationMessage> {
    if strict {
        messages.insert(0, ConversationMessage::system(STRICT_JSON_DIRECTIVE));
    }
    messages
}

#[async_trait]
impl ModelGateway for ProviderRouter {
    async fn chat(
        &self,
        messages: &[ConversationMessage],
        options: &ChatOptions,
        cx: &CancellationToken,
    ) -> ProviderResult<ChatOutcome> {
        ProviderRouter::chat(self, messages, options, cx).await
    }

    async fn embed(
        &self,
        texts: &[String],
        options: &EmbedOptions,
        cx: &CancellationToken,
    ) -> ProviderResult<EmbedOutcome> {
        ProviderRouter::embed(self, texts, options, cx).await
    }

    async fn classify_intent(
        &self,
        conversation: &[ConversationMessage],
        options: &ChatOptions,
        strict: bool,
        cx: &CancellationToken,
    ) -> ProviderResult<IntentClassification> {
        let mut messages = vec![ConversationMessage::system(classifier_prompt())];
        messages.extend(conversation.iter().cloned());
        let outcome = ProviderRouter::chat(self, &with_strict(messages, strict), options, cx).await?;
        let value = coerce_json(&outcome.message.content)?;
        let mut classification: IntentClassification = serde_json::from_value(value)
            .map_err(|e| ProviderError::InvalidOutput(format!("classification shape: {e}")))?;
        classification.confidence = classification.confidence.clamp(0.0, 1.0);
        Ok(classification)
    }

    async fn extract_transaction(
        &self,
        text: &str,
        options: &ChatOptions,
        strict: bool,
        cx: &CancellationToken,
    ) -> ProviderResult<ExtractedTransaction> {
        let messages = vec![
            ConversationMessage::system(extractor_prompt()),
            ConversationMessage::user(text),
        ];
        let outcome = ProviderRouter::chat(self, &with_strict(messages, strict), options, cx).await?;
        let value = coerce_json(&outcome.message.content)?;
        let mut extracted: ExtractedTransaction = serde_json::from_value(value)
            .map_err(|e| ProviderError::InvalidOutput(format!("extraction shape: {e}")))?;
        extracted.raw_text = text.to_string();
        Ok(extracted)
    }

    async fn summarize_month(
        &self,
        request: &SummarizeRequest,
        options: &ChatOptions,
        strict: bool,
        cx: &CancellationToken,
    ) -> ProviderResult<MonthlySummary> {
        let mut digest = String::new();
        for doc in &request.context {
            digest.push_str(&doc.content);
            digest.push('\n');
        }
        for txn in request.transactions.iter().take(50) {
            digest.push_str(&format!(
                "{} {} {} {}\n",
                txn.occurred_at.format("%Y-%m-%d"),
                txn.kind.as_str(),
                txn.amount,
                txn.description.as_deref().unwrap_or("-"),
            ));
        }

        let messages = vec![
            ConversationMessage::system(summarizer_prompt(request)),
            ConversationMessage::user(digest),
        ];
        let outcome = ProviderRouter::chat(self, &with_strict(messages, strict), options, cx).await?;
        let value = coerce_json(&outcome.message.content)?;
        serde_json::from_value(value)
            .map_err(|e| ProviderError::InvalidOutput(format!("summary shape: {e}")))
    }
}

/// Convenience constructor for the unknown-intent fallback classification.
pub fn unknown_classification() -> IntentClassification {
    IntentClassification {
        intent: Intent::Unknown,
        confidence: 0.0,
        reasoning: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercion_strips_prose_and_fences() {
        let raw = "Sure! Here is the JSON:\n```json\n{\"intent\": \"unknown\", \
                   \"confidence\": 0.3}\n```\nLet me know if you need more.";
        let value = coerce_json(raw).unwrap();
        assert_eq!(value["intent"], "unknown");
    }

    #[test]
    fn coercion_rejects_plain_text() {
        assert!(matches!(
            coerce_json("I could not produce JSON"),
            Err(ProviderError::InvalidOutput(_))
        ));
        assert!(matches!(
            coerce_json("} backwards {"),
            Err(ProviderError::InvalidOutput(_))
        ));
    }

    #[test]
    fn strict_flag_prepends_directive() {
        let messages = with_strict(vec![ConversationMessage::user("hi")], true);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("strict JSON"));

        let untouched = with_strict(vec![ConversationMessage::user("hi")], false);
        assert_eq!(untouched.len(), 1);
    }
}
