//! Conversation messages and the typed outputs of the language-model
//! operations (classification, extraction, summarisation).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One turn in the conversation history sent with a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            timestamp: None,
            metadata: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: None,
            metadata: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: None,
            metadata: None,
        }
    }
}

/// Categorical label assigned to the latest user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    RecordTransaction,
    BudgetSummary,
    GeneralQuestion,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::RecordTransaction => "record_transaction",
            Intent::BudgetSummary => "budget_summary",
            Intent::GeneralQuestion => "general_question",
            Intent::Unknown => "unknown",
        }
    }
}

/// Classifier output: label plus confidence in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentClassification {
    pub intent: Intent,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Structured transaction fields pulled from free text. `raw_text` always
/// carries the original message for audit and fallback descriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedTransaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub raw_text: String,
}

/// Month summariser output used verbatim by budget_summary synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub savings_opportunities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_ups: Option<Vec<String>>,
}

/// A vector-memory hit joined back to its insight content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalDocument {
    pub id: String,
    pub user_id: String,
    pub content: String,
    /// Stored metadata enriched with `score`, `month`, `kpis`.
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_wire_names() {
        assert_eq!(
            serde_json::to_string(&Intent::RecordTransaction).unwrap(),
            "\"record_transaction\""
        );
        let parsed: Intent = serde_json::from_str("\"budget_summary\"").unwrap();
        assert_eq!(parsed, Intent::BudgetSummary);
    }

    #[test]
    fn extraction_tolerates_partial_fields() {
        let parsed: ExtractedTransaction =
            serde_json::from_str(r#"{"amount": 125000, "currency": "IDR"}"#).unwrap();
        assert_eq!(parsed.amount, Some(125000.0));
        assert!(parsed.merchant.is_none());
        assert_eq!(parsed.raw_text, "");
    }
}
