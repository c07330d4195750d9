//! Typed per-request options.
//!
//! The chat request's dynamic options object maps onto an enumerated struct:
//! one `{provider, model}` pair per pipeline stage. Unknown fields are
//! rejected at the boundary.

use arta_providers::{ChatOptions, EmbedOptions, ProviderName};
use serde::Deserialize;

/// Provider/model override for one pipeline stage.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StageOptions {
    #[serde(default)]
    pub provider: Option<ProviderName>,
    #[serde(default)]
    pub model: Option<String>,
}

impl StageOptions {
    pub fn to_chat_options(&self) -> ChatOptions {
        ChatOptions {
            provider: self.provider,
            model: self.model.clone(),
            ..ChatOptions::default()
        }
    }

    pub fn to_embed_options(&self) -> EmbedOptions {
        EmbedOptions {
            provider: self.provider,
            model: self.model.clone(),
        }
    }
}

/// Per-stage overrides for one chat turn.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChatRequestOptions {
    #[serde(default)]
    pub classification: StageOptions,
    #[serde(default)]
    pub extraction: StageOptions,
    #[serde(default)]
    pub summarization: StageOptions,
    #[serde(default)]
    pub retrieval: StageOptions,
}
