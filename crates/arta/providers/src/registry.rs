//! Provider capability records.
//!
//! Each vendor is a [`ProviderSpec`]: a bundle of endpoint/header/payload
//! builders and response parsers selected by [`ProviderName`]. The router
//! never knows vendor wire formats; it only moves JSON through these hooks.

use crate::error::{ProviderError, ProviderResult};
use arta_types::{ConversationMessage, MessageRole};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderName {
    pub const ALL: [ProviderName; 3] =
        [ProviderName::OpenAi, ProviderName::Anthropic, ProviderName::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::OpenAi => "openai",
            ProviderName::Anthropic => "anthropic",
            ProviderName::Gemini => "gemini",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "openai" => Some(ProviderName::OpenAi),
            "anthropic" => Some(ProviderName::Anthropic),
            "gemini" => Some(ProviderName::Gemini),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tuning knobs forwarded into the chat payload builders.
#[derive(Debug, Clone, Default)]
pub struct ChatTuning {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Parsed assistant reply plus token usage when the vendor reports it.
#[derive(Debug, Clone)]
pub struct ParsedChat {
    pub content: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// Capability record for one vendor.
pub struct ProviderSpec {
    pub name: ProviderName,
    pub default_chat_model: &'static str,
    /// Empty when the vendor has no embedding endpoint.
    pub default_embed_model: &'static str,
    pub api_key_env: &'static str,
    pub chat_endpoint: fn(model: &str, api_key: &str) -> String,
    pub embed_endpoint: Option<fn(model: &str, api_key: &str) -> String>,
    pub headers: fn(api_key: &str) -> Vec<(String, String)>,
    pub chat_payload: fn(model: &str, messages: &[ConversationMessage], tuning: &ChatTuning) -> serde_json::Value,
    pub parse_chat: fn(&serde_json::Value) -> ProviderResult<ParsedChat>,
    pub embed_payload: Option<fn(model: &str, texts: &[String]) -> serde_json::Value>,
    pub parse_embed: Option<fn(&serde_json::Value) -> ProviderResult<Vec<Vec<f32>>>>,
}

/// Look up the built-in record for a provider.
pub fn builtin_spec(name: ProviderName) -> &'static ProviderSpec {
    match name {
        ProviderName::OpenAi => &OPENAI_SPEC,
        ProviderName::Anthropic => &ANTHROPIC_SPEC,
        ProviderName::Gemini => &GEMINI_SPEC,
    }
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

fn missing(path: &str) -> ProviderError {
    ProviderError::InvalidOutput(format!("response missing `{path}`"))
}

// ── OpenAI ───────────────────────────────────────────────────────────

static OPENAI_SPEC: ProviderSpec = ProviderSpec {
    name: ProviderName::OpenAi,
    default_chat_model: "gpt-4o-mini",
    default_embed_model: "text-embedding-3-small",
    api_key_env: "OPENAI_API_KEY",
    chat_endpoint: |_, _| "https://api.openai.com/v1/chat/completions".to_string(),
    embed_endpoint: Some(|_, _| "https://api.openai.com/v1/embeddings".to_string()),
    headers: |api_key| {
        vec![(
            "authorization".to_string(),
            format!("Bearer {api_key}"),
        )]
    },
    chat_payload: |model, messages, tuning| {
        let messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| serde_json::json!({ "role": role_str(m.role), "content": m.content }))
            .collect();
        let mut payload = serde_json::json!({ "model": model, "messages": messages });
        if let Some(temperature) = tuning.temperature {
            payload["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = tuning.max_tokens {
            payload["max_tokens"] = serde_json::json!(max_tokens);
        }
        payload
    },
    parse_chat: |body| {
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| missing("choices[0].message.content"))?
            .to_string();
        Ok(ParsedChat {
            content,
            input_tokens: body["usage"]["prompt_tokens"].as_u64(),
            output_tokens: body["usage"]["completion_tokens"].as_u64(),
        })
    },
    embed_payload: Some(|model, texts| {
        serde_json::json!({ "model": model, "input": texts })
    }),
    parse_embed: Some(|body| {
        let data = body["data"].as_array().ok_or_else(|| missing("data"))?;
        data.iter()
            .map(|item| {
                item["embedding"]
                    .as_array()
                    .ok_or_else(|| missing("data[].embedding"))?
                    .iter()
                    .map(|v| {
                        v.as_f64()
                            .map(|f| f as f32)
                            .ok_or_else(|| missing("data[].embedding[]"))
                    })
                    .collect()
            })
            .collect()
    }),
};

// ── Anthropic (chat only) ────────────────────────────────────────────

static ANTHROPIC_SPEC: ProviderSpec = ProviderSpec {
    name: ProviderName::Anthropic,
    default_chat_model: "claude-3-5-haiku-latest",
    default_embed_model: "",
    api_key_env: "ANTHROPIC_API_KEY",
    chat_endpoint: |_, _| "https://api.anthropic.com/v1/messages".to_string(),
    embed_endpoint: None,
    headers: |api_key| {
        vec![
            ("x-api-key".to_string(), api_key.to_string()),
            ("anthropic-version".to_string(), "2023-06-01".to_string()),
        ]
    },
    chat_payload: |model, messages, tuning| {
        // System turns travel in the dedicated field; the messages array
        // only carries user/assistant turns.
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();
        let turns: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| serde_json::json!({ "role": role_str(m.role), "content": m.content }))
            .collect();
        let mut payload = serde_json::json!({
            "model": model,
            "max_tokens": tuning.max_tokens.unwrap_or(1024),
            "messages": turns,
        });
        if !system.is_empty() {
            payload["system"] = serde_json::json!(system.join("\n\n"));
        }
        if let Some(temperature) = tuning.temperature {
            payload["temperature"] = serde_json::json!(temperature);
        }
        payload
    },
    parse_chat: |body| {
        let content = body["content"][0]["text"]
            .as_str()
            .ok_or_else(|| missing("content[0].text"))?
            .to_string();
        Ok(ParsedChat {
            content,
            input_tokens: body["usage"]["input_tokens"].as_u64(),
            output_tokens: body["usage"]["output_tokens"].as_u64(),
        })
    },
    embed_payload: None,
    parse_embed: None,
};

// ── Gemini ───────────────────────────────────────────────────────────

static GEMINI_SPEC: ProviderSpec = ProviderSpec {
    name: ProviderName::Gemini,
    default_chat_model: "gemini-1.5-flash",
    default_embed_model: "text-embedding-004",
    api_key_env: "GEMINI_API_KEY",
    chat_endpoint: |model, api_key| {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent?key={api_key}"
        )
    },
    embed_endpoint: Some(|model, api_key| {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{model}:batchEmbedContents?key={api_key}"
        )
    }),
    headers: |_| Vec::new(),
    chat_payload: |model, messages, tuning| {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();
        let contents: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| {
                let role = match m.role {
                    MessageRole::Assistant => "model",
                    _ => "user",
                };
                serde_json::json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();
        let mut payload = serde_json::json!({ "contents": contents });
        if !system.is_empty() {
            payload["systemInstruction"] =
                serde_json::json!({ "parts": [{ "text": system.join("\n\n") }] });
        }
        if let Some(temperature) = tuning.temperature {
            payload["generationConfig"] = serde_json::json!({ "temperature": temperature });
        }
        let _ = model;
        payload
    },
    parse_chat: |body| {
        let content = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| missing("candidates[0].content.parts[0].text"))?
            .to_string();
        Ok(ParsedChat {
            content,
            input_tokens: body["usageMetadata"]["promptTokenCount"].as_u64(),
            output_tokens: body["usageMetadata"]["candidatesTokenCount"].as_u64(),
        })
    },
    embed_payload: Some(|model, texts| {
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|text| {
                serde_json::json!({
                    "model": format!("models/{model}"),
                    "content": { "parts": [{ "text": text }] }
                })
            })
            .collect();
        serde_json::json!({ "requests": requests })
    }),
    parse_embed: Some(|body| {
        let embeddings = body["embeddings"]
            .as_array()
            .ok_or_else(|| missing("embeddings"))?;
        embeddings
            .iter()
            .map(|item| {
                item["values"]
                    .as_array()
                    .ok_or_else(|| missing("embeddings[].values"))?
                    .iter()
                    .map(|v| {
                        v.as_f64()
                            .map(|f| f as f32)
                            .ok_or_else(|| missing("embeddings[].values[]"))
                    })
                    .collect()
            })
            .collect()
    }),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_round_trip() {
        for name in ProviderName::ALL {
            assert_eq!(ProviderName::parse(name.as_str()), Some(name));
        }
        assert_eq!(ProviderName::parse("mistral"), None);
    }

    #[test]
    fn openai_chat_payload_shape() {
        let spec = builtin_spec(ProviderName::OpenAi);
        let messages = vec![
            ConversationMessage::system("be brief"),
            ConversationMessage::user("hello"),
        ];
        let payload = (spec.chat_payload)("gpt-4o-mini", &messages, &ChatTuning::default());
        assert_eq!(payload["model"], "gpt-4o-mini");
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "hello");
    }

    #[test]
    fn anthropic_moves_system_out_of_messages() {
        let spec = builtin_spec(ProviderName::Anthropic);
        let messages = vec![
            ConversationMessage::system("be brief"),
            ConversationMessage::user("hello"),
        ];
        let payload = (spec.chat_payload)("claude", &messages, &ChatTuning::default());
        assert_eq!(payload["system"], "be brief");
        assert_eq!(payload["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn openai_parse_chat_reads_first_choice() {
        let spec = builtin_spec(ProviderName::OpenAi);
        let body = serde_json::json!({
            "choices": [{ "message": { "content": "hi there" } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 4 }
        });
        let parsed = (spec.parse_chat)(&body).unwrap();
        assert_eq!(parsed.content, "hi there");
        assert_eq!(parsed.input_tokens, Some(12));
    }

    #[test]
    fn parse_chat_reports_missing_content() {
        let spec = builtin_spec(ProviderName::OpenAi);
        let err = (spec.parse_chat)(&serde_json::json!({ "choices": [] }));
        assert!(matches!(err, Err(ProviderError::InvalidOutput(_))));
    }

    #[test]
    fn gemini_embed_batches_requests() {
        let spec = builtin_spec(ProviderName::Gemini);
        let payload = (spec.embed_payload.unwrap())(
            "text-embedding-004",
            &["a".to_string(), "b".to_string()],
        );
        assert_eq!(payload["requests"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn anthropic_has_no_embedding_capability() {
        let spec = builtin_spec(ProviderName::Anthropic);
        assert!(spec.embed_endpoint.is_none());
        assert!(spec.parse_embed.is_none());
    }
}
