//! The provider router: retries, backoff, cancellation, batching.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arta_types::ConversationMessage;
use tokio_util::sync::CancellationToken;

use crate::error::{truncate_message, ProviderError, ProviderResult};
use crate::registry::{builtin_spec, ChatTuning, ProviderName, ProviderSpec};
use crate::transport::{HttpCall, ProviderTransport};

/// Maximum characters of an embedding input text.
pub const EMBED_TEXT_LIMIT: usize = 400;
/// Maximum texts per upstream embedding call.
pub const EMBED_BATCH_LIMIT: usize = 32;
/// Upstream error messages are clipped to this many characters.
const ERROR_MESSAGE_LIMIT: usize = 200;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub factor: u32,
}

impl RetryPolicy {
    pub fn chat_default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(250),
            factor: 2,
        }
    }

    pub fn embed_default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(200),
            factor: 2,
        }
    }
}

/// Per-call chat options.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub provider: Option<ProviderName>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Per-call embedding options.
#[derive(Debug, Clone, Default)]
pub struct EmbedOptions {
    pub provider: Option<ProviderName>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Usage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// Outcome of a chat call.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub provider: ProviderName,
    pub model: String,
    pub message: ConversationMessage,
    pub usage: Option<Usage>,
}

/// Outcome of an embed call; order matches the input texts.
#[derive(Debug, Clone)]
pub struct EmbedOutcome {
    pub provider: ProviderName,
    pub model: String,
    pub embeddings: Vec<Vec<f32>>,
}

/// Uniform facade over the registered providers.
pub struct ProviderRouter {
    transport: Arc<dyn ProviderTransport>,
    api_keys: HashMap<ProviderName, String>,
    default_chat: ProviderName,
    default_embed: ProviderName,
    chat_retry: RetryPolicy,
    embed_retry: RetryPolicy,
}

impl ProviderRouter {
    pub fn new(
        transport: Arc<dyn ProviderTransport>,
        default_chat: ProviderName,
        default_embed: ProviderName,
    ) -> Self {
        Self {
            transport,
            api_keys: HashMap::new(),
            default_chat,
            default_embed,
            chat_retry: RetryPolicy::chat_default(),
            embed_retry: RetryPolicy::embed_default(),
        }
    }

    /// Load API keys from each registered provider's environment variable.
    pub fn with_env_keys(mut self) -> Self {
        for name in ProviderName::ALL {
            if let Ok(key) = std::env::var(builtin_spec(name).api_key_env) {
                if !key.is_empty() {
                    self.api_keys.insert(name, key);
                }
            }
        }
        self
    }

    pub fn with_api_key(mut self, provider: ProviderName, key: impl Into<String>) -> Self {
        self.api_keys.insert(provider, key.into());
        self
    }

    pub fn with_retry(mut self, chat: RetryPolicy, embed: RetryPolicy) -> Self {
        self.chat_retry = chat;
        self.embed_retry = embed;
        self
    }

    /// True when at least one provider with an embedding capability has a key.
    pub fn has_embedding_provider(&self) -> bool {
        self.api_keys
            .keys()
            .any(|name| builtin_spec(*name).embed_endpoint.is_some())
    }

    fn resolve(&self, requested: Option<ProviderName>, default: ProviderName) -> &'static ProviderSpec {
        builtin_spec(requested.unwrap_or(default))
    }

    fn api_key(&self, spec: &ProviderSpec) -> ProviderResult<&str> {
        self.api_keys
            .get(&spec.name)
            .map(String::as_str)
            .ok_or_else(|| ProviderError::MissingApiKey(spec.name.to_string()))
    }

    /// One upstream call wrapped in the retry loop. Retries on transport
    /// errors and non-2xx; exhaustion surfaces the last error truncated.
    async fn call_with_retry(
        &self,
        call: &HttpCall,
        policy: RetryPolicy,
        cx: &CancellationToken,
    ) -> ProviderResult<serde_json::Value> {
        let mut delay = policy.initial_delay;
        let mut last_error = String::new();

        for attempt in 1..=policy.attempts.max(1) {
            if cx.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            match self.transport.execute(call, cx).await {
                Ok(body) => return Ok(body),
                Err(err) if err.retryable() => {
                    last_error = err.to_string();
                    tracing::warn!(attempt, error = %last_error, "provider call failed, retrying");
                }
                Err(err) => return Err(err),
            }
            if attempt < policy.attempts {
                tokio::select! {
                    _ = cx.cancelled() => return Err(ProviderError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = delay.saturating_mul(policy.factor);
            }
        }

        Err(ProviderError::Exhausted(truncate_message(
            &last_error,
            ERROR_MESSAGE_LIMIT,
        )))
    }

    /// Chat completion against the selected provider.
    pub async fn chat(
        &self,
        messages: &[ConversationMessage],
        options: &ChatOptions,
        cx: &CancellationToken,
    ) -> ProviderResult<ChatOutcome> {
        let spec = self.resolve(options.provider, self.default_chat);
        let api_key = self.api_key(spec)?;
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| spec.default_chat_model.to_string());
        let tuning = ChatTuning {
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let call = HttpCall {
            url: (spec.chat_endpoint)(&model, api_key),
            headers: (spec.headers)(api_key),
            body: (spec.chat_payload)(&model, messages, &tuning),
        };

        let body = self.call_with_retry(&call, self.chat_retry, cx).await?;
        let parsed = (spec.parse_chat)(&body)?;

        Ok(ChatOutcome {
            provider: spec.name,
            model,
            message: ConversationMessage::assistant(parsed.content),
            usage: Some(Usage {
                input_tokens: parsed.input_tokens,
                output_tokens: parsed.output_tokens,
            }),
        })
    }

    /// Embeddings for a batch of texts.
    ///
    /// Pre-processing: each text is clipped to [`EMBED_TEXT_LIMIT`] chars,
    /// the batch is deduplicated (first occurrence wins) with output order
    /// restored through a reverse index, and upstream calls carry at most
    /// [`EMBED_BATCH_LIMIT`] texts each.
    pub async fn embed(
        &self,
        texts: &[String],
        options: &EmbedOptions,
        cx: &CancellationToken,
    ) -> ProviderResult<EmbedOutcome> {
        let spec = self.resolve(options.provider, self.default_embed);
        let embed_endpoint = spec.embed_endpoint.ok_or_else(|| {
            ProviderError::InvalidConfig(format!(
                "provider {} has no embedding capability",
                spec.name
            ))
        })?;
        let embed_payload = spec
            .embed_payload
            .ok_or_else(|| ProviderError::InvalidConfig("missing embed payload builder".into()))?;
        let parse_embed = spec
            .parse_embed
            .ok_or_else(|| ProviderError::InvalidConfig("missing embed parser".into()))?;
        let api_key = self.api_key(spec)?;
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| spec.default_embed_model.to_string());

        let mut unique: Vec<String> = Vec::new();
        let mut index_of: HashMap<String, usize> = HashMap::new();
        let mut reverse: Vec<usize> = Vec::with_capacity(texts.len());
        for text in texts {
            let clipped: String = text.chars().take(EMBED_TEXT_LIMIT).collect();
            let slot = *index_of.entry(clipped.clone()).or_insert_with(|| {
                unique.push(clipped);
                unique.len() - 1
            });
            reverse.push(slot);
        }

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(unique.len());
        for chunk in unique.chunks(EMBED_BATCH_LIMIT) {
            let call = HttpCall {
                url: embed_endpoint(&model, api_key),
                headers: (spec.headers)(api_key),
                body: embed_payload(&model, chunk),
            };
            let body = self.call_with_retry(&call, self.embed_retry, cx).await?;
            let mut parsed = parse_embed(&body)?;
            if parsed.len() != chunk.len() {
                return Err(ProviderError::InvalidOutput(format!(
                    "expected {} embeddings, got {}",
                    chunk.len(),
                    parsed.len()
                )));
            }
            vectors.append(&mut parsed);
        }

        let embeddings = reverse
            .into_iter()
            .map(|slot| vectors[slot].clone())
            .collect();

        Ok(EmbedOutcome {
            provider: spec.name,
            model,
            embeddings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted transport: pops one canned result per call.
    struct ScriptedTransport {
        calls: AtomicUsize,
        script: Mutex<Vec<ProviderResult<serde_json::Value>>>,
        captured: Mutex<Vec<HttpCall>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<ProviderResult<serde_json::Value>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script),
                captured: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderTransport for ScriptedTransport {
        async fn execute(
            &self,
            call: &HttpCall,
            cx: &CancellationToken,
        ) -> ProviderResult<serde_json::Value> {
            if cx.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.captured.lock().unwrap().push(call.clone());
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Err(ProviderError::Transport("script exhausted".into()));
            }
            script.remove(0)
        }
    }

    fn chat_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "content": content } }],
            "usage": { "prompt_tokens": 1, "completion_tokens": 1 }
        })
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            initial_delay: Duration::from_millis(1),
            factor: 2,
        }
    }

    fn router(transport: Arc<ScriptedTransport>) -> ProviderRouter {
        ProviderRouter::new(transport, ProviderName::OpenAi, ProviderName::OpenAi)
            .with_api_key(ProviderName::OpenAi, "test-key")
            .with_retry(fast_retry(), fast_retry())
    }

    #[tokio::test]
    async fn chat_happy_path() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(chat_body("hello!"))]));
        let router = router(transport.clone());
        let cx = CancellationToken::new();
        let outcome = router
            .chat(
                &[ConversationMessage::user("hi")],
                &ChatOptions::default(),
                &cx,
            )
            .await
            .unwrap();
        assert_eq!(outcome.message.content, "hello!");
        assert_eq!(outcome.provider, ProviderName::OpenAi);
        assert_eq!(outcome.model, "gpt-4o-mini");
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn retries_exactly_attempts_then_unavailable() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(ProviderError::Transport("reset 1".into())),
            Err(ProviderError::Status {
                status: 503,
                body: "overloaded".into(),
            }),
            Err(ProviderError::Transport("reset 3".into())),
        ]));
        let router = router(transport.clone());
        let cx = CancellationToken::new();
        let err = router
            .chat(
                &[ConversationMessage::user("hi")],
                &ChatOptions::default(),
                &cx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Exhausted(_)));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn recovers_on_second_attempt() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(ProviderError::Status {
                status: 500,
                body: "boom".into(),
            }),
            Ok(chat_body("recovered")),
        ]));
        let router = router(transport.clone());
        let cx = CancellationToken::new();
        let outcome = router
            .chat(
                &[ConversationMessage::user("hi")],
                &ChatOptions::default(),
                &cx,
            )
            .await
            .unwrap();
        assert_eq!(outcome.message.content, "recovered");
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn cancellation_short_circuits() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(chat_body("unused"))]));
        let router = router(transport.clone());
        let cx = CancellationToken::new();
        cx.cancel();
        let err = router
            .chat(
                &[ConversationMessage::user("hi")],
                &ChatOptions::default(),
                &cx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_key_is_unavailable() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let router =
            ProviderRouter::new(transport, ProviderName::OpenAi, ProviderName::OpenAi);
        let cx = CancellationToken::new();
        let err = router
            .chat(
                &[ConversationMessage::user("hi")],
                &ChatOptions::default(),
                &cx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey(_)));
    }

    fn embed_body(count: usize) -> serde_json::Value {
        let data: Vec<serde_json::Value> = (0..count)
            .map(|i| serde_json::json!({ "embedding": [i as f64, 1.0] }))
            .collect();
        serde_json::json!({ "data": data })
    }

    #[tokio::test]
    async fn embed_dedupes_and_restores_order() {
        // Three inputs, two unique: upstream sees 2 texts, caller gets 3
        // vectors with duplicates sharing a value.
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(embed_body(2))]));
        let router = router(transport.clone());
        let cx = CancellationToken::new();
        let texts = vec!["alpha".to_string(), "beta".to_string(), "alpha".to_string()];
        let outcome = router
            .embed(&texts, &EmbedOptions::default(), &cx)
            .await
            .unwrap();
        assert_eq!(outcome.embeddings.len(), 3);
        assert_eq!(outcome.embeddings[0], outcome.embeddings[2]);
        assert_ne!(outcome.embeddings[0], outcome.embeddings[1]);
        assert_eq!(transport.call_count(), 1);

        let captured = transport.captured.lock().unwrap();
        let sent = captured[0].body["input"].as_array().unwrap().len();
        assert_eq!(sent, 2);
    }

    #[tokio::test]
    async fn embed_truncates_and_batches() {
        // 33 unique texts require two upstream calls (32 + 1).
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(embed_body(32)),
            Ok(embed_body(1)),
        ]));
        let router = router(transport.clone());
        let cx = CancellationToken::new();
        let long = "x".repeat(1000);
        let mut texts: Vec<String> = (0..32).map(|i| format!("text-{i}")).collect();
        texts.push(long);
        let outcome = router
            .embed(&texts, &EmbedOptions::default(), &cx)
            .await
            .unwrap();
        assert_eq!(outcome.embeddings.len(), 33);
        assert_eq!(transport.call_count(), 2);

        let captured = transport.captured.lock().unwrap();
        let last_batch = captured[1].body["input"].as_array().unwrap();
        assert_eq!(last_batch[0].as_str().unwrap().chars().count(), 400);
    }

    #[tokio::test]
    async fn embed_count_mismatch_is_invalid_output() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(embed_body(1))]));
        let router = router(transport);
        let cx = CancellationToken::new();
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = router
            .embed(&texts, &EmbedOptions::default(), &cx)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidOutput(_)));
    }
}
