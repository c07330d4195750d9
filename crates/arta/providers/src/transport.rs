//! Transport seam between the router and the network.
//!
//! The router only speaks [`HttpCall`]; tests plug in scripted transports
//! while production uses one shared `reqwest` client across providers.

use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A fully built upstream request. The URL and headers may embed the API
/// key, so this type must never be logged.
#[derive(Debug, Clone)]
pub struct HttpCall {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

/// Provider transport abstraction.
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    /// Execute one POST; a non-2xx response is an error carrying the status
    /// and body. Cancellation aborts the in-flight request.
    async fn execute(
        &self,
        call: &HttpCall,
        cx: &CancellationToken,
    ) -> ProviderResult<serde_json::Value>;
}

/// Shared-client HTTP transport.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ProviderTransport for ReqwestTransport {
    async fn execute(
        &self,
        call: &HttpCall,
        cx: &CancellationToken,
    ) -> ProviderResult<serde_json::Value> {
        let mut request = self.client.post(&call.url).json(&call.body);
        for (name, value) in &call.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = tokio::select! {
            _ = cx.cancelled() => return Err(ProviderError::Cancelled),
            result = request.send() => {
                result.map_err(|e| ProviderError::Transport(sanitized(&e)))?
            }
        };

        let status = response.status();
        let body = tokio::select! {
            _ = cx.cancelled() => return Err(ProviderError::Cancelled),
            text = response.text() => text.map_err(|e| ProviderError::Transport(sanitized(&e)))?,
        };

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidOutput(format!("non-JSON response: {e}")))
    }
}

/// reqwest errors can embed the full request URL; strip it so keyed query
/// strings never reach logs or envelopes.
fn sanitized(error: &reqwest::Error) -> String {
    let mut error = format!("{error}");
    if let Some(index) = error.find("http") {
        error.truncate(index);
        error.push_str("<redacted-url>");
    }
    error
}
