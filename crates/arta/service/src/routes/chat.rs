//! `POST /v1/chat`: the conversational endpoint, JSON or SSE.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use arta_governor::{RequestDeadline, RouteClass};
use arta_orchestrator::{ChatRequestOptions, ChatTurnOutcome};
use arta_tools::ToolContext;
use arta_types::{
    ConversationMessage, ErrorCode, ErrorEnvelope, Kpi, KpiKey, SuggestedAction, ValidationIssue,
};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream;
use serde::{Deserialize, Serialize};

use crate::auth::{remote_addr, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Rough size of one SSE text chunk.
const CHUNK_TARGET: usize = 48;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub conversation: Vec<ConversationMessage>,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kpis: Option<BTreeMap<KpiKey, Kpi>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<SuggestedAction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followup: Option<String>,
}

fn wants_sse(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(|accept| accept.contains("text/event-stream"))
        .unwrap_or(false)
}

fn parse_options(raw: Option<serde_json::Value>) -> ApiResult<ChatRequestOptions> {
    match raw {
        Some(value) => serde_json::from_value(value).map_err(|e| {
            ApiError::validation(vec![ValidationIssue::new("options", e.to_string())])
        }),
        None => Ok(ChatRequestOptions::default()),
    }
}

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    AuthUser(user): AuthUser,
    Json(request): Json<ChatRequest>,
) -> Response {
    let streaming = wants_sse(&headers);
    match run_turn(&state, &headers, &user, request).await {
        Ok(outcome) => {
            if streaming {
                sse_response(outcome)
            } else {
                Json(ChatResponse {
                    reply: outcome.reply,
                    kpis: outcome.kpis,
                    actions: outcome.actions,
                    followup: outcome.followup,
                })
                .into_response()
            }
        }
        Err(err) => {
            if streaming {
                sse_error(err.0)
            } else {
                err.into_response()
            }
        }
    }
}

async fn run_turn(
    state: &AppState,
    headers: &HeaderMap,
    user: &arta_types::AuthenticatedUser,
    request: ChatRequest,
) -> ApiResult<ChatTurnOutcome> {
    if request.conversation.is_empty() {
        return Err(ApiError::validation(vec![ValidationIssue::new(
            "conversation",
            "must contain at least one message",
        )]));
    }
    let options = parse_options(request.options)?;

    state
        .limiter
        .check(RouteClass::Chat, &user.user_id, &remote_addr(headers))?;

    let deadline = RequestDeadline::start(state.config.request_timeout);
    let ctx = ToolContext {
        tenant_id: user.tenant_id.clone(),
        customer_id: user.customer_id.clone(),
        storage: state.storage.clone(),
        gateway: Some(Arc::clone(&state.gateway)),
        cx: deadline.token(),
    };

    let result = state
        .orchestrator
        .handle_turn(&ctx, &request.conversation, &options)
        .await;

    match result {
        Ok(outcome) => Ok(outcome),
        // Once the deadline fired, CANCELLED wins over any other failure.
        Err(_) if deadline.is_expired() => {
            Err(ApiError::new(ErrorCode::Cancelled, "request deadline exceeded"))
        }
        Err(err) => Err(err.into()),
    }
}

fn chunk_reply(reply: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for word in reply.split_inclusive(' ') {
        current.push_str(word);
        if current.len() >= CHUNK_TARGET {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    if chunks.is_empty() {
        chunks.push(String::new());
    }
    chunks
}

fn json_event(name: &'static str, data: &impl Serialize) -> Event {
    match Event::default().event(name).json_data(data) {
        Ok(event) => event,
        Err(_) => Event::default().event(name).data("{}"),
    }
}

fn sse_response(outcome: ChatTurnOutcome) -> Response {
    let mut events: Vec<Event> = Vec::new();
    events.push(json_event("intent", &outcome.classification));
    events.push(json_event("plan", &outcome.plan));
    for chunk in chunk_reply(&outcome.reply) {
        events.push(Event::default().event("chunk").data(chunk));
    }
    events.push(json_event(
        "result",
        &serde_json::json!({
            "reply": outcome.reply,
            "kpis": outcome.kpis,
            "actions": outcome.actions,
            "followup": outcome.followup,
        }),
    ));
    events.push(json_event(
        "metadata",
        &serde_json::json!({
            "toolResults": outcome.tool_results,
            "resultData": outcome.result_data,
        }),
    ));
    events.push(Event::default().event("done").data("done"));

    let stream = stream::iter(events.into_iter().map(Ok::<Event, Infallible>));
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn sse_error(envelope: ErrorEnvelope) -> Response {
    let events = vec![
        json_event("error", &envelope),
        Event::default().event("done").data("done"),
    ];
    let stream = stream::iter(events.into_iter().map(Ok::<Event, Infallible>));
    Sse::new(stream).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_covers_whole_reply() {
        let reply = "Got it! I've recorded IDR 125000.00 for the corner warung on \
                     2024-05-11. Anything else you need?";
        let chunks = chunk_reply(reply);
        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), reply);
    }

    #[test]
    fn empty_reply_yields_single_empty_chunk() {
        assert_eq!(chunk_reply(""), vec![String::new()]);
    }

    #[test]
    fn accept_header_detection() {
        let mut headers = HeaderMap::new();
        assert!(!wants_sse(&headers));
        headers.insert(
            axum::http::header::ACCEPT,
            "text/event-stream".parse().unwrap(),
        );
        assert!(wants_sse(&headers));
    }
}
