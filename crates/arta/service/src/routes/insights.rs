//! Insight endpoints: fetch, compute, score, simulate.

use arta_governor::{RequestDeadline, RouteClass};
use arta_insight::{score_health, suggest_actions};
use arta_storage::InsightStore;
use arta_tools::ToolContext;
use arta_types::{
    ActionCategory, ErrorCode, HealthScore, KpiKey, Month, MonthlyInsight, SuggestedAction,
    ValidationIssue,
};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::auth::{remote_addr, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn category_multiplier(category: ActionCategory) -> f64 {
    match category {
        ActionCategory::Income => 0.25,
        ActionCategory::Expense => 0.30,
        ActionCategory::Debt => 0.22,
        ActionCategory::Investment => 0.18,
        ActionCategory::Savings => 0.20,
    }
}

/// Numeric impact and score delta derived at the API layer.
fn enriched_action(
    action: &SuggestedAction,
    insight: &MonthlyInsight,
    health: &HealthScore,
) -> serde_json::Value {
    let k = category_multiplier(action.category);
    let cash_flow = insight.kpi_value(KpiKey::CashFlow);
    let income = insight.kpi_value(KpiKey::Income);
    let impact = cash_flow.abs().max(income * 0.05).max(100.0) * k;
    let score_delta = (0.15f64).min((1.0 - health.total) * k);

    serde_json::json!({
        "id": action.id,
        "title": action.title,
        "description": action.description,
        "category": action.category,
        "rationale": action.rationale,
        "impact_myr": impact,
        "score_delta": score_delta,
    })
}

/// Context plus its deadline guard; drop the guard only after the call.
fn tool_context(
    state: &AppState,
    user: &arta_types::AuthenticatedUser,
) -> (ToolContext, RequestDeadline) {
    let deadline = RequestDeadline::start(state.config.request_timeout);
    let ctx = ToolContext {
        tenant_id: user.tenant_id.clone(),
        customer_id: user.customer_id.clone(),
        storage: state.storage.clone(),
        gateway: Some(state.gateway.clone()),
        cx: deadline.token(),
    };
    (ctx, deadline)
}

/// Unwrap a tool outcome into its data or the matching API error.
fn tool_data(outcome: arta_tools::ToolOutcome) -> ApiResult<serde_json::Value> {
    if outcome.is_ok() {
        outcome
            .data
            .ok_or_else(|| ApiError::internal("tool returned no data"))
    } else {
        let envelope = outcome.error.unwrap_or_else(|| {
            arta_types::ErrorEnvelope::new(ErrorCode::InternalError, "tool failed")
        });
        Err(ApiError(envelope))
    }
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    month: String,
}

// ── GET /v1/insights?month=YYYY-MM ───────────────────────────────────

pub async fn get_insight(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<MonthQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let month = Month::parse(&query.month)
        .map_err(|e| ApiError::validation(vec![ValidationIssue::new("month", e)]))?;
    let insight = state
        .storage
        .get_insight(&user.customer_id, &month)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no insight for {month}")))?;

    Ok(Json(serde_json::json!({
        "kpis": insight.kpis,
        "story": insight.story,
    })))
}

// ── POST /v1/insights ────────────────────────────────────────────────

pub async fn compute_insight(
    State(state): State<AppState>,
    headers: HeaderMap,
    AuthUser(user): AuthUser,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    state.limiter.check(
        RouteClass::InsightsCompute,
        &user.user_id,
        &remote_addr(&headers),
    )?;

    let (ctx, _deadline) = tool_context(&state, &user);
    let outcome = state.tools.invoke(&ctx, "insights.compute", body).await;
    let data = tool_data(outcome)?;

    let insight: MonthlyInsight = serde_json::from_value(data["insight"].clone())
        .map_err(|e| ApiError::internal(format!("insight shape: {e}")))?;
    let health = score_health(&insight);
    let actions: Vec<serde_json::Value> = suggest_actions(&insight, &health)
        .iter()
        .map(|action| enriched_action(action, &insight, &health))
        .collect();

    Ok(Json(serde_json::json!({
        "insight": { "kpis": insight.kpis, "story": insight.story },
        "score": health,
        "actions": actions,
    })))
}

// ── GET /v1/score?month=YYYY-MM ──────────────────────────────────────

pub async fn get_score(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<MonthQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let month = Month::parse(&query.month)
        .map_err(|e| ApiError::validation(vec![ValidationIssue::new("month", e)]))?;
    let insight = state
        .storage
        .get_insight(&user.customer_id, &month)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no insight for {month}")))?;
    let health = score_health(&insight);

    Ok(Json(serde_json::json!({
        "score": (health.total * 100.0).round(),
        "components": health.components,
        "notes": health.notes,
    })))
}

// ── POST /v1/simulate ────────────────────────────────────────────────

pub async fn simulate(
    State(state): State<AppState>,
    headers: HeaderMap,
    AuthUser(user): AuthUser,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .limiter
        .check(RouteClass::Simulate, &user.user_id, &remote_addr(&headers))?;

    let (ctx, _deadline) = tool_context(&state, &user);
    let outcome = state.tools.invoke(&ctx, "simulations.run", body).await;
    let data = tool_data(outcome)?;

    Ok(Json(serde_json::json!({
        "kpis": data["insight"]["kpis"],
        "score": data["score"],
        "adjustments": data["adjustments"],
    })))
}
