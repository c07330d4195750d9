//! `GET|POST /v1/preferences`: user-tunable settings, including the
//! benchmarking opt-in.

use arta_governor::RouteClass;
use arta_storage::TenantStore;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::auth::{remote_addr, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PreferencesPatch {
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub notifications: Option<serde_json::Value>,
    #[serde(default)]
    pub goals: Option<serde_json::Value>,
    #[serde(default)]
    pub allow_benchmarking: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PreferencesRequest {
    pub preferences: PreferencesPatch,
}

pub async fn get_preferences(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let customer = state
        .storage
        .get_customer(&user.tenant_id, &user.customer_id)
        .await?
        .ok_or_else(|| ApiError::not_found("customer record"))?;

    Ok(Json(serde_json::json!({
        "preferences": customer.metadata.preferences,
    })))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
    AuthUser(user): AuthUser,
    Json(request): Json<PreferencesRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state.limiter.check(
        RouteClass::Preferences,
        &user.user_id,
        &remote_addr(&headers),
    )?;

    let customer = state
        .storage
        .get_customer(&user.tenant_id, &user.customer_id)
        .await?
        .ok_or_else(|| ApiError::not_found("customer record"))?;

    let mut metadata = customer.metadata;
    let patch = request.preferences;
    if let Some(categories) = patch.categories {
        metadata.preferences.categories = Some(categories);
    }
    if let Some(notifications) = patch.notifications {
        metadata.preferences.notifications = Some(notifications);
    }
    if let Some(goals) = patch.goals {
        metadata.preferences.goals = Some(goals);
    }
    if let Some(allow) = patch.allow_benchmarking {
        metadata.preferences.allow_benchmarking = allow;
    }

    let updated = state
        .storage
        .update_customer_metadata(&user.tenant_id, &user.customer_id, metadata)
        .await?;

    Ok(Json(serde_json::json!({
        "preferences": updated.metadata.preferences,
    })))
}
