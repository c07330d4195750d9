//! Opt-in community views: `GET /v1/benchmarks`, `GET /v1/leaderboard`.

use axum::extract::State;
use axum::Json;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn benchmarks(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let cohorts =
        arta_aggregate::benchmarks(state.storage.as_ref(), &user.tenant_id, &user.customer_id)
            .await?;

    let cohorts: Vec<serde_json::Value> = cohorts
        .into_iter()
        .map(|benchmark| {
            serde_json::json!({
                "cohort": {
                    "region": benchmark.cohort.region,
                    "income_band": benchmark.cohort.income_band,
                },
                "metrics": {
                    "income_avg": benchmark.income_avg,
                    "savings_rate_avg": benchmark.savings_rate_avg,
                    "sample_size": benchmark.sample_size,
                },
            })
        })
        .collect();

    Ok(Json(serde_json::json!({ "cohorts": cohorts })))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let board =
        arta_aggregate::leaderboard(state.storage.as_ref(), &user.tenant_id, &user.customer_id)
            .await?;
    Ok(Json(serde_json::to_value(board).unwrap_or_default()))
}
