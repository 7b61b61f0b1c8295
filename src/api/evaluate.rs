use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::auth::BearerToken;
use crate::error::AppError;
use crate::guard::limiter::Decision;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub user_id: i64,
    /// Set for phone, code and password submissions; they run against the
    /// halved thresholds and the daily login quota.
    #[serde(default)]
    pub login_attempt: bool,
}

#[derive(Debug, Serialize)]
pub struct PacingResponse {
    pub delay_ms: u64,
}

async fn authorize(state: &AppState, token: &str) -> Result<(), AppError> {
    if state.tokens.read().await.authorize(token) {
        Ok(())
    } else {
        Err(AppError::Unauthorized("Invalid or expired service token"))
    }
}

async fn do_evaluate(
    state: &AppState,
    token: &str,
    params: EvaluateRequest,
) -> Result<Json<Decision>, AppError> {
    authorize(state, token).await?;

    // One clock reading per evaluation; the guard never re-reads time.
    let now = Utc::now();
    let decision = state
        .guard
        .lock()
        .await
        .evaluate(params.user_id, params.login_attempt, now);

    if !decision.allowed {
        tracing::warn!(
            user_id = params.user_id,
            login_attempt = params.login_attempt,
            "action denied: {}",
            decision.message
        );
    }

    // A denial is an answer, not an error: still HTTP 200.
    Ok(Json(decision))
}

pub async fn evaluate_get(
    State(state): State<Arc<AppState>>,
    bearer: BearerToken,
    Query(params): Query<EvaluateRequest>,
) -> Result<Json<Decision>, AppError> {
    do_evaluate(&state, &bearer.0, params).await
}

pub async fn evaluate_post(
    State(state): State<Arc<AppState>>,
    bearer: BearerToken,
    Json(params): Json<EvaluateRequest>,
) -> Result<Json<Decision>, AppError> {
    do_evaluate(&state, &bearer.0, params).await
}

/// How long the frontend should sleep before its next automation step so
/// the typing cadence stays human-paced.
pub async fn pacing_delay(
    State(state): State<Arc<AppState>>,
    bearer: BearerToken,
) -> Result<Json<PacingResponse>, AppError> {
    authorize(&state, &bearer.0).await?;
    let delay = state.pacing.sample();
    Ok(Json(PacingResponse {
        delay_ms: delay.as_millis() as u64,
    }))
}
