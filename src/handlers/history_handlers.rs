//! Upload history and strike bookkeeping endpoints.

use crate::{
    errors::AppError,
    handlers::auth::CallerId,
    models::history::{StrikeOutcome, StrikeRecord, UserUploadHistory},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct NewStrike {
    pub reason: String,
    pub content_id: Option<Uuid>,
}

/// `GET /users/{id}/history`. Unknown users read as a fresh history.
pub async fn get_history(
    State(state): State<AppState>,
    CallerId(_): CallerId,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserUploadHistory>, AppError> {
    let history = state.workflow.history.read_user_history(user_id).await?;
    Ok(Json(history))
}

/// `GET /users/{id}/strikes`
pub async fn list_strikes(
    State(state): State<AppState>,
    CallerId(_): CallerId,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<StrikeRecord>>, AppError> {
    let strikes = state.workflow.history.list_strikes(user_id).await?;
    Ok(Json(strikes))
}

/// `POST /users/{id}/strikes`
pub async fn record_strike(
    State(state): State<AppState>,
    CallerId(moderator): CallerId,
    Path(user_id): Path<Uuid>,
    Json(strike): Json<NewStrike>,
) -> Result<(StatusCode, Json<StrikeOutcome>), AppError> {
    let outcome = state
        .workflow
        .history
        .record_strike(user_id, &strike.reason, strike.content_id)
        .await?;
    info!(%user_id, %moderator, strikes = outcome.history.prior_strikes, "strike recorded");
    Ok((StatusCode::CREATED, Json(outcome)))
}
