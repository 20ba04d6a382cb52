//! User reports, takedown notices and the moderation queue.

use crate::{
    errors::AppError,
    handlers::auth::CallerId,
    models::review::{ReviewItem, ReviewStatus},
    services::workflow::{ContentReport, TakedownNotice, TakedownOutcome},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: u32 = 100;
const MAX_LIST_LIMIT: u32 = 1000;
const DEFAULT_CLAIM_LIMIT: u32 = 10;
const DEFAULT_LEASE_SECS: u64 = 15 * 60;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<ReviewStatus>,
    pub limit: Option<u32>,
}

/// Claim parameters. The worker defaults to the caller's id.
#[derive(Debug, Default, Deserialize)]
pub struct ClaimRequest {
    pub worker: Option<String>,
    pub limit: Option<u32>,
    pub lease_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AckRequest {
    pub worker: Option<String>,
    pub resolution: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReleaseRequest {
    pub worker: Option<String>,
}

fn worker_name(worker: Option<String>, caller: Uuid) -> String {
    worker
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .unwrap_or_else(|| caller.to_string())
}

/// `POST /reports`
pub async fn report_content(
    State(state): State<AppState>,
    CallerId(reporter): CallerId,
    Json(report): Json<ContentReport>,
) -> Result<(StatusCode, Json<ReviewItem>), AppError> {
    let item = state.workflow.report_content(reporter, report).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// `POST /takedowns`
pub async fn record_takedown(
    State(state): State<AppState>,
    CallerId(_): CallerId,
    Json(notice): Json<TakedownNotice>,
) -> Result<(StatusCode, Json<TakedownOutcome>), AppError> {
    if notice.claimant.trim().is_empty() {
        return Err(AppError::bad_request("claimant is required"));
    }
    let outcome = state.workflow.record_takedown(notice).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// `GET /review-queue?status=&limit=`
pub async fn list_items(
    State(state): State<AppState>,
    CallerId(_): CallerId,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ReviewItem>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    let items = state.workflow.reviews.list(query.status, limit).await?;
    Ok(Json(items))
}

/// `POST /review-queue/claim`
pub async fn claim_items(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<Vec<ReviewItem>>, AppError> {
    let worker = worker_name(req.worker, caller);
    let lease = Duration::from_secs(req.lease_secs.unwrap_or(DEFAULT_LEASE_SECS).max(1));
    let items = state
        .workflow
        .reviews
        .claim(&worker, req.limit.unwrap_or(DEFAULT_CLAIM_LIMIT), lease)
        .await?;
    Ok(Json(items))
}

/// `POST /review-queue/{id}/ack`
pub async fn ack_item(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(id): Path<Uuid>,
    Json(req): Json<AckRequest>,
) -> Result<Json<ReviewItem>, AppError> {
    let worker = worker_name(req.worker, caller);
    let item = state
        .workflow
        .reviews
        .ack(id, &worker, req.resolution)
        .await?;
    Ok(Json(item))
}

/// `POST /review-queue/{id}/release`
pub async fn release_item(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(id): Path<Uuid>,
    Json(req): Json<ReleaseRequest>,
) -> Result<Json<ReviewItem>, AppError> {
    let worker = worker_name(req.worker, caller);
    let item = state.workflow.reviews.release(id, &worker).await?;
    Ok(Json(item))
}
