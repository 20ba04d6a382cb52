//! Route table.
//!
//! ## Structure
//! - **Probes**: `GET /healthz`, `GET /readyz`
//! - **Uploads**
//!   - `POST   /uploads/validate`: metadata/file checks only
//!   - `POST   /uploads/verify`: one-shot verification
//!   - `POST   /uploads/attempts`: open an interactive attempt
//!   - `DELETE /uploads/attempts/{id}`: cancel it
//!   - `PUT|GET /uploads/attempts/{id}/ownership-code`: debounced code check
//!   - `POST   /uploads/attempts/{id}/decision`: settle and decide
//! - **History**: `GET /users/{id}/history`, `GET|POST /users/{id}/strikes`
//! - **Moderation**: `POST /reports`, `POST /takedowns`, `/review-queue/...`
//! - **Lookups**: `GET /recordings/{code}`
//! - **Staging**: `GET /staging/{*key}`: nested keys like `fingerprint-temp/<uuid>`

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        history_handlers::{get_history, list_strikes, record_strike},
        recording_handlers::lookup_recording,
        review_handlers::{
            ack_item, claim_items, list_items, record_takedown, release_item, report_content,
        },
        staging_handlers::get_staged,
        upload_handlers::{
            cancel_attempt, code_status, decide_attempt, open_attempt, submit_code,
            validate_upload, verify_upload,
        },
    },
    models::upload::UploadTier,
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};

/// Largest accepted upload body: the top tier's file ceiling, base64-inflated.
pub fn max_upload_body_bytes() -> usize {
    let max_file = UploadTier::Enterprise.max_file_bytes() as usize;
    max_file / 3 * 4 + 1024 * 1024
}

/// Build the router. State is attached by the caller.
pub fn routes() -> Router<AppState> {
    let upload_limit = DefaultBodyLimit::max(max_upload_body_bytes());

    Router::new()
        // health endpoints
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // uploads
        .route("/uploads/validate", post(validate_upload))
        .route("/uploads/verify", post(verify_upload).layer(upload_limit))
        .route("/uploads/attempts", post(open_attempt).layer(upload_limit))
        .route("/uploads/attempts/{id}", delete(cancel_attempt))
        .route(
            "/uploads/attempts/{id}/ownership-code",
            put(submit_code).get(code_status),
        )
        .route("/uploads/attempts/{id}/decision", post(decide_attempt))
        // history
        .route("/users/{id}/history", get(get_history))
        .route("/users/{id}/strikes", get(list_strikes).post(record_strike))
        // moderation
        .route("/reports", post(report_content))
        .route("/takedowns", post(record_takedown))
        .route("/review-queue", get(list_items))
        .route("/review-queue/claim", post(claim_items))
        .route("/review-queue/{id}/ack", post(ack_item))
        .route("/review-queue/{id}/release", post(release_item))
        // lookups and staged payloads
        .route("/recordings/{code}", get(lookup_recording))
        .route("/staging/{*key}", get(get_staged))
}
