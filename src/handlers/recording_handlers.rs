//! Registry lookup for the upload form's code field.

use crate::{
    errors::AppError,
    handlers::auth::CallerId,
    services::{
        ownership_verifier::{is_valid_format, normalize_code},
        registry_client::RegistryRecording,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
};

/// `GET /recordings/{code}`. Separators in the code are ignored.
pub async fn lookup_recording(
    State(state): State<AppState>,
    CallerId(_): CallerId,
    Path(code): Path<String>,
) -> Result<Json<Vec<RegistryRecording>>, AppError> {
    let normalized = normalize_code(&code);
    if !is_valid_format(&normalized) {
        return Err(AppError::bad_request(format!(
            "`{}` is not a valid recording code",
            code
        )));
    }
    let recordings = state.registry.lookup_code(&normalized).await?;
    Ok(Json(recordings))
}
