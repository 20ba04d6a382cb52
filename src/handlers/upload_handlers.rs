//! HTTP handlers for upload validation, one-shot verification and the
//! interactive attempt flow.

use crate::{
    errors::AppError,
    handlers::auth::CallerId,
    models::{
        ownership::OwnershipCodeStatus,
        upload::{AudioFileInfo, AudioPayload, UploadMetadata},
    },
    services::{
        upload_validator::ValidationReport,
        workflow::{Acknowledgements, OpenedAttempt, VerificationOutcome, VerificationRequest},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use uuid::Uuid;

/// Name of the file part in multipart attempt requests.
pub const AUDIO_FILE_FIELD: &str = "audioFile";

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub metadata: UploadMetadata,
    pub file: AudioFileInfo,
}

/// JSON body for `/uploads/verify` and JSON `/uploads/attempts`.
///
/// Audio comes either as a URL the fingerprint service can fetch or as
/// base64 bytes in `file_data`.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub metadata: UploadMetadata,
    pub file: AudioFileInfo,
    pub audio_url: Option<String>,
    pub file_data: Option<String>,
    #[serde(default)]
    pub acknowledgements: Acknowledgements,
}

impl UploadRequest {
    fn payload(&self) -> Result<AudioPayload, AppError> {
        if let Some(data) = self.file_data.as_deref() {
            let bytes = general_purpose::STANDARD
                .decode(data.trim())
                .map_err(|e| AppError::bad_request(format!("file_data is not base64: {}", e)))?;
            return Ok(AudioPayload::Inline(Bytes::from(bytes)));
        }
        match self.audio_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(AudioPayload::Url(url.to_string())),
            _ => Err(AppError::bad_request(
                "either `audio_url` or `file_data` is required",
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CodeInput {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct CodeStatusResponse {
    pub attempt_id: Uuid,
    pub status: OwnershipCodeStatus,
}

/// `POST /uploads/validate`. Reports every violation; no side effects.
pub async fn validate_upload(
    State(state): State<AppState>,
    CallerId(_): CallerId,
    Json(req): Json<ValidateRequest>,
) -> Json<ValidationReport> {
    Json(state.workflow.validate(&req.metadata, &req.file))
}

/// `POST /uploads/verify`. Runs the whole pipeline in one request.
pub async fn verify_upload(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(req): Json<UploadRequest>,
) -> Result<Json<VerificationOutcome>, AppError> {
    let payload = req.payload()?;
    let outcome = state
        .workflow
        .run(VerificationRequest {
            user_id,
            metadata: req.metadata,
            file: req.file,
            payload,
            acknowledgements: req.acknowledgements,
        })
        .await?;
    Ok(Json(outcome))
}

/// `POST /uploads/attempts`. Accepts multipart (`audioFile` plus metadata
/// fields) or the JSON body used by `/uploads/verify`.
pub async fn open_attempt(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    req: Request,
) -> Result<(StatusCode, Json<OpenedAttempt>), AppError> {
    let is_multipart = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let (metadata, file, payload) = if is_multipart {
        let multipart = Multipart::from_request(req, &state)
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;
        read_multipart(multipart).await?
    } else {
        let Json(body) = Json::<UploadRequest>::from_request(req, &state)
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;
        let payload = body.payload()?;
        (body.metadata, body.file, payload)
    };

    let opened = state
        .workflow
        .open_attempt(user_id, metadata, file, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(opened)))
}

async fn read_multipart(
    mut multipart: Multipart,
) -> Result<(UploadMetadata, AudioFileInfo, AudioPayload), AppError> {
    let mut metadata = UploadMetadata::default();
    let mut duration_secs = None;
    let mut audio: Option<(Option<String>, String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == AUDIO_FILE_FIELD {
            let file_name = field.file_name().map(str::to_string);
            let mime_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::bad_request(e.body_text()))?;
            audio = Some((file_name, mime_type, bytes));
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;
        match name.as_str() {
            "title" => metadata.title = value,
            "declared_artist" | "artist" => metadata.declared_artist = value,
            "genre" => metadata.genre = non_blank(value),
            "album" => metadata.album = non_blank(value),
            "record_label" | "label" => metadata.record_label = non_blank(value),
            "ownership_code" | "isrc" => metadata.ownership_code = non_blank(value),
            "origin" => metadata.origin = parse_choice(&name, &value)?,
            "media_kind" => metadata.media_kind = parse_choice(&name, &value)?,
            "tier" => metadata.tier = parse_choice(&name, &value)?,
            "duration_secs" => duration_secs = Some(parse_duration(&value)?),
            _ => {}
        }
    }

    let (file_name, mime_type, bytes) = audio.ok_or_else(|| {
        AppError::bad_request(format!("multipart field `{}` is required", AUDIO_FILE_FIELD))
    })?;
    let file = AudioFileInfo {
        file_name,
        mime_type,
        size_bytes: bytes.len() as u64,
        duration_secs,
    };
    Ok((metadata, file, AudioPayload::Inline(bytes)))
}

fn non_blank(value: String) -> Option<String> {
    Some(value).filter(|v| !v.trim().is_empty())
}

/// `f64` parsing accepts "NaN" and "inf"; neither is a duration.
fn parse_duration(value: &str) -> Result<f64, AppError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite())
        .ok_or_else(|| {
            AppError::bad_request(format!("`duration_secs` is not a number: {}", value))
        })
}

fn parse_choice<T: DeserializeOwned>(field: &str, value: &str) -> Result<T, AppError> {
    serde_json::from_value(Value::String(value.trim().to_string()))
        .map_err(|_| AppError::bad_request(format!("invalid `{}`: {}", field, value)))
}

/// `DELETE /uploads/attempts/{id}`
pub async fn cancel_attempt(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(attempt_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.workflow.cancel_attempt(user_id, attempt_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /uploads/attempts/{id}/ownership-code`. Returns immediately; the
/// check runs once input settles.
pub async fn submit_code(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(attempt_id): Path<Uuid>,
    Json(input): Json<CodeInput>,
) -> Result<(StatusCode, Json<CodeStatusResponse>), AppError> {
    let status = state.workflow.submit_code(user_id, attempt_id, &input.code)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CodeStatusResponse { attempt_id, status }),
    ))
}

/// `GET /uploads/attempts/{id}/ownership-code`
pub async fn code_status(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<CodeStatusResponse>, AppError> {
    let status = state.workflow.code_status(user_id, attempt_id)?;
    Ok(Json(CodeStatusResponse { attempt_id, status }))
}

/// `POST /uploads/attempts/{id}/decision`
pub async fn decide_attempt(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(attempt_id): Path<Uuid>,
    Json(acks): Json<Acknowledgements>,
) -> Result<Json<VerificationOutcome>, AppError> {
    let outcome = state
        .workflow
        .decide_attempt(user_id, attempt_id, acks)
        .await?;
    Ok(Json(outcome))
}
