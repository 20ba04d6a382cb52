//! Upload attempt value objects.
//!
//! An [`UploadAttempt`] lives only for the duration of one publish action: it is
//! created when the uploader starts, carried through the verification gates
//! and discarded once the attempt is decided or cancelled.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MIB: u64 = 1024 * 1024;

/// Whether the uploader claims the recording as their own work or as a cover.
/// Covers need a verified code for the underlying composition's recording.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentOrigin {
    #[default]
    Original,
    Cover,
}

/// Music is matched against the catalog; spoken word (podcasts) is not.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Music,
    SpokenWord,
}

/// Subscription tier of the uploader. Only affects size limits here.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UploadTier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl UploadTier {
    pub fn max_file_bytes(self) -> u64 {
        match self {
            UploadTier::Free => 50 * MIB,
            UploadTier::Pro => 200 * MIB,
            UploadTier::Enterprise => 500 * MIB,
        }
    }
}

/// Metadata typed in by the uploader alongside the audio file.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UploadMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub declared_artist: String,
    pub genre: Option<String>,
    pub album: Option<String>,
    pub record_label: Option<String>,
    pub ownership_code: Option<String>,
    #[serde(default)]
    pub origin: ContentOrigin,
    #[serde(default)]
    pub media_kind: MediaKind,
    #[serde(default)]
    pub tier: UploadTier,
}

/// Facts about the audio file that can be checked without decoding it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AudioFileInfo {
    pub file_name: Option<String>,
    pub mime_type: String,
    pub size_bytes: u64,
    pub duration_secs: Option<f64>,
}

/// Audio handed to the fingerprint service: raw bytes or a URL it can fetch.
#[derive(Clone, Debug)]
pub enum AudioPayload {
    Inline(Bytes),
    Url(String),
}

impl AudioPayload {
    /// Byte length when known (inline payloads only).
    pub fn len(&self) -> Option<u64> {
        match self {
            AudioPayload::Inline(bytes) => Some(bytes.len() as u64),
            AudioPayload::Url(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            AudioPayload::Inline(bytes) => bytes.is_empty(),
            AudioPayload::Url(url) => url.trim().is_empty(),
        }
    }
}

/// One candidate submission.
#[derive(Serialize, Clone, Debug)]
pub struct UploadAttempt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub declared_artist: String,
    pub genre: Option<String>,
    pub album: Option<String>,
    pub record_label: Option<String>,
    pub ownership_code: Option<String>,
    pub origin: ContentOrigin,
    pub media_kind: MediaKind,
    pub tier: UploadTier,
    pub file: AudioFileInfo,
    pub created_at: DateTime<Utc>,
}

impl UploadAttempt {
    pub fn new(user_id: Uuid, metadata: UploadMetadata, file: AudioFileInfo) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: metadata.title.trim().to_string(),
            declared_artist: metadata.declared_artist.trim().to_string(),
            genre: metadata.genre,
            album: metadata.album,
            record_label: metadata.record_label,
            ownership_code: metadata.ownership_code,
            origin: metadata.origin,
            media_kind: metadata.media_kind,
            tier: metadata.tier,
            file,
            created_at: Utc::now(),
        }
    }

    /// Declared artist, if the uploader typed one.
    pub fn declared_artist(&self) -> Option<&str> {
        Some(self.declared_artist.as_str()).filter(|a| !a.is_empty())
    }
}
