//! Represents a payload parked in the staging store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Key prefix under which oversized fingerprint payloads are staged.
pub const FINGERPRINT_TEMP_PREFIX: &str = "fingerprint-temp/";

/// A staged object (blob) waiting to be dereferenced by an external service.
///
/// The row stores metadata only; the bytes live on disk under the staging root.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StagedObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Object key (path-like, e.g. `fingerprint-temp/<uuid>`).
    pub key: String,

    /// Content type (MIME type) as declared by the uploader.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 checksum of the payload.
    pub etag: String,

    /// When the object was staged. Drives the TTL sweep.
    pub created_at: DateTime<Utc>,
}
