//! Outcome of an audio fingerprint lookup.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ways the external fingerprint lookup can fail.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FingerprintFailure {
    #[error("fingerprint service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("audio payload of {size} bytes exceeds the {limit} byte ceiling")]
    PayloadTooLarge { size: u64, limit: u64 },
    #[error("fingerprint service timed out")]
    Timeout,
    #[error("fingerprint service quota exceeded")]
    QuotaExceeded,
    #[error("audio payload rejected: {0}")]
    InvalidPayload(String),
}

/// Fuzzy comparison of the declared artist against the detected one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ArtistMatch {
    pub matched: bool,
    pub confidence: f64,
}

/// Catalog metadata returned for a matched recording.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DetectedTrack {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub label: Option<String>,
    /// Recording code (ISRC) attached to the catalog entry, if any.
    pub code: Option<String>,
    /// Only present when the uploader declared an artist.
    pub artist_match: Option<ArtistMatch>,
}

impl DetectedTrack {
    /// True only when a comparison was made and it failed.
    pub fn artist_mismatch(&self) -> bool {
        matches!(self.artist_match, Some(ArtistMatch { matched: false, .. }))
    }
}

/// Produced once per upload attempt and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FingerprintVerdict {
    /// The audio matches a released recording.
    Matched(DetectedTrack),
    /// The lookup completed and found nothing.
    NoMatch,
    /// The lookup could not be completed; a human has to look at it.
    ReviewRequired { failure: FingerprintFailure },
    /// Not looked up at all (spoken-word media).
    NotRequested,
}

impl FingerprintVerdict {
    pub fn matched(&self) -> bool {
        matches!(self, FingerprintVerdict::Matched(_))
    }

    pub fn requires_manual_review(&self) -> bool {
        matches!(self, FingerprintVerdict::ReviewRequired { .. })
    }

    pub fn detected(&self) -> Option<&DetectedTrack> {
        match self {
            FingerprintVerdict::Matched(track) => Some(track),
            _ => None,
        }
    }

    /// Code reported by the fingerprint service for the matched recording.
    pub fn detected_code(&self) -> Option<&str> {
        self.detected()
            .and_then(|track| track.code.as_deref())
            .filter(|code| !code.trim().is_empty())
    }
}
