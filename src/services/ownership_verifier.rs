//! Ownership-code (ISRC) verification.
//!
//! A code is checked against the code the fingerprint service detected when
//! there is one, and against the public recording registry otherwise. A
//! detected code is authoritative: an entered code that differs from it is a
//! mismatch even if the registry knows the entered code, and whatever its
//! shape. The format check only guards registry lookups.

use crate::{
    models::{
        fingerprint::FingerprintVerdict,
        ownership::{CodeCheck, RegisteredRecording, VerificationSource},
    },
    services::{
        artist_match::{DEFAULT_MATCH_THRESHOLD, similarity},
        registry_client::{RecordingRegistry, RegistryError},
    },
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Uppercase and strip every separator: "gb-um7-15-02800" -> "GBUM71502800".
pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Two letters (country), three alphanumerics (registrant), seven digits
/// (year and designation).
pub fn is_valid_format(normalized: &str) -> bool {
    let bytes = normalized.as_bytes();
    bytes.len() == 12
        && bytes[..2].iter().all(u8::is_ascii_uppercase)
        && bytes[2..5]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        && bytes[5..].iter().all(u8::is_ascii_digit)
}

/// Something that can check an entered code against a verdict.
#[async_trait]
pub trait CodeVerification: Send + Sync {
    async fn verify(&self, code: &str, verdict: &FingerprintVerdict) -> CodeCheck;
}

pub struct OwnershipVerifier {
    registry: Arc<dyn RecordingRegistry>,
    title_threshold: f64,
}

impl OwnershipVerifier {
    pub fn new(registry: Arc<dyn RecordingRegistry>) -> Self {
        Self {
            registry,
            title_threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }

    async fn check_registry(&self, code: String, verdict: &FingerprintVerdict) -> CodeCheck {
        let recordings = match self.registry.lookup_code(&code).await {
            Ok(recordings) => recordings,
            Err(RegistryError::NotFound(_)) => {
                return CodeCheck::Mismatched {
                    reason: format!("{} is not registered to any recording", code),
                };
            }
            Err(err) => {
                warn!(code = %code, error = %err, "recording registry lookup failed");
                return CodeCheck::LookupFailed(err.to_string());
            }
        };

        // A matched track without a code still pins down which recording the
        // entered code has to belong to.
        let chosen = match verdict.detected() {
            Some(track) => recordings
                .into_iter()
                .find(|rec| similarity(&rec.title, &track.title) >= self.title_threshold),
            None => recordings.into_iter().next(),
        };

        match chosen {
            Some(recording) => CodeCheck::Verified(RegisteredRecording {
                code,
                title: Some(recording.title),
                artist_credits: recording.artist_credits,
                source: VerificationSource::Registry,
            }),
            None => CodeCheck::Mismatched {
                reason: format!(
                    "{} is registered to a different recording than the detected one",
                    code
                ),
            },
        }
    }
}

#[async_trait]
impl CodeVerification for OwnershipVerifier {
    async fn verify(&self, code: &str, verdict: &FingerprintVerdict) -> CodeCheck {
        let normalized = normalize_code(code);

        if let Some(detected) = verdict.detected_code() {
            let detected = normalize_code(detected);
            debug!(entered = %normalized, detected = %detected, "comparing against detected code");
            if detected == normalized {
                let track = verdict.detected();
                return CodeCheck::Verified(RegisteredRecording {
                    code: normalized,
                    title: track.map(|t| t.title.clone()),
                    artist_credits: track.map(|t| vec![t.artist.clone()]).unwrap_or_default(),
                    source: VerificationSource::DetectedCode,
                });
            }
            return CodeCheck::Mismatched {
                reason: format!(
                    "entered code {} does not match the detected code {}",
                    normalized, detected
                ),
            };
        }

        if !is_valid_format(&normalized) {
            return CodeCheck::InvalidFormat(format!(
                "`{}` is not a valid recording code (expected e.g. GB-UM7-15-02800)",
                code.trim()
            ));
        }
        self.check_registry(normalized, verdict).await
    }
}
