//! Ownership-code (ISRC) verification state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a verified code was confirmed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationSource {
    /// Equal to the code the fingerprint service detected.
    DetectedCode,
    /// Found in the public recording registry.
    Registry,
}

/// A recording the entered code was confirmed against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisteredRecording {
    /// Normalized code.
    pub code: String,
    pub title: Option<String>,
    #[serde(default)]
    pub artist_credits: Vec<String>,
    pub source: VerificationSource,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CodeError {
    #[error("invalid code format: {0}")]
    InvalidFormat(String),
    #[error("registry lookup failed: {0}")]
    LookupFailed(String),
}

/// Result of one verification pass.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeCheck {
    Verified(RegisteredRecording),
    Mismatched { reason: String },
    InvalidFormat(String),
    LookupFailed(String),
}

/// Per-attempt state of the ownership code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OwnershipCodeStatus {
    #[default]
    Unset,
    Pending,
    Verified(RegisteredRecording),
    Mismatched { reason: String },
    Error { error: CodeError },
}

impl OwnershipCodeStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, OwnershipCodeStatus::Verified(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, OwnershipCodeStatus::Pending)
    }

    /// The registry could not be reached; not the uploader's fault.
    pub fn lookup_failed(&self) -> bool {
        matches!(
            self,
            OwnershipCodeStatus::Error {
                error: CodeError::LookupFailed(_)
            }
        )
    }
}

impl From<CodeCheck> for OwnershipCodeStatus {
    fn from(check: CodeCheck) -> Self {
        match check {
            CodeCheck::Verified(recording) => OwnershipCodeStatus::Verified(recording),
            CodeCheck::Mismatched { reason } => OwnershipCodeStatus::Mismatched { reason },
            CodeCheck::InvalidFormat(detail) => OwnershipCodeStatus::Error {
                error: CodeError::InvalidFormat(detail),
            },
            CodeCheck::LookupFailed(detail) => OwnershipCodeStatus::Error {
                error: CodeError::LookupFailed(detail),
            },
        }
    }
}
