//! Final outcome of the risk gate.

use super::review::ReviewPriority;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    FingerprintUnavailable,
    CodeLookupFailed,
    NewAccountSpotCheck,
    CoverRecording,
    ReleaseWording,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    RepeatInfringer,
    CodeNotVerified,
    ArtistMismatchUnacknowledged,
    OriginalityNotConfirmed,
    MajorRightsHolder,
    CoverNotVerified,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum RiskDecision {
    Allow,
    AllowWithFlag(FlagReason),
    Block(BlockReason),
}

impl RiskDecision {
    /// Allowed outcomes publish and count towards the upload total.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RiskDecision::Allow | RiskDecision::AllowWithFlag(_))
    }

    /// Whether a review item must be written for this outcome.
    pub fn requires_review(&self) -> bool {
        matches!(
            self,
            RiskDecision::AllowWithFlag(_)
                | RiskDecision::Block(BlockReason::RepeatInfringer | BlockReason::MajorRightsHolder)
        )
    }

    pub fn review_priority(&self) -> ReviewPriority {
        match self {
            RiskDecision::Block(_) => ReviewPriority::High,
            RiskDecision::AllowWithFlag(FlagReason::NewAccountSpotCheck) => ReviewPriority::Low,
            _ => ReviewPriority::Normal,
        }
    }
}

impl fmt::Display for FlagReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FlagReason::FingerprintUnavailable => {
                "fingerprint lookup unavailable; queued for manual review"
            }
            FlagReason::CodeLookupFailed => "recording registry unreachable; queued for manual review",
            FlagReason::NewAccountSpotCheck => "new account; flagged for spot check",
            FlagReason::CoverRecording => "cover of a registered recording; queued for license review",
            FlagReason::ReleaseWording => {
                "title uses official-release wording; queued for manual review"
            }
        };
        f.write_str(text)
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BlockReason::RepeatInfringer => {
                "account has previous copyright strikes; manual review required"
            }
            BlockReason::CodeNotVerified => {
                "audio matches a released recording and the ownership code is not verified"
            }
            BlockReason::ArtistMismatchUnacknowledged => {
                "declared artist differs from the detected artist and was not acknowledged"
            }
            BlockReason::OriginalityNotConfirmed => "original ownership must be confirmed first",
            BlockReason::MajorRightsHolder => {
                "metadata names a major artist or label; proof of rights is required"
            }
            BlockReason::CoverNotVerified => {
                "covers need a verified ownership code for the original recording"
            }
        };
        f.write_str(text)
    }
}

impl fmt::Display for RiskDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskDecision::Allow => f.write_str("allow"),
            RiskDecision::AllowWithFlag(reason) => write!(f, "allow-with-flag ({})", reason),
            RiskDecision::Block(reason) => write!(f, "block ({})", reason),
        }
    }
}
