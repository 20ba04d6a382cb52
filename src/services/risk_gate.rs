//! The publish decision. Pure: no I/O, no clock, no randomness.

use crate::{
    models::{
        decision::{BlockReason, FlagReason, RiskDecision},
        fingerprint::FingerprintVerdict,
        history::UserUploadHistory,
        ownership::OwnershipCodeStatus,
        upload::ContentOrigin,
    },
    services::metadata_screen::MetadataScreen,
};

/// Prior strikes at which every upload goes to manual review.
pub const REPEAT_INFRINGER_STRIKES: i64 = 2;
/// Accounts with fewer published uploads are spot-checked.
pub const NEW_ACCOUNT_UPLOADS: i64 = 3;

/// What the uploader asserted about the upload, and what their metadata says.
#[derive(Debug, Clone, Default)]
pub struct UploaderClaims {
    pub origin: ContentOrigin,
    pub original_confirmed: bool,
    pub artist_mismatch_acknowledged: bool,
    pub screen: MetadataScreen,
}

fn allow(claims: &UploaderClaims) -> RiskDecision {
    if claims.screen.has_release_wording() {
        RiskDecision::AllowWithFlag(FlagReason::ReleaseWording)
    } else {
        RiskDecision::Allow
    }
}

fn decide_cover(code_status: &OwnershipCodeStatus) -> RiskDecision {
    if code_status.is_verified() {
        RiskDecision::AllowWithFlag(FlagReason::CoverRecording)
    } else if code_status.lookup_failed() {
        RiskDecision::AllowWithFlag(FlagReason::CodeLookupFailed)
    } else {
        RiskDecision::Block(BlockReason::CoverNotVerified)
    }
}

/// Combine the gate results into a decision. Rows are evaluated top to
/// bottom and the first one that applies wins.
///
/// A verified match outranks the metadata screen: proof of the code is the
/// proof of rights a major artist or label name would otherwise call for.
pub fn decide(
    verdict: &FingerprintVerdict,
    code_status: &OwnershipCodeStatus,
    claims: &UploaderClaims,
    history: &UserUploadHistory,
) -> RiskDecision {
    if history.prior_strikes >= REPEAT_INFRINGER_STRIKES {
        return RiskDecision::Block(BlockReason::RepeatInfringer);
    }

    match verdict {
        FingerprintVerdict::Matched(track) => {
            if code_status.is_verified() {
                if !track.artist_mismatch() || claims.artist_mismatch_acknowledged {
                    allow(claims)
                } else {
                    RiskDecision::Block(BlockReason::ArtistMismatchUnacknowledged)
                }
            } else if code_status.lookup_failed() {
                RiskDecision::AllowWithFlag(FlagReason::CodeLookupFailed)
            } else {
                RiskDecision::Block(BlockReason::CodeNotVerified)
            }
        }
        FingerprintVerdict::ReviewRequired { .. } => {
            RiskDecision::AllowWithFlag(FlagReason::FingerprintUnavailable)
        }
        FingerprintVerdict::NoMatch | FingerprintVerdict::NotRequested
            if claims.screen.names_rights_holder() =>
        {
            RiskDecision::Block(BlockReason::MajorRightsHolder)
        }
        FingerprintVerdict::NoMatch | FingerprintVerdict::NotRequested
            if claims.origin == ContentOrigin::Cover =>
        {
            decide_cover(code_status)
        }
        FingerprintVerdict::NoMatch if claims.original_confirmed => allow(claims),
        FingerprintVerdict::NoMatch => RiskDecision::Block(BlockReason::OriginalityNotConfirmed),
        FingerprintVerdict::NotRequested if !claims.original_confirmed => {
            RiskDecision::Block(BlockReason::OriginalityNotConfirmed)
        }
        FingerprintVerdict::NotRequested => {
            if history.total_uploads < NEW_ACCOUNT_UPLOADS {
                RiskDecision::AllowWithFlag(FlagReason::NewAccountSpotCheck)
            } else {
                allow(claims)
            }
        }
    }
}
