//! Per-user upload and infringement history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Long-lived record keyed by user id.
///
/// Strikes are mutated by the risk pipeline and takedowns; the ban flag may
/// also be set by moderators out of band.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct UserUploadHistory {
    pub user_id: Uuid,
    pub prior_strikes: i64,
    pub total_uploads: i64,
    pub account_active: bool,
    pub banned: bool,
    pub ban_reason: Option<String>,
    pub banned_at: Option<DateTime<Utc>>,
}

impl UserUploadHistory {
    /// History of a user we have never seen.
    pub fn fresh(user_id: Uuid) -> Self {
        Self {
            user_id,
            prior_strikes: 0,
            total_uploads: 0,
            account_active: true,
            banned: false,
            ban_reason: None,
            banned_at: None,
        }
    }

    pub fn may_upload(&self) -> bool {
        self.account_active && !self.banned
    }
}

/// One row of the append-only strike log.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StrikeRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content_id: Option<Uuid>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// What `record_strike` did.
#[derive(Serialize, Clone, Debug)]
pub struct StrikeOutcome {
    pub history: UserUploadHistory,
    /// True when this strike crossed the ban threshold.
    pub newly_banned: bool,
}
