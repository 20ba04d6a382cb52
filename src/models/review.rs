//! Manual-review outbox entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum ReviewPriority {
    Low = 0,
    Normal = 1,
    High = 2,
    Urgent = 3,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Claimed,
    Done,
}

/// An item waiting for (or taken by) moderation tooling.
///
/// Consumers claim items under a lease. An item whose lease runs out goes
/// back to the pool, so every item is delivered at least once.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ReviewItem {
    pub id: Uuid,
    /// The upload attempt, track or report under review.
    pub item_id: Uuid,
    pub user_id: Option<Uuid>,
    pub reason: String,
    pub priority: ReviewPriority,
    pub status: ReviewStatus,
    /// How many times the item has been handed out.
    pub deliveries: i64,
    pub claimed_by: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`crate::services::review_queue::ReviewQueue::enqueue`].
#[derive(Deserialize, Clone, Debug)]
pub struct NewReviewItem {
    pub item_id: Uuid,
    pub user_id: Option<Uuid>,
    pub reason: String,
    pub priority: ReviewPriority,
}
