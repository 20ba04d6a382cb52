//! Manual-review outbox backed by SQLite.
//!
//! Producers append items; moderation tooling claims them under a lease and
//! acknowledges when done. Claims that are never acknowledged expire and the
//! item is handed out again, giving at-least-once delivery.

use crate::models::review::{NewReviewItem, ReviewItem, ReviewStatus};
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

const ITEM_COLUMNS: &str = "id, item_id, user_id, reason, priority, status, deliveries, \
     claimed_by, lease_expires_at, resolution, created_at, updated_at";

#[derive(Debug, Error)]
pub enum ReviewQueueError {
    #[error("review item `{0}` not found")]
    ItemNotFound(Uuid),
    #[error("review item `{id}` is not claimed by `{worker}`")]
    NotClaimedBy { id: Uuid, worker: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type ReviewQueueResult<T> = Result<T, ReviewQueueError>;

#[derive(Clone)]
pub struct ReviewQueue {
    pub db: Arc<SqlitePool>,
}

impl ReviewQueue {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn enqueue(&self, item: NewReviewItem) -> ReviewQueueResult<ReviewItem> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, ReviewItem>(&format!(
            "INSERT INTO review_queue
                (id, item_id, user_id, reason, priority, status, deliveries, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'pending', 0, ?, ?)
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(item.item_id)
        .bind(item.user_id)
        .bind(&item.reason)
        .bind(item.priority)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await?;

        info!(
            review_id = %row.id,
            item_id = %row.item_id,
            priority = ?row.priority,
            reason = %row.reason,
            "queued item for manual review"
        );
        Ok(row)
    }

    /// Hand out up to `limit` items to `worker`, highest priority first.
    ///
    /// Pending items and items whose previous lease expired are eligible.
    pub async fn claim(
        &self,
        worker: &str,
        limit: u32,
        lease: Duration,
    ) -> ReviewQueueResult<Vec<ReviewItem>> {
        let now = Utc::now();
        let lease = ChronoDuration::from_std(lease).unwrap_or_else(|_| ChronoDuration::hours(1));
        let expires = now + lease;

        let mut rows = sqlx::query_as::<_, ReviewItem>(&format!(
            "UPDATE review_queue
             SET status = 'claimed', claimed_by = ?, lease_expires_at = ?,
                 deliveries = deliveries + 1, updated_at = ?
             WHERE id IN (
                 SELECT id FROM review_queue
                 WHERE status = 'pending'
                    OR (status = 'claimed' AND lease_expires_at < ?)
                 ORDER BY priority DESC, created_at ASC
                 LIMIT ?
             )
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(worker)
        .bind(expires)
        .bind(now)
        .bind(now)
        .bind(i64::from(limit.max(1)))
        .fetch_all(&*self.db)
        .await?;

        rows.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        debug!(worker, claimed = rows.len(), "claimed review items");
        Ok(rows)
    }

    /// Mark a claimed item as done.
    pub async fn ack(
        &self,
        id: Uuid,
        worker: &str,
        resolution: Option<String>,
    ) -> ReviewQueueResult<ReviewItem> {
        let row = sqlx::query_as::<_, ReviewItem>(&format!(
            "UPDATE review_queue
             SET status = 'done', resolution = ?, lease_expires_at = NULL, updated_at = ?
             WHERE id = ? AND status = 'claimed' AND claimed_by = ?
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(resolution)
        .bind(Utc::now())
        .bind(id)
        .bind(worker)
        .fetch_optional(&*self.db)
        .await?;

        match row {
            Some(item) => {
                info!(review_id = %id, worker, "review item resolved");
                Ok(item)
            }
            None => Err(self.not_claimed(id, worker).await),
        }
    }

    /// Give a claimed item back to the pool before its lease runs out.
    pub async fn release(&self, id: Uuid, worker: &str) -> ReviewQueueResult<ReviewItem> {
        let row = sqlx::query_as::<_, ReviewItem>(&format!(
            "UPDATE review_queue
             SET status = 'pending', claimed_by = NULL, lease_expires_at = NULL, updated_at = ?
             WHERE id = ? AND status = 'claimed' AND claimed_by = ?
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(id)
        .bind(worker)
        .fetch_optional(&*self.db)
        .await?;

        match row {
            Some(item) => Ok(item),
            None => Err(self.not_claimed(id, worker).await),
        }
    }

    pub async fn get(&self, id: Uuid) -> ReviewQueueResult<ReviewItem> {
        sqlx::query_as::<_, ReviewItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM review_queue WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(ReviewQueueError::ItemNotFound(id))
    }

    /// Items in insertion order, optionally filtered by status.
    pub async fn list(
        &self,
        status: Option<ReviewStatus>,
        limit: u32,
    ) -> ReviewQueueResult<Vec<ReviewItem>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, ReviewItem>(&format!(
                    "SELECT {ITEM_COLUMNS} FROM review_queue
                     WHERE status = ? ORDER BY created_at ASC LIMIT ?"
                ))
                .bind(status)
                .bind(i64::from(limit))
                .fetch_all(&*self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, ReviewItem>(&format!(
                    "SELECT {ITEM_COLUMNS} FROM review_queue ORDER BY created_at ASC LIMIT ?"
                ))
                .bind(i64::from(limit))
                .fetch_all(&*self.db)
                .await?
            }
        };
        Ok(rows)
    }

    /// Items referring to a given attempt, report or track.
    pub async fn for_item(&self, item_id: Uuid) -> ReviewQueueResult<Vec<ReviewItem>> {
        let rows = sqlx::query_as::<_, ReviewItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM review_queue WHERE item_id = ? ORDER BY created_at ASC"
        ))
        .bind(item_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    async fn not_claimed(&self, id: Uuid, worker: &str) -> ReviewQueueError {
        match self.get(id).await {
            Ok(_) => ReviewQueueError::NotClaimedBy {
                id,
                worker: worker.to_string(),
            },
            Err(err) => err,
        }
    }
}
