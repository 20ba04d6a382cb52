//! Per-user upload history and copyright strike bookkeeping.
//!
//! Strike and upload counters are bumped with a single
//! `INSERT .. ON CONFLICT DO UPDATE .. RETURNING` statement so concurrent
//! writers cannot lose an increment.

use crate::models::history::{StrikeOutcome, StrikeRecord, UserUploadHistory};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Strike count at which an account is banned.
pub const STRIKE_BAN_THRESHOLD: i64 = 3;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("strike reason must not be empty")]
    EmptyReason,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type HistoryResult<T> = Result<T, HistoryError>;

#[derive(Clone)]
pub struct HistoryService {
    pub db: Arc<SqlitePool>,
    ban_threshold: i64,
}

impl HistoryService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self {
            db,
            ban_threshold: STRIKE_BAN_THRESHOLD,
        }
    }

    /// Unknown users read as a fresh, active account.
    pub async fn read_user_history(&self, user_id: Uuid) -> HistoryResult<UserUploadHistory> {
        let row = sqlx::query_as::<_, UserUploadHistory>(
            "SELECT user_id, prior_strikes, total_uploads, account_active, banned,
                    ban_reason, banned_at
             FROM user_upload_history WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&*self.db)
        .await?;

        Ok(row.unwrap_or_else(|| UserUploadHistory::fresh(user_id)))
    }

    /// Record one strike and ban the account once the threshold is reached.
    ///
    /// The increment, the strike log row and the ban happen in one transaction.
    pub async fn record_strike(
        &self,
        user_id: Uuid,
        reason: &str,
        content_id: Option<Uuid>,
    ) -> HistoryResult<StrikeOutcome> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(HistoryError::EmptyReason);
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let strikes: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO user_upload_history
                (user_id, prior_strikes, total_uploads, account_active, banned, updated_at)
            VALUES (?, 1, 0, 1, 0, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                prior_strikes = prior_strikes + 1,
                updated_at = excluded.updated_at
            RETURNING prior_strikes
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO strikes (id, user_id, content_id, reason, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(content_id)
        .bind(reason)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let mut newly_banned = false;
        if strikes >= self.ban_threshold {
            let ban_reason = format!(
                "Repeat copyright infringement ({} strikes); latest: {}",
                strikes, reason
            );
            let result = sqlx::query(
                "UPDATE user_upload_history
                 SET banned = 1, account_active = 0, ban_reason = ?, banned_at = ?, updated_at = ?
                 WHERE user_id = ? AND banned = 0",
            )
            .bind(&ban_reason)
            .bind(now)
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
            newly_banned = result.rows_affected() == 1;
        }

        tx.commit().await?;

        if newly_banned {
            warn!(%user_id, strikes, "account banned for repeat copyright infringement");
        } else {
            info!(%user_id, strikes, reason, "recorded copyright strike");
        }

        let history = self.read_user_history(user_id).await?;
        Ok(StrikeOutcome {
            history,
            newly_banned,
        })
    }

    /// Bump the published-upload counter. Returns the new total.
    pub async fn increment_upload_count(&self, user_id: Uuid) -> HistoryResult<i64> {
        let total = sqlx::query_scalar(
            r#"
            INSERT INTO user_upload_history
                (user_id, prior_strikes, total_uploads, account_active, banned, updated_at)
            VALUES (?, 0, 1, 1, 0, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                total_uploads = total_uploads + 1,
                updated_at = excluded.updated_at
            RETURNING total_uploads
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;
        Ok(total)
    }

    /// Strike log for a user, newest first.
    pub async fn list_strikes(&self, user_id: Uuid) -> HistoryResult<Vec<StrikeRecord>> {
        let rows = sqlx::query_as::<_, StrikeRecord>(
            "SELECT id, user_id, content_id, reason, created_at
             FROM strikes WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn service() -> HistoryService {
        HistoryService::new(Arc::new(db::memory_pool().await.unwrap()))
    }

    #[tokio::test]
    async fn unknown_user_reads_as_fresh() {
        let history = service().await;
        let user = Uuid::new_v4();
        let record = history.read_user_history(user).await.unwrap();
        assert_eq!(record, UserUploadHistory::fresh(user));
        assert!(record.may_upload());
    }

    #[tokio::test]
    async fn third_strike_bans_the_account() {
        let history = service().await;
        let user = Uuid::new_v4();

        let first = history.record_strike(user, "DMCA takedown", None).await.unwrap();
        assert_eq!(first.history.prior_strikes, 1);
        assert!(!first.newly_banned);

        let second = history.record_strike(user, "DMCA takedown", None).await.unwrap();
        assert_eq!(second.history.prior_strikes, 2);
        assert!(!second.history.banned);
        assert!(second.history.account_active);

        let third = history
            .record_strike(user, "fingerprint match without rights", Some(Uuid::new_v4()))
            .await
            .unwrap();
        assert!(third.newly_banned);
        assert!(third.history.banned);
        assert!(!third.history.account_active);
        assert!(third.history.banned_at.is_some());
        let reason = third.history.ban_reason.unwrap();
        assert!(!reason.is_empty());
        assert!(reason.contains("3 strikes"));

        assert_eq!(history.list_strikes(user).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn further_strikes_do_not_rewrite_the_ban() {
        let history = service().await;
        let user = Uuid::new_v4();
        for _ in 0..3 {
            history.record_strike(user, "DMCA takedown", None).await.unwrap();
        }
        let fourth = history.record_strike(user, "DMCA takedown", None).await.unwrap();
        assert!(!fourth.newly_banned);
        assert_eq!(fourth.history.prior_strikes, 4);
        assert!(fourth.history.banned);
    }

    #[tokio::test]
    async fn concurrent_strikes_are_all_counted() {
        let history = service().await;
        let user = Uuid::new_v4();
        let tasks = (0..5).map(|_| history.record_strike(user, "report upheld", None));
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }
        let record = history.read_user_history(user).await.unwrap();
        assert_eq!(record.prior_strikes, 5);
    }

    #[tokio::test]
    async fn blank_reason_is_rejected() {
        let history = service().await;
        let result = history.record_strike(Uuid::new_v4(), "   ", None).await;
        assert!(matches!(result, Err(HistoryError::EmptyReason)));
    }

    #[tokio::test]
    async fn upload_count_increments() {
        let history = service().await;
        let user = Uuid::new_v4();
        assert_eq!(history.increment_upload_count(user).await.unwrap(), 1);
        assert_eq!(history.increment_upload_count(user).await.unwrap(), 2);
        let record = history.read_user_history(user).await.unwrap();
        assert_eq!(record.total_uploads, 2);
        assert_eq!(record.prior_strikes, 0);
    }
}
