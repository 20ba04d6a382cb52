//! Upload verification workflow.
//!
//! Runs the gates strictly forward: validate, fingerprint, verify the
//! ownership code, read history, decide, then book-keep. The same pipeline is
//! available one-shot ([`VerificationWorkflow::run`]) and as an interactive
//! attempt whose ownership code is typed in while the attempt is open.

use crate::{
    models::{
        decision::RiskDecision,
        fingerprint::FingerprintVerdict,
        history::{StrikeOutcome, UserUploadHistory},
        ownership::OwnershipCodeStatus,
        review::{NewReviewItem, ReviewItem, ReviewPriority},
        upload::{AudioFileInfo, AudioPayload, MediaKind, UploadAttempt, UploadMetadata},
    },
    services::{
        debounce::CodeDebouncer,
        fingerprint_service::FingerprintService,
        history_service::{HistoryError, HistoryService},
        metadata_screen::{self, MetadataScreen},
        ownership_verifier::CodeVerification,
        review_queue::{ReviewQueue, ReviewQueueError},
        risk_gate::{self, UploaderClaims},
        upload_validator::{UploadValidator, ValidationReport},
    },
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const TAKEDOWN_STRIKE_REASON: &str = "DMCA takedown";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("upload failed validation")]
    Validation(ValidationReport),
    #[error("account `{0}` is not allowed to upload")]
    AccountSuspended(Uuid),
    #[error("upload attempt `{0}` belongs to another user")]
    NotAttemptOwner(Uuid),
    #[error("upload attempt `{0}` not found")]
    AttemptNotFound(Uuid),
    #[error("upload attempt `{0}` is already being decided")]
    AttemptBusy(Uuid),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Review(#[from] ReviewQueueError),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Everything needed for a one-shot verification.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub user_id: Uuid,
    pub metadata: UploadMetadata,
    pub file: AudioFileInfo,
    pub payload: AudioPayload,
    pub acknowledgements: Acknowledgements,
}

/// Confirmations the uploader gives at publish time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Acknowledgements {
    #[serde(default)]
    pub original_confirmed: bool,
    #[serde(default)]
    pub artist_mismatch_acknowledged: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenedAttempt {
    pub attempt: UploadAttempt,
    pub verdict: FingerprintVerdict,
    pub code_status: OwnershipCodeStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    pub attempt_id: Uuid,
    pub verdict: FingerprintVerdict,
    pub code_status: OwnershipCodeStatus,
    pub decision: RiskDecision,
    pub message: String,
    pub metadata_screen: MetadataScreen,
    pub review_item_id: Option<Uuid>,
    pub history: UserUploadHistory,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    Copyright,
    Spam,
    Abuse,
    Other,
}

impl ReportCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportCategory::Copyright => "copyright",
            ReportCategory::Spam => "spam",
            ReportCategory::Abuse => "abuse",
            ReportCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentReport {
    pub content_id: Uuid,
    /// Uploader of the reported content, when known.
    pub owner_id: Option<Uuid>,
    pub category: ReportCategory,
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TakedownNotice {
    pub user_id: Uuid,
    pub content_id: Uuid,
    pub claimant: String,
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TakedownOutcome {
    pub strike: StrikeOutcome,
    pub review_item: ReviewItem,
}

struct OpenAttempt {
    attempt: UploadAttempt,
    verdict: FingerprintVerdict,
    deciding: bool,
}

impl OpenAttempt {
    fn check_owner(&self, user_id: Uuid) -> WorkflowResult<()> {
        if self.attempt.user_id != user_id {
            return Err(WorkflowError::NotAttemptOwner(self.attempt.id));
        }
        Ok(())
    }

    fn check_idle(&self) -> WorkflowResult<()> {
        if self.deciding {
            return Err(WorkflowError::AttemptBusy(self.attempt.id));
        }
        Ok(())
    }
}

type AttemptMap = Mutex<HashMap<Uuid, OpenAttempt>>;

fn lock_attempts(attempts: &AttemptMap) -> MutexGuard<'_, HashMap<Uuid, OpenAttempt>> {
    attempts
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Held while an attempt is decided. On drop the attempt is removed if the
/// decision was recorded and released for another try otherwise, including
/// when the request is abandoned mid-way.
struct Deciding<'a> {
    attempts: &'a AttemptMap,
    attempt_id: Uuid,
    recorded: bool,
}

impl Drop for Deciding<'_> {
    fn drop(&mut self) {
        let mut attempts = lock_attempts(self.attempts);
        if self.recorded {
            attempts.remove(&self.attempt_id);
        } else if let Some(open) = attempts.get_mut(&self.attempt_id) {
            open.deciding = false;
        }
    }
}

/// Inline audio is measured; the declared size only stands for URL payloads.
fn received_file(file: AudioFileInfo, payload: &AudioPayload) -> AudioFileInfo {
    match payload.len() {
        Some(size_bytes) => AudioFileInfo { size_bytes, ..file },
        None => file,
    }
}

pub struct VerificationWorkflow {
    validator: UploadValidator,
    fingerprint: FingerprintService,
    verifier: Arc<dyn CodeVerification>,
    debouncer: CodeDebouncer,
    pub history: HistoryService,
    pub reviews: ReviewQueue,
    attempts: AttemptMap,
}

impl VerificationWorkflow {
    pub fn new(
        validator: UploadValidator,
        fingerprint: FingerprintService,
        verifier: Arc<dyn CodeVerification>,
        quiet_period: Duration,
        history: HistoryService,
        reviews: ReviewQueue,
    ) -> Self {
        Self {
            validator,
            fingerprint,
            debouncer: CodeDebouncer::new(verifier.clone(), quiet_period),
            verifier,
            history,
            reviews,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn attempts(&self) -> MutexGuard<'_, HashMap<Uuid, OpenAttempt>> {
        lock_attempts(&self.attempts)
    }

    /// Validation only, no side effects.
    pub fn validate(&self, metadata: &UploadMetadata, file: &AudioFileInfo) -> ValidationReport {
        self.validator.validate(metadata, file)
    }

    /// Validate, refuse suspended accounts and run the fingerprint gate.
    async fn admit(
        &self,
        user_id: Uuid,
        metadata: UploadMetadata,
        file: AudioFileInfo,
        payload: AudioPayload,
    ) -> WorkflowResult<(UploadAttempt, FingerprintVerdict)> {
        let file = received_file(file, &payload);
        let report = self.validator.validate(&metadata, &file);
        if !report.valid {
            info!(%user_id, violations = report.violations.len(), "upload rejected by validator");
            return Err(WorkflowError::Validation(report));
        }

        self.ensure_may_upload(user_id).await?;

        let attempt = UploadAttempt::new(user_id, metadata, file);
        let verdict = match attempt.media_kind {
            MediaKind::SpokenWord => FingerprintVerdict::NotRequested,
            MediaKind::Music => {
                self.fingerprint
                    .lookup(payload, attempt.declared_artist())
                    .await
            }
        };
        Ok((attempt, verdict))
    }

    async fn ensure_may_upload(&self, user_id: Uuid) -> WorkflowResult<UserUploadHistory> {
        let history = self.history.read_user_history(user_id).await?;
        if !history.may_upload() {
            warn!(%user_id, "upload refused for suspended account");
            return Err(WorkflowError::AccountSuspended(user_id));
        }
        Ok(history)
    }

    /// One-shot forward pipeline.
    pub async fn run(&self, request: VerificationRequest) -> WorkflowResult<VerificationOutcome> {
        let (attempt, verdict) = self
            .admit(
                request.user_id,
                request.metadata,
                request.file,
                request.payload,
            )
            .await?;

        let code_status = match attempt.ownership_code.as_deref() {
            Some(code) if !code.trim().is_empty() => {
                self.verifier.verify(code, &verdict).await.into()
            }
            _ => OwnershipCodeStatus::Unset,
        };

        self.conclude(&attempt, verdict, code_status, request.acknowledgements)
            .await
    }

    /// Decide and record the consequences. The review item is written
    /// before the upload is counted so a failed enqueue leaves no trace.
    async fn conclude(
        &self,
        attempt: &UploadAttempt,
        verdict: FingerprintVerdict,
        code_status: OwnershipCodeStatus,
        acks: Acknowledgements,
    ) -> WorkflowResult<VerificationOutcome> {
        let history = self.history.read_user_history(attempt.user_id).await?;
        let claims = UploaderClaims {
            origin: attempt.origin,
            original_confirmed: acks.original_confirmed,
            artist_mismatch_acknowledged: acks.artist_mismatch_acknowledged,
            screen: metadata_screen::screen(attempt),
        };
        let decision = risk_gate::decide(&verdict, &code_status, &claims, &history);
        info!(
            attempt_id = %attempt.id,
            user_id = %attempt.user_id,
            decision = %decision,
            "risk gate decided"
        );

        let review_item_id = if decision.requires_review() {
            let item = self
                .reviews
                .enqueue(NewReviewItem {
                    item_id: attempt.id,
                    user_id: Some(attempt.user_id),
                    reason: format!("{}: \"{}\" by {}", decision, attempt.title, attempt.declared_artist),
                    priority: decision.review_priority(),
                })
                .await?;
            Some(item.id)
        } else {
            None
        };

        if decision.is_allowed() {
            self.history.increment_upload_count(attempt.user_id).await?;
        }

        let history = self.history.read_user_history(attempt.user_id).await?;
        Ok(VerificationOutcome {
            attempt_id: attempt.id,
            verdict,
            code_status,
            message: decision_message(&decision),
            decision,
            metadata_screen: claims.screen,
            review_item_id,
            history,
        })
    }

    /// Start an interactive attempt. A code supplied up front is checked
    /// through the debouncer like typed input.
    pub async fn open_attempt(
        &self,
        user_id: Uuid,
        metadata: UploadMetadata,
        file: AudioFileInfo,
        payload: AudioPayload,
    ) -> WorkflowResult<OpenedAttempt> {
        let (attempt, verdict) = self.admit(user_id, metadata, file, payload).await?;

        if let Some(code) = attempt.ownership_code.as_deref() {
            self.debouncer.submit(attempt.id, code, verdict.clone());
        }
        let code_status = self.debouncer.status(attempt.id);

        self.attempts().insert(
            attempt.id,
            OpenAttempt {
                attempt: attempt.clone(),
                verdict: verdict.clone(),
                deciding: false,
            },
        );
        info!(attempt_id = %attempt.id, %user_id, "upload attempt opened");

        Ok(OpenedAttempt {
            attempt,
            verdict,
            code_status,
        })
    }

    fn owned_verdict(&self, user_id: Uuid, attempt_id: Uuid) -> WorkflowResult<FingerprintVerdict> {
        let attempts = self.attempts();
        let open = attempts
            .get(&attempt_id)
            .ok_or(WorkflowError::AttemptNotFound(attempt_id))?;
        open.check_owner(user_id)?;
        Ok(open.verdict.clone())
    }

    /// Like [`Self::owned_verdict`], but refuses attempts being decided.
    fn idle_verdict(&self, user_id: Uuid, attempt_id: Uuid) -> WorkflowResult<FingerprintVerdict> {
        let attempts = self.attempts();
        let open = attempts
            .get(&attempt_id)
            .ok_or(WorkflowError::AttemptNotFound(attempt_id))?;
        open.check_owner(user_id)?;
        open.check_idle()?;
        Ok(open.verdict.clone())
    }

    /// Feed typed input into the debounced verifier.
    pub fn submit_code(
        &self,
        user_id: Uuid,
        attempt_id: Uuid,
        code: &str,
    ) -> WorkflowResult<OwnershipCodeStatus> {
        let verdict = self.idle_verdict(user_id, attempt_id)?;
        self.debouncer.submit(attempt_id, code, verdict);
        Ok(self.debouncer.status(attempt_id))
    }

    pub fn code_status(&self, user_id: Uuid, attempt_id: Uuid) -> WorkflowResult<OwnershipCodeStatus> {
        self.owned_verdict(user_id, attempt_id)?;
        Ok(self.debouncer.status(attempt_id))
    }

    /// Settle the code check, decide and discard the attempt. The attempt
    /// stays open until the decision is recorded, so a failed decision can
    /// be retried.
    pub async fn decide_attempt(
        &self,
        user_id: Uuid,
        attempt_id: Uuid,
        acks: Acknowledgements,
    ) -> WorkflowResult<VerificationOutcome> {
        let (attempt, verdict) = {
            let mut attempts = self.attempts();
            let open = attempts
                .get_mut(&attempt_id)
                .ok_or(WorkflowError::AttemptNotFound(attempt_id))?;
            open.check_owner(user_id)?;
            open.check_idle()?;
            open.deciding = true;
            (open.attempt.clone(), open.verdict.clone())
        };
        let mut deciding = Deciding {
            attempts: &self.attempts,
            attempt_id,
            recorded: false,
        };

        let code_status = self.debouncer.flush(attempt_id).await;
        self.ensure_may_upload(user_id).await?;
        let outcome = self.conclude(&attempt, verdict, code_status, acks).await?;

        deciding.recorded = true;
        drop(deciding);
        self.debouncer.forget(attempt_id);
        Ok(outcome)
    }

    pub fn cancel_attempt(&self, user_id: Uuid, attempt_id: Uuid) -> WorkflowResult<()> {
        self.idle_verdict(user_id, attempt_id)?;
        self.attempts().remove(&attempt_id);
        self.debouncer.forget(attempt_id);
        info!(%attempt_id, "upload attempt cancelled");
        Ok(())
    }

    /// Drop open attempts older than `max_age` that were never decided or
    /// cancelled. Attempts being decided are left alone.
    pub fn evict_stale(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let stale: Vec<Uuid> = {
            let mut attempts = self.attempts();
            let stale: Vec<Uuid> = attempts
                .values()
                .filter(|open| {
                    !open.deciding
                        && (now - open.attempt.created_at)
                            .to_std()
                            .is_ok_and(|age| age >= max_age)
                })
                .map(|open| open.attempt.id)
                .collect();
            for id in &stale {
                attempts.remove(id);
            }
            stale
        };

        for id in &stale {
            self.debouncer.forget(*id);
        }
        if !stale.is_empty() {
            info!(evicted = stale.len(), "evicted stale upload attempts");
        }
        stale.len()
    }

    /// Queue a user report of published content for moderation.
    pub async fn report_content(
        &self,
        reporter_id: Uuid,
        report: ContentReport,
    ) -> WorkflowResult<ReviewItem> {
        let priority = match report.category {
            ReportCategory::Copyright => ReviewPriority::High,
            _ => ReviewPriority::Normal,
        };
        let category = report.category.as_str();
        let reason = match report.details.trim() {
            "" => format!("{} report by {}", category, reporter_id),
            details => format!("{} report by {}: {}", category, reporter_id, details),
        };

        let item = self
            .reviews
            .enqueue(NewReviewItem {
                item_id: report.content_id,
                user_id: report.owner_id,
                reason,
                priority,
            })
            .await?;
        Ok(item)
    }

    /// Strike the uploader and queue the content for urgent review.
    pub async fn record_takedown(&self, notice: TakedownNotice) -> WorkflowResult<TakedownOutcome> {
        let strike = self
            .history
            .record_strike(notice.user_id, TAKEDOWN_STRIKE_REASON, Some(notice.content_id))
            .await?;

        let reason = match notice.details.trim() {
            "" => format!("{} filed by {}", TAKEDOWN_STRIKE_REASON, notice.claimant),
            details => format!(
                "{} filed by {}: {}",
                TAKEDOWN_STRIKE_REASON, notice.claimant, details
            ),
        };
        let review_item = self
            .reviews
            .enqueue(NewReviewItem {
                item_id: notice.content_id,
                user_id: Some(notice.user_id),
                reason,
                priority: ReviewPriority::Urgent,
            })
            .await?;

        Ok(TakedownOutcome {
            strike,
            review_item,
        })
    }
}

fn decision_message(decision: &RiskDecision) -> String {
    match decision {
        RiskDecision::Allow => "upload approved".to_string(),
        RiskDecision::AllowWithFlag(reason) => format!("upload approved; {}", reason),
        RiskDecision::Block(reason) => format!("upload blocked: {}", reason),
    }
}
