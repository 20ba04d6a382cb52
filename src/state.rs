//! Shared handler state and its construction from configuration.

use crate::{
    config::AppConfig,
    services::{
        fingerprint_client::{FingerprintClient, FingerprintEndpoint, HttpFingerprintClient},
        fingerprint_service::{FingerprintPolicy, FingerprintService},
        history_service::HistoryService,
        ownership_verifier::{CodeVerification, OwnershipVerifier},
        registry_client::{MusicBrainzRegistry, RecordingRegistry},
        review_queue::ReviewQueue,
        staging_service::StagingService,
        upload_validator::{UploadValidator, ValidationRules},
        workflow::VerificationWorkflow,
    },
};
use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub staging: StagingService,
    pub registry: Arc<dyn RecordingRegistry>,
    pub workflow: Arc<VerificationWorkflow>,
}

/// Swappable external collaborators. Production uses the HTTP clients.
pub struct Collaborators {
    pub fingerprint: Option<Arc<dyn FingerprintClient>>,
    pub registry: Arc<dyn RecordingRegistry>,
}

impl Collaborators {
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let fingerprint = if cfg.fingerprint.enabled {
            let endpoint = FingerprintEndpoint {
                base_url: cfg.fingerprint.url.clone(),
                access_key: cfg.fingerprint.access_key.clone(),
                access_secret: cfg.fingerprint.access_secret.clone(),
                timeout: cfg.fingerprint.timeout,
            };
            match HttpFingerprintClient::new(endpoint) {
                Ok(client) => Some(Arc::new(client) as Arc<dyn FingerprintClient>),
                Err(err) => {
                    warn!("fingerprint lookups disabled: {}", err);
                    None
                }
            }
        } else {
            None
        };

        let registry = MusicBrainzRegistry::new(&cfg.registry_url, cfg.registry_timeout)?;
        Ok(Self {
            fingerprint,
            registry: Arc::new(registry),
        })
    }
}

impl AppState {
    pub fn new(cfg: &AppConfig, db: Arc<SqlitePool>, collaborators: Collaborators) -> Self {
        let staging = StagingService::new(
            db.clone(),
            cfg.staging_dir.clone(),
            cfg.public_base_url.clone(),
        );

        let policy = FingerprintPolicy {
            enabled: cfg.fingerprint.enabled,
            inline_limit_bytes: cfg.fingerprint.inline_limit_bytes,
            max_payload_bytes: cfg.fingerprint.max_payload_bytes,
            ..FingerprintPolicy::default()
        };
        let fingerprint =
            FingerprintService::new(collaborators.fingerprint, staging.clone(), policy);

        let verifier: Arc<dyn CodeVerification> =
            Arc::new(OwnershipVerifier::new(collaborators.registry.clone()));
        let validator = UploadValidator::new(ValidationRules {
            min_file_bytes: cfg.min_file_bytes,
            ..ValidationRules::default()
        });

        let workflow = VerificationWorkflow::new(
            validator,
            fingerprint,
            verifier,
            cfg.code_quiet_period,
            HistoryService::new(db.clone()),
            ReviewQueue::new(db.clone()),
        );

        Self {
            db,
            staging,
            registry: collaborators.registry,
            workflow: Arc::new(workflow),
        }
    }
}
