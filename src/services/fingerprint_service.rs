//! Fingerprint lookup policy around a [`FingerprintClient`].
//!
//! Decides how audio reaches the service (inline or staged and passed by
//! URL), enforces the payload ceiling, compares artists on a match, and turns
//! every failure into [`FingerprintVerdict::ReviewRequired`]. A failure is never
//! reported as "no match".

use crate::{
    models::{
        fingerprint::{DetectedTrack, FingerprintFailure, FingerprintVerdict},
        staged_object::FINGERPRINT_TEMP_PREFIX,
        upload::AudioPayload,
    },
    services::{
        artist_match::{DEFAULT_MATCH_THRESHOLD, match_artist},
        fingerprint_client::{FingerprintClient, Identification},
        staging_service::StagingService,
    },
};
use std::sync::Arc;
use tracing::{info, warn};

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FingerprintPolicy {
    pub enabled: bool,
    /// Larger payloads are staged and sent by URL.
    pub inline_limit_bytes: u64,
    /// Larger payloads are not looked up at all.
    pub max_payload_bytes: u64,
    pub artist_threshold: f64,
}

impl Default for FingerprintPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            inline_limit_bytes: 10 * MIB,
            max_payload_bytes: 500 * MIB,
            artist_threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

#[derive(Clone)]
pub struct FingerprintService {
    client: Option<Arc<dyn FingerprintClient>>,
    staging: StagingService,
    policy: FingerprintPolicy,
}

impl FingerprintService {
    /// `client` is `None` when no fingerprint service is configured.
    pub fn new(
        client: Option<Arc<dyn FingerprintClient>>,
        staging: StagingService,
        policy: FingerprintPolicy,
    ) -> Self {
        Self {
            client,
            staging,
            policy,
        }
    }

    /// Look the audio up and compare the declared artist on a match.
    pub async fn lookup(
        &self,
        payload: AudioPayload,
        declared_artist: Option<&str>,
    ) -> FingerprintVerdict {
        let verdict = match self.identify(payload).await {
            Ok(Identification::Match(found)) => {
                let artist_match = declared_artist
                    .filter(|artist| !artist.trim().is_empty())
                    .map(|artist| match_artist(artist, &found.artist, self.policy.artist_threshold));
                FingerprintVerdict::Matched(DetectedTrack {
                    title: found.title,
                    artist: found.artist,
                    album: found.album,
                    label: found.label,
                    code: found.code,
                    artist_match,
                })
            }
            Ok(Identification::NoMatch) => FingerprintVerdict::NoMatch,
            Err(failure) => {
                warn!(error = %failure, "fingerprint lookup failed, routing to manual review");
                FingerprintVerdict::ReviewRequired { failure }
            }
        };

        info!(
            matched = verdict.matched(),
            review = verdict.requires_manual_review(),
            "fingerprint verdict"
        );
        verdict
    }

    async fn identify(&self, payload: AudioPayload) -> Result<Identification, FingerprintFailure> {
        let client = match (&self.client, self.policy.enabled) {
            (Some(client), true) => client,
            _ => {
                return Err(FingerprintFailure::ServiceUnavailable(
                    "fingerprinting is disabled".into(),
                ));
            }
        };

        if payload.is_empty() {
            return Err(FingerprintFailure::InvalidPayload("no audio supplied".into()));
        }

        let bytes = match payload {
            AudioPayload::Inline(bytes) => bytes,
            url @ AudioPayload::Url(_) => return client.identify(&url).await,
        };

        let size = bytes.len() as u64;
        if size > self.policy.max_payload_bytes {
            return Err(FingerprintFailure::PayloadTooLarge {
                size,
                limit: self.policy.max_payload_bytes,
            });
        }
        if size <= self.policy.inline_limit_bytes {
            return client.identify(&AudioPayload::Inline(bytes)).await;
        }

        let staged = self
            .staging
            .put_bytes(FINGERPRINT_TEMP_PREFIX, bytes, None)
            .await
            .map_err(|e| {
                FingerprintFailure::ServiceUnavailable(format!("could not stage audio: {}", e))
            })?;
        let url = self.staging.public_url(&staged.key);
        info!(key = %staged.key, size, "staged oversized sample for lookup by url");

        let result = client.identify(&AudioPayload::Url(url)).await;

        if let Err(e) = self.staging.delete(&staged.key).await {
            // left for the TTL sweep
            warn!(key = %staged.key, error = %e, "failed to remove staged sample");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, services::fingerprint_client::CatalogMatch};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;

    struct ScriptedClient {
        reply: Result<Identification, FingerprintFailure>,
        seen: Mutex<Vec<AudioPayload>>,
    }

    impl ScriptedClient {
        fn new(reply: Result<Identification, FingerprintFailure>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl FingerprintClient for ScriptedClient {
        async fn identify(
            &self,
            payload: &AudioPayload,
        ) -> Result<Identification, FingerprintFailure> {
            self.seen.lock().unwrap().push(payload.clone());
            self.reply.clone()
        }
    }

    fn dyn_client(client: &Arc<ScriptedClient>) -> Option<Arc<dyn FingerprintClient>> {
        let client: Arc<dyn FingerprintClient> = client.clone();
        Some(client)
    }

    async fn staging(dir: &tempfile::TempDir) -> StagingService {
        let pool = Arc::new(db::memory_pool().await.unwrap());
        StagingService::new(pool, dir.path(), "http://verifier.local")
    }

    fn hello() -> Identification {
        Identification::Match(CatalogMatch {
            title: "Hello".into(),
            artist: "Adele".into(),
            code: Some("GBBKS1500214".into()),
            ..CatalogMatch::default()
        })
    }

    fn small_policy() -> FingerprintPolicy {
        FingerprintPolicy {
            inline_limit_bytes: 8,
            max_payload_bytes: 32,
            ..FingerprintPolicy::default()
        }
    }

    #[tokio::test]
    async fn match_carries_artist_comparison() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(Ok(hello()));
        let service =
            FingerprintService::new(dyn_client(&client), staging(&dir).await, FingerprintPolicy::default());

        let verdict = service
            .lookup(AudioPayload::Inline(Bytes::from_static(b"abc")), Some("Metallica"))
            .await;
        let track = verdict.detected().unwrap();
        assert!(track.artist_mismatch());
        assert_eq!(verdict.detected_code(), Some("GBBKS1500214"));

        let verdict = service
            .lookup(AudioPayload::Inline(Bytes::from_static(b"abc")), None)
            .await;
        assert!(verdict.detected().unwrap().artist_match.is_none());
    }

    #[tokio::test]
    async fn failures_become_review_required() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(Err(FingerprintFailure::Timeout));
        let service =
            FingerprintService::new(dyn_client(&client), staging(&dir).await, FingerprintPolicy::default());

        let verdict = service
            .lookup(AudioPayload::Inline(Bytes::from_static(b"abc")), Some("Adele"))
            .await;
        assert_eq!(
            verdict,
            FingerprintVerdict::ReviewRequired {
                failure: FingerprintFailure::Timeout
            }
        );
    }

    #[tokio::test]
    async fn disabled_service_requires_review() {
        let dir = tempfile::tempdir().unwrap();
        let service = FingerprintService::new(None, staging(&dir).await, FingerprintPolicy::default());

        let verdict = service
            .lookup(AudioPayload::Inline(Bytes::from_static(b"abc")), None)
            .await;
        assert!(matches!(
            verdict,
            FingerprintVerdict::ReviewRequired {
                failure: FingerprintFailure::ServiceUnavailable(_)
            }
        ));
    }

    #[tokio::test]
    async fn oversized_payload_is_staged_then_removed() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(Ok(Identification::NoMatch));
        let staging = staging(&dir).await;
        let service = FingerprintService::new(dyn_client(&client), staging.clone(), small_policy());

        let verdict = service
            .lookup(AudioPayload::Inline(Bytes::from(vec![7u8; 16])), None)
            .await;
        assert_eq!(verdict, FingerprintVerdict::NoMatch);

        let seen = client.seen.lock().unwrap().clone();
        let url = match &seen[0] {
            AudioPayload::Url(url) => url.clone(),
            other => panic!("expected url payload, got {:?}", other),
        };
        assert!(url.starts_with("http://verifier.local/staging/fingerprint-temp/"));

        let key = url.trim_start_matches("http://verifier.local/staging/");
        assert!(staging.open(key).await.is_err());
    }

    #[tokio::test]
    async fn payload_above_ceiling_is_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(Ok(hello()));
        let service = FingerprintService::new(dyn_client(&client), staging(&dir).await, small_policy());

        let verdict = service
            .lookup(AudioPayload::Inline(Bytes::from(vec![0u8; 64])), None)
            .await;
        assert_eq!(
            verdict,
            FingerprintVerdict::ReviewRequired {
                failure: FingerprintFailure::PayloadTooLarge { size: 64, limit: 32 }
            }
        );
        assert!(client.seen.lock().unwrap().is_empty());
    }
}
