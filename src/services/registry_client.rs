//! Public recording registry (MusicBrainz) lookups by recording code.
//!
//! MusicBrainz asks anonymous clients to stay at one request per second and
//! to send a descriptive user agent; both are enforced here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

pub const DEFAULT_REGISTRY_URL: &str = "https://musicbrainz.org";
pub const DEFAULT_USER_AGENT: &str = concat!(
    "upload-verifier/",
    env!("CARGO_PKG_VERSION"),
    " ( rights-team@localhost )"
);
const RATE_LIMIT: Duration = Duration::from_millis(1000);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("recording registry timed out")]
    Timeout,
    #[error("recording registry unavailable: {0}")]
    Unavailable(String),
    #[error("no recording registered under `{0}`")]
    NotFound(String),
    #[error("unreadable registry response: {0}")]
    Parse(String),
}

/// A recording as listed by the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryRecording {
    pub id: String,
    pub title: String,
    pub artist_credits: Vec<String>,
}

/// Seam over the registry so verification can be exercised offline.
#[async_trait]
pub trait RecordingRegistry: Send + Sync {
    /// Recordings registered under a normalized code. `NotFound` when none.
    async fn lookup_code(&self, code: &str) -> Result<Vec<RegistryRecording>, RegistryError>;
}

#[derive(Debug, Deserialize)]
struct IsrcResponse {
    #[serde(default)]
    recordings: Vec<MbRecording>,
}

#[derive(Debug, Deserialize)]
struct MbRecording {
    id: String,
    title: String,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
}

#[derive(Debug, Deserialize)]
struct MbArtistCredit {
    name: String,
}

impl From<MbRecording> for RegistryRecording {
    fn from(recording: MbRecording) -> Self {
        Self {
            id: recording.id,
            title: recording.title,
            artist_credits: recording
                .artist_credit
                .into_iter()
                .map(|credit| credit.name)
                .collect(),
        }
    }
}

/// Spaces consecutive requests at least `min_interval` apart.
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                debug!("registry rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

pub struct MusicBrainzRegistry {
    http_client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter>,
}

impl MusicBrainzRegistry {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        Self::with_rate_limit(base_url, timeout, RATE_LIMIT)
    }

    pub fn with_rate_limit(
        base_url: &str,
        timeout: Duration,
        min_interval: Duration,
    ) -> Result<Self, RegistryError> {
        let http_client = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::new(min_interval)),
        })
    }
}

#[async_trait]
impl RecordingRegistry for MusicBrainzRegistry {
    async fn lookup_code(&self, code: &str) -> Result<Vec<RegistryRecording>, RegistryError> {
        self.rate_limiter.wait().await;

        let url = format!(
            "{}/ws/2/isrc/{}?inc=artist-credits&fmt=json",
            self.base_url, code
        );
        debug!(code, url = %url, "querying recording registry");

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                RegistryError::Timeout
            } else {
                RegistryError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(code.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Unavailable(format!(
                "status {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let parsed: IsrcResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Parse(e.to_string()))?;

        if parsed.recordings.is_empty() {
            return Err(RegistryError::NotFound(code.to_string()));
        }
        Ok(parsed.recordings.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn registry(url: &str) -> MusicBrainzRegistry {
        MusicBrainzRegistry::with_rate_limit(url, Duration::from_secs(5), Duration::ZERO).unwrap()
    }

    #[tokio::test]
    async fn returns_registered_recordings() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ws/2/isrc/GBUM71502800")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("inc".into(), "artist-credits".into()),
                Matcher::UrlEncoded("fmt".into(), "json".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "isrc": "GBUM71502800",
                    "recordings": [{
                        "id": "0b1a7c32-62c4-4b7f-a2d7-7b1b2a2e8d11",
                        "title": "Hello",
                        "length": 295000,
                        "artist-credit": [{"name": "Adele", "joinphrase": ""}]
                    }]
                }"#,
            )
            .create_async()
            .await;

        let recordings = registry(&server.url())
            .lookup_code("GBUM71502800")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(recordings.len(), 1);
        assert_eq!(recordings[0].title, "Hello");
        assert_eq!(recordings[0].artist_credits, vec!["Adele".to_string()]);
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ws/2/isrc/USABC2000001")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"error": "Not Found"}"#)
            .create_async()
            .await;

        let result = registry(&server.url()).lookup_code("USABC2000001").await;
        assert!(matches!(result, Err(RegistryError::NotFound(code)) if code == "USABC2000001"));
    }

    #[tokio::test]
    async fn server_errors_are_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ws/2/isrc/GBUM71502800")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let result = registry(&server.url()).lookup_code("GBUM71502800").await;
        assert!(matches!(result, Err(RegistryError::Unavailable(_))));
    }

    #[tokio::test]
    async fn empty_recording_list_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ws/2/isrc/GBUM71502800")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"isrc": "GBUM71502800", "recordings": []}"#)
            .create_async()
            .await;

        let result = registry(&server.url()).lookup_code("GBUM71502800").await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
