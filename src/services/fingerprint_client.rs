//! HTTP client for the audio fingerprint identification service.
//!
//! Requests are signed with HMAC-SHA1 over
//! `method \n uri \n access_key \n data_type \n signature_version \n timestamp`
//! and the base64 digest is sent alongside the sample.

use crate::models::{fingerprint::FingerprintFailure, upload::AudioPayload};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{StatusCode, multipart};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::time::Duration;
use tracing::{debug, warn};

type HmacSha1 = Hmac<Sha1>;

const IDENTIFY_URI: &str = "/v1/identify";
const DATA_TYPE: &str = "audio";
const SIGNATURE_VERSION: &str = "1";

/// Catalog status codes that mean "looked, found nothing".
const NO_RESULT_CODES: [i64; 3] = [1001, 3001, 3003];
/// The service could not extract a fingerprint from the sample.
const UNREADABLE_SAMPLE_CODE: i64 = 2004;

/// The catalog entry an identification resolved to.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CatalogMatch {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub label: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Identification {
    Match(CatalogMatch),
    NoMatch,
}

/// Seam over the fingerprint service so the lookup policy can run offline.
#[async_trait]
pub trait FingerprintClient: Send + Sync {
    async fn identify(&self, payload: &AudioPayload) -> Result<Identification, FingerprintFailure>;
}

#[derive(Debug, Deserialize)]
struct IdentifyResponse {
    status: ResponseStatus,
    metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseStatus {
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    music: Vec<MusicEntry>,
}

#[derive(Debug, Deserialize)]
struct MusicEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    artists: Vec<Named>,
    album: Option<Named>,
    label: Option<String>,
    external_ids: Option<ExternalIds>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    isrc: Option<String>,
}

impl From<MusicEntry> for CatalogMatch {
    fn from(entry: MusicEntry) -> Self {
        Self {
            title: entry.title,
            artist: entry
                .artists
                .into_iter()
                .next()
                .map(|a| a.name)
                .unwrap_or_default(),
            album: entry.album.map(|a| a.name),
            label: entry.label,
            code: entry.external_ids.and_then(|ids| ids.isrc),
        }
    }
}

#[derive(Serialize)]
struct UrlIdentifyRequest<'a> {
    audio_url: &'a str,
    access_key: &'a str,
    data_type: &'a str,
    signature_version: &'a str,
    timestamp: String,
    signature: String,
}

/// Connection settings for [`HttpFingerprintClient`].
#[derive(Debug, Clone)]
pub struct FingerprintEndpoint {
    pub base_url: String,
    pub access_key: String,
    pub access_secret: String,
    pub timeout: Duration,
}

pub struct HttpFingerprintClient {
    http_client: reqwest::Client,
    endpoint: FingerprintEndpoint,
}

impl HttpFingerprintClient {
    pub fn new(endpoint: FingerprintEndpoint) -> Result<Self, FingerprintFailure> {
        if endpoint.access_key.is_empty() || endpoint.access_secret.is_empty() {
            return Err(FingerprintFailure::ServiceUnavailable(
                "fingerprint credentials not configured".into(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .map_err(|e| FingerprintFailure::ServiceUnavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: FingerprintEndpoint {
                base_url: endpoint.base_url.trim_end_matches('/').to_string(),
                ..endpoint
            },
        })
    }

    fn url(&self) -> String {
        format!("{}{}", self.endpoint.base_url, IDENTIFY_URI)
    }

    async fn send_sample(&self, sample: Vec<u8>) -> Result<reqwest::Response, reqwest::Error> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign(
            &self.endpoint.access_key,
            &self.endpoint.access_secret,
            &timestamp,
        );
        let sample_bytes = sample.len().to_string();

        let form = multipart::Form::new()
            .part(
                "sample",
                multipart::Part::bytes(sample).file_name("sample.bin"),
            )
            .text("sample_bytes", sample_bytes)
            .text("access_key", self.endpoint.access_key.clone())
            .text("data_type", DATA_TYPE)
            .text("signature_version", SIGNATURE_VERSION)
            .text("timestamp", timestamp)
            .text("signature", signature);

        self.http_client.post(self.url()).multipart(form).send().await
    }

    async fn send_url(&self, audio_url: &str) -> Result<reqwest::Response, reqwest::Error> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign(
            &self.endpoint.access_key,
            &self.endpoint.access_secret,
            &timestamp,
        );
        let body = UrlIdentifyRequest {
            audio_url,
            access_key: &self.endpoint.access_key,
            data_type: DATA_TYPE,
            signature_version: SIGNATURE_VERSION,
            timestamp,
            signature,
        };

        self.http_client.post(self.url()).json(&body).send().await
    }
}

#[async_trait]
impl FingerprintClient for HttpFingerprintClient {
    async fn identify(&self, payload: &AudioPayload) -> Result<Identification, FingerprintFailure> {
        if payload.is_empty() {
            return Err(FingerprintFailure::InvalidPayload("empty audio sample".into()));
        }

        let sent = match payload {
            AudioPayload::Inline(bytes) => {
                debug!(bytes = bytes.len(), "identifying inline sample");
                self.send_sample(bytes.to_vec()).await
            }
            AudioPayload::Url(url) => {
                debug!(url = %url, "identifying sample by url");
                self.send_url(url).await
            }
        };

        let response = sent.map_err(|e| {
            if e.is_timeout() {
                FingerprintFailure::Timeout
            } else {
                FingerprintFailure::ServiceUnavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
            warn!(status = status.as_u16(), "fingerprint quota exceeded");
            return Err(FingerprintFailure::QuotaExceeded);
        }
        if !status.is_success() {
            return Err(FingerprintFailure::ServiceUnavailable(format!(
                "identify returned status {}",
                status.as_u16()
            )));
        }

        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FingerprintFailure::Timeout
            } else {
                FingerprintFailure::ServiceUnavailable(e.to_string())
            }
        })?;
        if text.trim().is_empty() {
            return Err(FingerprintFailure::ServiceUnavailable(
                "empty identify response".into(),
            ));
        }

        let parsed: IdentifyResponse = serde_json::from_str(&text).map_err(|e| {
            FingerprintFailure::ServiceUnavailable(format!("invalid identify response: {}", e))
        })?;
        interpret(parsed)
    }
}

fn interpret(response: IdentifyResponse) -> Result<Identification, FingerprintFailure> {
    match response.status.code {
        0 => {
            let first = response
                .metadata
                .and_then(|m| m.music.into_iter().next());
            Ok(first.map_or(Identification::NoMatch, |entry| {
                Identification::Match(entry.into())
            }))
        }
        code if NO_RESULT_CODES.contains(&code) => Ok(Identification::NoMatch),
        UNREADABLE_SAMPLE_CODE => Err(FingerprintFailure::InvalidPayload(response.status.msg)),
        code => Err(FingerprintFailure::ServiceUnavailable(format!(
            "identify failed with code {}: {}",
            code, response.status.msg
        ))),
    }
}

/// Base64 HMAC-SHA1 signature for an identify request.
pub fn sign(access_key: &str, access_secret: &str, timestamp: &str) -> String {
    let string_to_sign = format!(
        "POST\n{}\n{}\n{}\n{}\n{}",
        IDENTIFY_URI, access_key, DATA_TYPE, SIGNATURE_VERSION, timestamp
    );
    let mut mac = match HmacSha1::new_from_slice(access_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(string_to_sign.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use mockito::Matcher;

    fn client(url: &str) -> HttpFingerprintClient {
        HttpFingerprintClient::new(FingerprintEndpoint {
            base_url: url.to_string(),
            access_key: "test-key".into(),
            access_secret: "test-secret".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn sample() -> AudioPayload {
        AudioPayload::Inline(Bytes::from_static(b"ID3\x03\x00fake-mp3-frames"))
    }

    #[test]
    fn signature_is_stable_base64() {
        let a = sign("key", "secret", "1700000000");
        let b = sign("key", "secret", "1700000000");
        assert_eq!(a, b);
        // sha1 digests are 20 bytes -> 28 base64 chars
        assert_eq!(a.len(), 28);
        assert_ne!(a, sign("key", "secret", "1700000001"));
    }

    #[test]
    fn missing_credentials_are_refused() {
        let result = HttpFingerprintClient::new(FingerprintEndpoint {
            base_url: "http://localhost".into(),
            access_key: String::new(),
            access_secret: String::new(),
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(FingerprintFailure::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn parses_a_catalog_match() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/identify")
            .match_header(
                "content-type",
                Matcher::Regex("multipart/form-data".into()),
            )
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "status": {"code": 0, "msg": "Success"},
                    "metadata": {"music": [{
                        "title": "Hello",
                        "artists": [{"name": "Adele"}],
                        "album": {"name": "25"},
                        "label": "XL Recordings",
                        "external_ids": {"isrc": "GBBKS1500214"}
                    }]}
                }"#,
            )
            .create_async()
            .await;

        let result = client(&server.url()).identify(&sample()).await.unwrap();
        mock.assert_async().await;
        assert_eq!(
            result,
            Identification::Match(CatalogMatch {
                title: "Hello".into(),
                artist: "Adele".into(),
                album: Some("25".into()),
                label: Some("XL Recordings".into()),
                code: Some("GBBKS1500214".into()),
            })
        );
    }

    #[tokio::test]
    async fn no_result_codes_mean_no_match() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/identify")
            .with_status(200)
            .with_body(r#"{"status": {"code": 1001, "msg": "No result"}}"#)
            .create_async()
            .await;

        let result = client(&server.url()).identify(&sample()).await.unwrap();
        assert_eq!(result, Identification::NoMatch);
    }

    #[tokio::test]
    async fn url_payload_is_sent_as_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/identify")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "audio_url": "http://verifier.local/staging/fingerprint-temp/abc",
                "access_key": "test-key",
                "data_type": "audio"
            })))
            .with_status(200)
            .with_body(r#"{"status": {"code": 0}, "metadata": {"music": []}}"#)
            .create_async()
            .await;

        let payload =
            AudioPayload::Url("http://verifier.local/staging/fingerprint-temp/abc".into());
        let result = client(&server.url()).identify(&payload).await.unwrap();
        mock.assert_async().await;
        assert_eq!(result, Identification::NoMatch);
    }

    #[tokio::test]
    async fn rate_limit_statuses_are_quota_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/identify")
            .with_status(429)
            .create_async()
            .await;

        let result = client(&server.url()).identify(&sample()).await;
        assert_eq!(result, Err(FingerprintFailure::QuotaExceeded));
    }

    #[tokio::test]
    async fn server_errors_and_garbage_are_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/identify")
            .with_status(502)
            .create_async()
            .await;
        let result = client(&server.url()).identify(&sample()).await;
        assert!(matches!(result, Err(FingerprintFailure::ServiceUnavailable(_))));

        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/identify")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;
        let result = client(&server.url()).identify(&sample()).await;
        assert!(matches!(result, Err(FingerprintFailure::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn empty_sample_is_rejected_locally() {
        let result = client("http://127.0.0.1:9")
            .identify(&AudioPayload::Inline(Bytes::new()))
            .await;
        assert!(matches!(result, Err(FingerprintFailure::InvalidPayload(_))));
    }
}
