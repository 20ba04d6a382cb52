use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use upload_verifier::{
    build_router,
    config::{AppConfig, Args},
    db,
    models::{fingerprint::FingerprintFailure, upload::AudioPayload},
    services::{
        fingerprint_client::{CatalogMatch, FingerprintClient, Identification},
        registry_client::{RecordingRegistry, RegistryError, RegistryRecording},
    },
    state::{AppState, Collaborators},
};
use uuid::Uuid;

struct Catalog(Result<Identification, FingerprintFailure>);

#[async_trait]
impl FingerprintClient for Catalog {
    async fn identify(&self, _: &AudioPayload) -> Result<Identification, FingerprintFailure> {
        self.0.clone()
    }
}

struct Registry;

#[async_trait]
impl RecordingRegistry for Registry {
    async fn lookup_code(&self, code: &str) -> Result<Vec<RegistryRecording>, RegistryError> {
        if code == "GBUM71502800" {
            Ok(vec![RegistryRecording {
                id: "mbid-hello".into(),
                title: "Hello".into(),
                artist_credits: vec!["Adele".into()],
            }])
        } else {
            Err(RegistryError::NotFound(code.to_string()))
        }
    }
}

struct TestApp {
    router: Router,
    _dir: tempfile::TempDir,
}

async fn app(reply: Result<Identification, FingerprintFailure>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = AppConfig::from_args(Args {
        staging_dir: Some(dir.path().to_string_lossy().into_owned()),
        ..Args::default()
    })
    .unwrap();
    cfg.fingerprint.enabled = true;

    let db = Arc::new(db::memory_pool().await.unwrap());
    let fingerprint: Arc<dyn FingerprintClient> = Arc::new(Catalog(reply));
    let collaborators = Collaborators {
        fingerprint: Some(fingerprint),
        registry: Arc::new(Registry),
    };
    TestApp {
        router: build_router(AppState::new(&cfg, db, collaborators)),
        _dir: dir,
    }
}

fn hello() -> Result<Identification, FingerprintFailure> {
    Ok(Identification::Match(CatalogMatch {
        title: "Hello".into(),
        artist: "Adele".into(),
        code: Some("GBUM71502800".into()),
        ..CatalogMatch::default()
    }))
}

fn upload_body(code: Option<&str>, acks: Value) -> Value {
    json!({
        "metadata": {
            "title": "Hello",
            "declared_artist": "Adele",
            "ownership_code": code,
        },
        "file": {
            "file_name": "hello.mp3",
            "mime_type": "audio/mpeg",
            "size_bytes": 4 * 1024 * 1024,
            "duration_secs": 295.0
        },
        "audio_url": "https://cdn.example.com/hello.mp3",
        "acknowledgements": acks,
    })
}

async fn call(
    router: &Router,
    method: &str,
    uri: &str,
    user: Option<Uuid>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn probes_report_ok() {
    let app = app(hello()).await;
    let (status, body) = call(&app.router, "GET", "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = call(&app.router, "GET", "/readyz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["sqlite"]["ok"], true);
    assert_eq!(body["checks"]["staging_disk"]["ok"], true);
}

#[tokio::test]
async fn anonymous_callers_are_rejected() {
    let app = app(hello()).await;
    let (status, body) = call(
        &app.router,
        "POST",
        "/uploads/verify",
        None,
        Some(upload_body(None, json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTHENTICATION_REQUIRED");
}

#[tokio::test]
async fn validation_failures_list_every_violation() {
    let app = app(hello()).await;
    let mut body = upload_body(None, json!({}));
    body["metadata"]["title"] = json!("");
    body["file"]["mime_type"] = json!("video/mp4");

    let (status, report) = call(
        &app.router,
        "POST",
        "/uploads/validate",
        Some(Uuid::new_v4()),
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["valid"], false);
    assert_eq!(report["violations"].as_array().unwrap().len(), 2);

    let (status, err) = call(
        &app.router,
        "POST",
        "/uploads/verify",
        Some(Uuid::new_v4()),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["code"], "VALIDATION_ERROR");
    assert_eq!(err["details"]["violations"][0]["code"], "UNSUPPORTED_TYPE");
}

#[tokio::test]
async fn matching_code_is_allowed_and_counted() {
    let app = app(hello()).await;
    let user = Uuid::new_v4();

    let (status, outcome) = call(
        &app.router,
        "POST",
        "/uploads/verify",
        Some(user),
        Some(upload_body(Some("GB-UM7-15-02800"), json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["decision"]["decision"], "allow");
    assert_eq!(outcome["code_status"]["state"], "verified");

    let (_, history) = call(
        &app.router,
        "GET",
        &format!("/users/{}/history", user),
        Some(user),
        None,
    )
    .await;
    assert_eq!(history["total_uploads"], 1);
}

#[tokio::test]
async fn foreign_code_is_blocked() {
    let app = app(hello()).await;
    let (status, outcome) = call(
        &app.router,
        "POST",
        "/uploads/verify",
        Some(Uuid::new_v4()),
        Some(upload_body(Some("US-ABC-20-00001"), json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["decision"]["decision"], "block");
    assert_eq!(outcome["decision"]["reason"], "code_not_verified");
    assert_eq!(outcome["code_status"]["state"], "mismatched");
}

#[tokio::test]
async fn outage_is_flagged_and_reviewable() {
    let app = app(Err(FingerprintFailure::ServiceUnavailable(
        "connection refused".into(),
    )))
    .await;
    let user = Uuid::new_v4();
    let moderator = Uuid::new_v4();

    let (_, outcome) = call(
        &app.router,
        "POST",
        "/uploads/verify",
        Some(user),
        Some(upload_body(None, json!({}))),
    )
    .await;
    assert_eq!(outcome["decision"]["decision"], "allow_with_flag");
    assert_eq!(outcome["decision"]["reason"], "fingerprint_unavailable");
    let review_id = outcome["review_item_id"].as_str().unwrap().to_string();

    let (status, pending) = call(
        &app.router,
        "GET",
        "/review-queue?status=pending",
        Some(moderator),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let (status, claimed) = call(
        &app.router,
        "POST",
        "/review-queue/claim",
        Some(moderator),
        Some(json!({ "limit": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(claimed[0]["id"], review_id.as_str());
    assert_eq!(claimed[0]["claimed_by"], moderator.to_string());

    let (status, _) = call(
        &app.router,
        "POST",
        &format!("/review-queue/{}/ack", review_id),
        Some(Uuid::new_v4()),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, done) = call(
        &app.router,
        "POST",
        &format!("/review-queue/{}/ack", review_id),
        Some(moderator),
        Some(json!({ "resolution": "cleared" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "done");
}

#[tokio::test]
async fn third_strike_bans_the_account() {
    let app = app(hello()).await;
    let user = Uuid::new_v4();
    let moderator = Uuid::new_v4();

    for n in 1..=3 {
        let (status, outcome) = call(
            &app.router,
            "POST",
            &format!("/users/{}/strikes", user),
            Some(moderator),
            Some(json!({ "reason": "copyright claim upheld" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(outcome["history"]["prior_strikes"], n);
        assert_eq!(outcome["newly_banned"], n == 3);
    }

    let (_, strikes) = call(
        &app.router,
        "GET",
        &format!("/users/{}/strikes", user),
        Some(moderator),
        None,
    )
    .await;
    assert_eq!(strikes.as_array().unwrap().len(), 3);

    let (status, body) = call(
        &app.router,
        "POST",
        "/uploads/verify",
        Some(user),
        Some(upload_body(Some("GBUM71502800"), json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn interactive_attempt_flow() {
    let app = app(hello()).await;
    let user = Uuid::new_v4();

    let (status, opened) = call(
        &app.router,
        "POST",
        "/uploads/attempts",
        Some(user),
        Some(upload_body(None, json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(opened["verdict"]["status"], "matched");
    let id = opened["attempt"]["id"].as_str().unwrap().to_string();
    let code_uri = format!("/uploads/attempts/{}/ownership-code", id);

    let (status, pending) = call(
        &app.router,
        "PUT",
        &code_uri,
        Some(user),
        Some(json!({ "code": "gbum71502800" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(pending["status"]["state"], "pending");

    let (status, _) = call(&app.router, "GET", &code_uri, Some(Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, outcome) = call(
        &app.router,
        "POST",
        &format!("/uploads/attempts/{}/decision", id),
        Some(user),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["decision"]["decision"], "allow");

    let (status, _) = call(&app.router, "GET", &code_uri, Some(user), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

const BOUNDARY: &str = "verifier-boundary";

fn multipart_attempt(user: Uuid, fields: &[(&str, &str)], audio: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"audioFile\"; filename=\"demo.wav\"\r\nContent-Type: audio/wav\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(audio);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/uploads/attempts")
        .header("x-user-id", user.to_string())
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn multipart_attempt_reads_file_and_fields() {
    let app = app(Ok(Identification::NoMatch)).await;
    let user = Uuid::new_v4();
    let audio = vec![0u8; 1024 * 1024 + 16];
    let request = multipart_attempt(
        user,
        &[
            ("title", "Morning Demo"),
            ("declared_artist", "The Garage Band"),
            ("duration_secs", "61.5"),
        ],
        &audio,
    );
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let opened: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(opened["attempt"]["title"], "Morning Demo");
    assert_eq!(opened["attempt"]["file"]["mime_type"], "audio/wav");
    assert_eq!(opened["attempt"]["file"]["size_bytes"], audio.len());
    assert_eq!(opened["verdict"]["status"], "no_match");

    let id = opened["attempt"]["id"].as_str().unwrap().to_string();
    let (status, _) = call(
        &app.router,
        "DELETE",
        &format!("/uploads/attempts/{}", id),
        Some(user),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn multipart_duration_must_be_finite() {
    let app = app(Ok(Identification::NoMatch)).await;
    let audio = vec![0u8; 1024 * 1024 + 16];
    let request = multipart_attempt(
        Uuid::new_v4(),
        &[
            ("title", "Morning Demo"),
            ("declared_artist", "The Garage Band"),
            ("duration_secs", "NaN"),
        ],
        &audio,
    );
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn inline_audio_is_measured_not_trusted() {
    let app = app(hello()).await;
    let mut body = upload_body(Some("GBUM71502800"), json!({}));
    body["file_data"] = json!("SUQz");

    let (status, error) = call(&app.router, "POST", "/uploads/verify", Some(Uuid::new_v4()), Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["details"]["violations"][0]["code"], "FILE_TOO_SMALL");
}

#[tokio::test]
async fn unmatched_upload_on_a_major_label_is_held_for_review() {
    let app = app(Ok(Identification::NoMatch)).await;
    let user = Uuid::new_v4();
    let mut body = upload_body(None, json!({ "original_confirmed": true }));
    body["metadata"]["title"] = json!("Morning Demo");
    body["metadata"]["declared_artist"] = json!("The Garage Band");
    body["metadata"]["record_label"] = json!("Universal Music Group");

    let (status, outcome) = call(&app.router, "POST", "/uploads/verify", Some(user), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["decision"]["decision"], "block");
    assert_eq!(outcome["decision"]["reason"], "major_rights_holder");
    assert_eq!(outcome["metadata_screen"]["major_label"], "universal");
    assert!(outcome["review_item_id"].is_string());
    assert_eq!(outcome["history"]["total_uploads"], 0);
}

#[tokio::test]
async fn takedown_strikes_and_reports_queue() {
    let app = app(hello()).await;
    let uploader = Uuid::new_v4();
    let content = Uuid::new_v4();

    let (status, outcome) = call(
        &app.router,
        "POST",
        "/takedowns",
        Some(Uuid::new_v4()),
        Some(json!({
            "user_id": uploader,
            "content_id": content,
            "claimant": "Label Rights LLC",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(outcome["strike"]["history"]["prior_strikes"], 1);
    assert_eq!(outcome["review_item"]["priority"], "urgent");

    let (status, item) = call(
        &app.router,
        "POST",
        "/reports",
        Some(Uuid::new_v4()),
        Some(json!({ "content_id": content, "category": "copyright" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(item["priority"], "high");

    let (status, _) = call(
        &app.router,
        "POST",
        "/takedowns",
        Some(Uuid::new_v4()),
        Some(json!({ "user_id": uploader, "content_id": content, "claimant": " " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn recording_lookup_and_staging_misses() {
    let app = app(hello()).await;
    let user = Some(Uuid::new_v4());

    let (status, recordings) =
        call(&app.router, "GET", "/recordings/GB-UM7-15-02800", user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recordings[0]["title"], "Hello");

    let (status, _) = call(&app.router, "GET", "/recordings/USABC2000001", user, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app.router, "GET", "/recordings/ABCDE12345", user, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app.router,
        "GET",
        "/staging/fingerprint-temp/missing",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
