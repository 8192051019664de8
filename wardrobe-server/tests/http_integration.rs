//! HTTP integration tests for the wardrobe relay.
//!
//! Every test drives the full router with `oneshot` against a temporary
//! upload directory. The agent is replaced by in-process stubs, except for
//! the last test which launches a real `sh` child process.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use wardrobe_core::{
    AgentBackend, AgentError, FileIntake, IntakePolicy, SuggestionRequest, SuggestionResponse,
    UrlMaterializer, WardrobeConfig,
};
use wardrobe_server::http::{build_router, HttpState};
use wardrobe_server::pipeline::Pipeline;

const BOUNDARY: &str = "wardrobe-test-boundary";
const BASE_URL: &str = "http://localhost:8000";

// ===========================================================================
// Stub agents
// ===========================================================================

/// Records every request and answers with a fixed result.
struct RecordingAgent {
    result: Value,
    seen: Mutex<Vec<SuggestionRequest>>,
}

impl RecordingAgent {
    fn new(result: Value) -> Arc<Self> {
        Arc::new(Self {
            result,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<SuggestionRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentBackend for RecordingAgent {
    async fn invoke(&self, request: &SuggestionRequest) -> Result<SuggestionResponse, AgentError> {
        self.seen.lock().unwrap().push(request.clone());
        Ok(SuggestionResponse(self.result.clone()))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Always fails the way a crashed agent process does.
struct CrashingAgent;

#[async_trait]
impl AgentBackend for CrashingAgent {
    async fn invoke(&self, _: &SuggestionRequest) -> Result<SuggestionResponse, AgentError> {
        Err(AgentError::Exited {
            status: "exit status: 1".to_string(),
            diagnostics: "Traceback (most recent call last):\nValueError: bad image".to_string(),
        })
    }

    fn name(&self) -> &str {
        "crashing"
    }
}

// ===========================================================================
// Helpers
// ===========================================================================

fn test_config(root: &Path) -> WardrobeConfig {
    let mut config = WardrobeConfig::default();
    config.storage.upload_dir = root.display().to_string();
    config.storage.max_file_size = 64 * 1024;
    config.storage.max_files = 3;
    config.http.public_base_url = Some(BASE_URL.to_string());
    config
}

fn make_app(root: &Path, agent: Arc<dyn AgentBackend>) -> axum::Router {
    make_app_with(test_config(root), agent)
}

fn make_app_with(config: WardrobeConfig, agent: Arc<dyn AgentBackend>) -> axum::Router {
    let root = config.storage.upload_path();
    let pipeline = Pipeline::new(
        FileIntake::new(&root, IntakePolicy::from(&config.storage)),
        UrlMaterializer::new(&root, &config.http.base_url(), &config.storage.route_prefix()),
        agent,
        config.storage.cleanup_on_failure,
    );
    build_router(Arc::new(HttpState { pipeline, config }))
}

enum Part<'a> {
    File {
        name: &'a str,
        filename: &'a str,
        content_type: Option<&'a str>,
        data: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

fn image<'a>(filename: &'a str, content_type: &'a str, data: &'a [u8]) -> Part<'a> {
    Part::File {
        name: "images",
        filename,
        content_type: Some(content_type),
        data,
    }
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File {
                name,
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                if let Some(ct) = content_type {
                    body.extend_from_slice(format!("Content-Type: {}\r\n", ct).as_bytes());
                }
                body.extend_from_slice(b"\r\n");
                body.extend_from_slice(data);
                body.extend_from_slice(b"\r\n");
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/outfits/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn stored_files(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// ===========================================================================
// TEST 1: GET /api/health via oneshot
// ===========================================================================
#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = make_app(dir.path(), RecordingAgent::new(json!([])));

    let req = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

// ===========================================================================
// TEST 2: upload two images with a prompt: files stored, URLs forwarded
// ===========================================================================
#[tokio::test]
async fn test_upload_two_images_with_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let agent = RecordingAgent::new(json!([{"suggestions": {"outfit_description": "party look"}}]));
    let app = make_app(dir.path(), agent.clone());

    let req = upload_request(&[
        image("shirt.jpg", "image/jpeg", b"jpeg-bytes"),
        image("pants.png", "image/png", b"png-bytes"),
        Part::Text {
            name: "prompt",
            value: "birthday party",
        },
    ]);
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);

    assert_eq!(body["message"], "Images processed successfully");
    assert_eq!(body["count"], 2);
    assert_eq!(
        body["suggestions"][0]["suggestions"]["outfit_description"],
        "party look"
    );

    let files: Vec<String> = body["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f.as_str().unwrap().to_string())
        .collect();
    assert_eq!(files.len(), 2);
    assert!(files[0].starts_with("http://localhost:8000/uploads/"));
    assert!(files[0].ends_with(".jpg"));
    assert!(files[1].ends_with(".png"));
    assert_ne!(files[0], files[1]);

    // Each URL names a file that exists on disk with the uploaded bytes
    let on_disk = stored_files(dir.path());
    assert_eq!(on_disk.len(), 2);
    for url in &files {
        let name = url.rsplit('/').next().unwrap();
        assert!(on_disk.contains(&name.to_string()), "{} not stored", name);
    }

    // Exactly one agent call, carrying the same URLs and the prompt
    let requests = agent.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].images, files);
    assert_eq!(requests[0].preferences.prompt, "birthday party");
    assert_eq!(requests[0].preferences.images.as_ref(), Some(&files));
}

// ===========================================================================
// TEST 3: stored asset is retrievable through the static route
// ===========================================================================
#[tokio::test]
async fn test_uploaded_file_served_from_static_route() {
    let dir = tempfile::tempdir().unwrap();
    let app = make_app(dir.path(), RecordingAgent::new(json!([])));

    let (status, body) = send(
        &app,
        upload_request(&[image("coat.webp", "image/webp", b"webp-payload")]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let url = body["files"][0].as_str().unwrap();
    let path = url.strip_prefix(BASE_URL).unwrap();
    assert!(path.starts_with("/uploads/"));

    let resp = app
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"webp-payload");
}

// ===========================================================================
// TEST 4: missing prompt field is forwarded as empty string
// ===========================================================================
#[tokio::test]
async fn test_upload_without_prompt_sends_empty_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let agent = RecordingAgent::new(json!({"ok": true}));
    let app = make_app(dir.path(), agent.clone());

    let (status, body) = send(
        &app,
        upload_request(&[image("hat.jpg", "image/jpeg", b"hat")]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["suggestions"], json!({"ok": true}));
    assert_eq!(agent.requests()[0].preferences.prompt, "");
}

// ===========================================================================
// TEST 5: upload with no images: 400, agent never called
// ===========================================================================
#[tokio::test]
async fn test_upload_without_files_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let agent = RecordingAgent::new(json!([]));
    let app = make_app(dir.path(), agent.clone());

    let (status, body) = send(
        &app,
        upload_request(&[Part::Text {
            name: "prompt",
            value: "casual",
        }]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No files uploaded");
    assert!(agent.requests().is_empty());
}

// ===========================================================================
// TEST 6: disallowed type: 400, nothing stored, agent never called
// ===========================================================================
#[tokio::test]
async fn test_upload_rejects_disallowed_type() {
    let dir = tempfile::tempdir().unwrap();
    let agent = RecordingAgent::new(json!([]));
    let app = make_app(dir.path(), agent.clone());

    let (status, body) = send(
        &app,
        upload_request(&[
            image("ok.jpg", "image/jpeg", b"fine"),
            image("notes.txt", "text/plain", b"not an image"),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid file type: text/plain"));
    assert!(agent.requests().is_empty());
    assert!(stored_files(dir.path()).is_empty(), "partial batch must be removed");
}

// ===========================================================================
// TEST 7: oversized file: 413, partial file removed
// ===========================================================================
#[tokio::test]
async fn test_upload_rejects_oversized_file() {
    let dir = tempfile::tempdir().unwrap();
    let agent = RecordingAgent::new(json!([]));
    let app = make_app(dir.path(), agent.clone());

    let big = vec![0u8; 64 * 1024 + 1];
    let (status, body) = send(
        &app,
        upload_request(&[image("huge.jpg", "image/jpeg", &big)]),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].as_str().unwrap().contains("huge.jpg"));
    assert!(agent.requests().is_empty());
    assert!(stored_files(dir.path()).is_empty());
}

// ===========================================================================
// TEST 8: too many files: 400
// ===========================================================================
#[tokio::test]
async fn test_upload_rejects_too_many_files() {
    let dir = tempfile::tempdir().unwrap();
    let agent = RecordingAgent::new(json!([]));
    let app = make_app(dir.path(), agent.clone());

    let parts: Vec<Part<'_>> = (0..4)
        .map(|_| image("item.jpg", "image/jpeg", b"x"))
        .collect();
    let (status, _) = send(&app, upload_request(&parts)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(agent.requests().is_empty());
    assert!(stored_files(dir.path()).is_empty());
}

// ===========================================================================
// TEST 9: missing part type is treated as octet-stream and accepted
// ===========================================================================
#[tokio::test]
async fn test_upload_without_content_type_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let app = make_app(dir.path(), RecordingAgent::new(json!([])));

    let (status, body) = send(
        &app,
        upload_request(&[Part::File {
            name: "images",
            filename: "camera.jpg",
            content_type: None,
            data: b"raw",
        }]),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["count"], 1);
}

// ===========================================================================
// TEST 10: agent failure: 500 with diagnostics, uploads cleaned up
// ===========================================================================
#[tokio::test]
async fn test_agent_failure_returns_500_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let app = make_app(dir.path(), Arc::new(CrashingAgent));

    let (status, body) = send(
        &app,
        upload_request(&[image("shirt.jpg", "image/jpeg", b"jpeg")]),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
    assert!(body["details"]
        .as_str()
        .unwrap()
        .contains("ValueError: bad image"));
    assert!(stored_files(dir.path()).is_empty());
}

// ===========================================================================
// TEST 11: agent failure with cleanup disabled keeps the files
// ===========================================================================
#[tokio::test]
async fn test_agent_failure_keeps_files_when_cleanup_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.storage.cleanup_on_failure = false;
    let app = make_app_with(config, Arc::new(CrashingAgent));

    let (status, _) = send(
        &app,
        upload_request(&[image("shirt.jpg", "image/jpeg", b"jpeg")]),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(stored_files(dir.path()).len(), 1);
}

// ===========================================================================
// TEST 12: GET /api/outfits/suggestions: prompt forwarded, no images
// ===========================================================================
#[tokio::test]
async fn test_prompt_only_suggestions() {
    let dir = tempfile::tempdir().unwrap();
    let agent = RecordingAgent::new(json!([{"suggestions": {"outfit_description": "smart casual"}}]));
    let app = make_app(dir.path(), agent.clone());

    let req = Request::builder()
        .uri("/api/outfits/suggestions?prompt=job%20interview")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["suggestions"][0]["suggestions"]["outfit_description"],
        "smart casual"
    );

    let requests = agent.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].images.is_empty());
    assert_eq!(requests[0].preferences.prompt, "job interview");
    assert!(requests[0].preferences.images.is_none());
}

// ===========================================================================
// TEST 13: GET /api/outfits/suggestions without prompt: 400
// ===========================================================================
#[tokio::test]
async fn test_prompt_only_requires_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let agent = RecordingAgent::new(json!([]));
    let app = make_app(dir.path(), agent.clone());

    let req = Request::builder()
        .uri("/api/outfits/suggestions")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No prompt provided");
    assert!(agent.requests().is_empty());
}

// ===========================================================================
// TEST 14: cross-origin policy: allowed origin gets CORS header, others 403
// ===========================================================================
#[tokio::test]
async fn test_origin_policy() {
    let dir = tempfile::tempdir().unwrap();
    let app = make_app(dir.path(), RecordingAgent::new(json!([])));

    let allowed = Request::builder()
        .uri("/api/health")
        .header("origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(allowed).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:3000")
    );

    let denied = Request::builder()
        .uri("/api/health")
        .header("origin", "https://evil.example.com")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, denied).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("evil.example.com"));

    let allowed_preflight = Request::builder()
        .method("OPTIONS")
        .uri("/api/outfits/upload")
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(allowed_preflight).await.unwrap();
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:3000")
    );

    let denied_preflight = Request::builder()
        .method("OPTIONS")
        .uri("/api/outfits/upload")
        .header("origin", "https://evil.example.com")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(denied_preflight).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(resp.headers().get("access-control-allow-origin").is_none());
}

// ===========================================================================
// TEST 15: end to end with a real child process as the agent
// ===========================================================================
#[cfg(unix)]
#[tokio::test]
async fn test_upload_through_subprocess_agent() {
    use std::time::Duration;
    use wardrobe_core::SubprocessAgent;

    let dir = tempfile::tempdir().unwrap();
    // Diagnostic noise first, then echo the request back as the result
    let agent = SubprocessAgent::new(
        "sh",
        vec![
            "-c".to_string(),
            r#"echo "Loading classifier..."; echo "warming up" >&2; printf '%s\n' "$1""#
                .to_string(),
            "agent".to_string(),
        ],
        None,
        Duration::from_secs(10),
    );
    let app = make_app(dir.path(), Arc::new(agent));

    let (status, body) = send(
        &app,
        upload_request(&[
            image("shirt.jpg", "image/jpeg", b"jpeg"),
            Part::Text {
                name: "prompt",
                value: "beach day",
            },
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["suggestions"]["images"], body["files"]);
    assert_eq!(body["suggestions"]["preferences"]["prompt"], "beach day");
}

// ===========================================================================
// TEST 16: a body that is not multipart gets the JSON "no files" error
// ===========================================================================
#[tokio::test]
async fn test_non_multipart_upload_is_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let agent = RecordingAgent::new(json!([]));
    let app = make_app(dir.path(), agent.clone());

    let bare = Request::builder()
        .method("POST")
        .uri("/api/outfits/upload")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, bare).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "No files uploaded"}));

    let as_json = Request::builder()
        .method("POST")
        .uri("/api/outfits/upload")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"images": []}"#))
        .unwrap();
    let (status, body) = send(&app, as_json).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "No files uploaded"}));

    assert!(agent.requests().is_empty());
    assert!(stored_files(dir.path()).is_empty());
}
