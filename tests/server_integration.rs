//! HTTP router tests, driven in-process with `tower::ServiceExt::oneshot`.

mod support;

use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use mdpack_core::job::SizeLimits;
use mdpack_core::server::{self, AppState};
use serde_json::Value;
use support::fixtures::{offline_registry, read_zip, runner, text_of};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "mdpack-test-boundary";

struct Part<'a> {
    name: &'a str,
    file_name: Option<&'a str>,
    content_type: Option<&'a str>,
    data: &'a [u8],
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = match part.file_name {
            Some(file) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{file}\"\r\n",
                part.name
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name),
        };
        body.extend_from_slice(disposition.as_bytes());
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn app(storage: &TempDir) -> Router {
    let runner = runner(storage.path(), offline_registry(), SizeLimits::default());
    server::router(AppState::new(runner, 50 * 1024 * 1024))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>, header::HeaderMap) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec(), headers)
}

async fn json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body, _) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn poll_until_done(app: &Router, job_id: &str) -> Value {
    for _ in 0..300 {
        let request = Request::get(format!("/job/{job_id}/status"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = json(app, request).await;
        assert_eq!(status, StatusCode::OK);
        if matches!(body["status"].as_str(), Some("completed" | "failed")) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never finished");
}

#[tokio::test]
async fn test_health() {
    let storage = TempDir::new().unwrap();
    let app = app(&storage);
    let (status, body) = json(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_file_upload_to_download() {
    let storage = TempDir::new().unwrap();
    let app = app(&storage);

    let request = multipart_request(
        "/document/file",
        &[Part {
            name: "file",
            file_name: Some("notes.txt"),
            content_type: Some("text/plain"),
            data: b"Remember the milk.",
        }],
    );
    let (status, accepted) = json(&app, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = accepted["jobId"].as_str().unwrap().to_string();
    assert!(accepted["statusUrl"].as_str().unwrap().ends_with(&format!("/job/{job_id}/status")));

    let done = poll_until_done(&app, &job_id).await;
    assert_eq!(done["status"], "completed", "{done}");
    assert_eq!(done["progress"], 100);
    let download_url = done["downloadUrl"].as_str().unwrap();
    let path = download_url.trim_start_matches("http://mdpack.test");
    assert_eq!(path, format!("/download/{job_id}/notes.zip"));

    let (status, body, headers) =
        send(&app, Request::get(path).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    assert!(
        headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment; filename=\"notes.zip\"")
    );
    let entries = read_zip(&body);
    assert!(text_of(&entries, "documents/notes.md").contains("Remember the milk."));
    assert!(text_of(&entries, "summary.md").contains("1 successful, 0 failed"));

    let delete = Request::delete(format!("/job/{job_id}")).body(Body::empty()).unwrap();
    let (status, body) = json(&app, delete).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "evicted");

    let (status, _, _) = send(&app, Request::get(path).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_batch_with_files_and_failed_item() {
    let storage = TempDir::new().unwrap();
    let app = app(&storage);

    let request = multipart_request(
        "/batch",
        &[
            Part {
                name: "files",
                file_name: Some("one.txt"),
                content_type: None,
                data: b"first",
            },
            Part {
                name: "files",
                file_name: Some("two.doc"),
                content_type: None,
                data: b"legacy word",
            },
        ],
    );
    let (status, accepted) = json(&app, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let done = poll_until_done(&app, accepted["jobId"].as_str().unwrap()).await;
    assert_eq!(done["status"], "completed", "{done}");

    let path = done["downloadUrl"]
        .as_str()
        .unwrap()
        .trim_start_matches("http://mdpack.test")
        .to_string();
    assert!(path.contains("/batch_"));
    let (_, body, _) = send(&app, Request::get(path).body(Body::empty()).unwrap()).await;
    let entries = read_zip(&body);
    assert!(entries.contains_key("documents/one.md"));
    assert!(entries.contains_key("errors/two_error.md"));
    assert!(text_of(&entries, "summary.md").contains("1 successful, 1 failed"));
}

#[tokio::test]
async fn test_audio_without_key_is_unauthorized() {
    let storage = TempDir::new().unwrap();
    let app = app(&storage);
    let request = multipart_request(
        "/multimedia/audio",
        &[Part {
            name: "file",
            file_name: Some("talk.mp3"),
            content_type: Some("audio/mpeg"),
            data: b"ID3",
        }],
    );
    let (status, body) = json(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "authentication");
}

#[tokio::test]
async fn test_upload_without_file_part_is_rejected() {
    let storage = TempDir::new().unwrap();
    let app = app(&storage);
    let request = multipart_request(
        "/document/file",
        &[Part {
            name: "options",
            file_name: None,
            content_type: None,
            data: br#"{"includeImages": false}"#,
        }],
    );
    let (status, body) = json(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "request has no file part");
}

#[tokio::test]
async fn test_invalid_web_url_fails_job() {
    let storage = TempDir::new().unwrap();
    let app = app(&storage);
    let request = Request::post("/web/url")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"url": "not a url"}"#))
        .unwrap();
    let (status, accepted) = json(&app, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let done = poll_until_done(&app, accepted["jobId"].as_str().unwrap()).await;
    assert_eq!(done["status"], "failed");
    assert_eq!(done["errorKind"], "validation");
    assert_eq!(done["error"], "invalid URL 'not a url'");
}

#[tokio::test]
async fn test_unknown_and_malformed_job_ids() {
    let storage = TempDir::new().unwrap();
    let app = app(&storage);

    let (status, _) = json(
        &app,
        Request::get("/job/not-a-uuid/status").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = uuid::Uuid::new_v4();
    let (status, body) = json(
        &app,
        Request::get(format!("/job/{unknown}/status"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "validation");
}
