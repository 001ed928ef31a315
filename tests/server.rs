//! Integration tests for the HTTP API.
//!
//! Serves the real router on an ephemeral port and drives it with reqwest.
//! Summarization and the diagram agent are not exercised here; these tests
//! cover upload validation, diagram retrieval, listing, and the streaming
//! endpoint's degraded completion.

use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use archdiagram::config::Config;
use archdiagram::server::router;

struct TestServer {
    base_url: String,
    output_dir: PathBuf,
    upload_dir: PathBuf,
    _tmp: TempDir,
}

async fn spawn_server() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::minimal();
    config.storage.upload_dir = tmp.path().join("uploads");
    config.storage.output_dir = tmp.path().join("outputs");
    // No diagram agent in test environments; the pipeline degrades.
    config.agent.launcher = "no-such-agent-launcher".to_string();
    config.resolver.freshness_window_secs = 0;

    let output_dir = config.storage.output_dir.clone();
    let upload_dir = config.storage.upload_dir.clone();

    let app = router(Arc::new(config), None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        output_dir,
        upload_dir,
        _tmp: tmp,
    }
}

fn canonical_dir(server: &TestServer) -> PathBuf {
    server.output_dir.join("generated-diagrams")
}

fn png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(b"payload");
    bytes
}

#[tokio::test]
async fn status_reports_service_and_diagram_availability() {
    let server = spawn_server().await;
    let resp = reqwest::get(&server.base_url).await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["service"], "archdiagram");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["diagram_generation"], "unavailable");
}

#[tokio::test]
async fn non_pdf_upload_is_rejected_without_side_effects() {
    let server = spawn_server().await;

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(b"hello".to_vec()).file_name("notes.txt"),
    );
    let resp = reqwest::Client::new()
        .post(format!("{}/api/generate-diagram", server.base_url))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    // Rejected before anything touched the scratch directory.
    let scratch_entries = std::fs::read_dir(&server.upload_dir)
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(scratch_entries, 0);
}

#[tokio::test]
async fn override_fields_are_accepted_alongside_the_upload() {
    let server = spawn_server().await;

    // Per-request summarizer overrides travel as plain form fields; their
    // presence must not disturb upload validation.
    let form = reqwest::multipart::Form::new()
        .text("aws_region", "eu-west-1")
        .text("bedrock_model_id", "anthropic.claude-test")
        .part(
            "file",
            reqwest::multipart::Part::bytes(b"hello".to_vec()).file_name("notes.txt"),
        );
    let resp = reqwest::Client::new()
        .post(format!("{}/api/generate-diagram", server.base_url))
        .multipart(form)
        .send()
        .await
        .unwrap();

    // Still the file-validation error, not a form-parse failure.
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("PDF"));
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    let server = spawn_server().await;

    let form = reqwest::multipart::Form::new().text("other", "value");
    let resp = reqwest::Client::new()
        .post(format!("{}/api/generate-diagram", server.base_url))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn missing_diagram_file_is_404() {
    let server = spawn_server().await;
    let resp = reqwest::get(format!(
        "{}/api/diagram-file/nothing_diagram.png",
        server.base_url
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn traversal_filenames_are_rejected() {
    let server = spawn_server().await;
    let resp = reqwest::get(format!(
        "{}/api/diagram-file/a..b_diagram.png",
        server.base_url
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn local_diagram_is_served_with_cache_disabled() {
    let server = spawn_server().await;
    let dir = canonical_dir(&server);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("20250101_120000_ff01_diagram.png"), png_bytes()).unwrap();

    let resp = reqwest::get(format!(
        "{}/api/diagram-file/20250101_120000_ff01_diagram.png",
        server.base_url
    ))
    .await
    .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/png");
    assert!(resp.headers()["cache-control"]
        .to_str()
        .unwrap()
        .contains("no-store"));
    assert_eq!(resp.bytes().await.unwrap().to_vec(), png_bytes());
}

#[tokio::test]
async fn listing_includes_local_diagrams_when_no_mirror() {
    let server = spawn_server().await;
    let dir = canonical_dir(&server);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("20250101_120000_aa_diagram.png"), png_bytes()).unwrap();
    std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();

    let resp = reqwest::get(format!("{}/api/diagrams", server.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["diagrams"][0]["source"], "local");
    assert_eq!(
        body["diagrams"][0]["filename"],
        "20250101_120000_aa_diagram.png"
    );
    assert_eq!(
        body["diagrams"][0]["url"],
        "/api/diagram-file/20250101_120000_aa_diagram.png"
    );
}

#[tokio::test]
async fn s3_diagram_without_mirror_is_404() {
    let server = spawn_server().await;
    let resp = reqwest::get(format!(
        "{}/api/s3-diagram/x_diagram.png",
        server.base_url
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn legacy_lookup_finds_diagram_by_request_id() {
    let server = spawn_server().await;
    let dir = canonical_dir(&server);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("20250101_120000_abc123_diagram.png"), png_bytes()).unwrap();
    std::fs::write(dir.join("20250101_120000_zzz999_diagram.png"), png_bytes()).unwrap();

    let resp = reqwest::get(format!("{}/api/diagram/abc123", server.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/png");

    let resp = reqwest::get(format!("{}/api/diagram/unknown", server.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn empty_summary_for_streaming_endpoint_is_rejected() {
    let server = spawn_server().await;
    let resp = reqwest::Client::new()
        .post(format!(
            "{}/api/generate-diagram-from-summary",
            server.base_url
        ))
        .json(&serde_json::json!({ "summary": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn streaming_endpoint_degrades_to_unsuccessful_complete() {
    let server = spawn_server().await;
    let resp = reqwest::Client::new()
        .post(format!(
            "{}/api/generate-diagram-from-summary",
            server.base_url
        ))
        .json(&serde_json::json!({
            "summary": "A load balancer routes traffic to two app servers."
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .contains("text/event-stream"));

    // No agent launcher exists in this environment, so the stream must end
    // with an unsuccessful complete event.
    let body = resp.text().await.unwrap();
    assert!(body.contains("\"status\":\"complete\""), "body: {}", body);
    assert!(body.contains("\"success\":false"), "body: {}", body);
}
