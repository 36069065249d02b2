//! End-to-end HTTP tests for Lister.
//!
//! Each test starts a real server on an ephemeral port and talks to it with
//! reqwest:
//! - Listing pages and direct file serving
//! - The expansion API
//! - The admission gate

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use server::config::Config;
use tempfile::TempDir;
use tokio::sync::oneshot;

const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

struct TestServer {
    addr: SocketAddr,
    config: Config,
    shutdown: Option<oneshot::Sender<()>>,
    _base: TempDir,
    _data: TempDir,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Populate a base directory:
///
/// ```text
/// docs/readme.txt
/// docs/guide.md
/// empty/
/// .git/config
/// .env
/// notes.txt
/// Thumbs.db
/// ```
fn populate(base: &std::path::Path) {
    fs::create_dir(base.join("docs")).unwrap();
    fs::write(base.join("docs/readme.txt"), "hello from docs").unwrap();
    fs::write(base.join("docs/guide.md"), "# Guide").unwrap();
    fs::create_dir(base.join("empty")).unwrap();
    fs::create_dir(base.join(".git")).unwrap();
    fs::write(base.join(".git/config"), "[core]").unwrap();
    fs::write(base.join(".env"), "SECRET=1").unwrap();
    fs::write(base.join("notes.txt"), "some notes").unwrap();
    fs::write(base.join("Thumbs.db"), "cruft").unwrap();
}

async fn start_server(customize: impl FnOnce(&mut Config)) -> TestServer {
    let base = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    populate(base.path());

    let mut config = Config::default();
    config.server.base_dir = base.path().to_path_buf();
    config.server.data_dir = data.path().to_path_buf();
    config.server.title = "Test Files".to_string();
    customize(&mut config);
    config.validate().unwrap();

    let state = Arc::new(server::build_state(&config).unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let shutdown = async {
            let _ = rx.await;
        };
        server::web::serve(listener, state, shutdown).await.unwrap();
    });

    TestServer {
        addr,
        config,
        shutdown: Some(tx),
        _base: base,
        _data: data,
    }
}

fn browser() -> reqwest::Client {
    reqwest::Client::builder().user_agent(BROWSER).build().unwrap()
}

fn names(entries: &Value) -> Vec<String> {
    entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap().to_string())
        .collect()
}

// =============================================================================
// Listing Page Tests
// =============================================================================

#[tokio::test]
async fn test_root_listing_page() {
    let server = start_server(|_| {}).await;

    let res = browser().get(server.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let content_type = res.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));

    let body = res.text().await.unwrap();
    assert!(body.contains("Test Files"));
    assert!(body.contains("docs"));
    assert!(body.contains("notes.txt"));
    assert!(body.contains("(empty)"));
    assert!(!body.contains(".env"));
    assert!(!body.contains("Thumbs.db"));
    assert!(!body.contains(".git"));
}

#[tokio::test]
async fn test_nested_listing_page_has_breadcrumbs() {
    let server = start_server(|_| {}).await;

    let res = browser().get(server.url("/docs/")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    let body = res.text().await.unwrap();
    assert!(body.contains("Home"));
    assert!(body.contains("readme.txt"));
    assert!(body.contains("guide.md"));
    assert!(body.contains("href=\"/docs/readme.txt\""));
}

#[tokio::test]
async fn test_serves_visible_file() {
    let server = start_server(|_| {}).await;

    let res = browser()
        .get(server.url("/docs/readme.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let content_type = res.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    assert_eq!(res.text().await.unwrap(), "hello from docs");
}

#[tokio::test]
async fn test_hidden_file_not_served() {
    let server = start_server(|_| {}).await;
    let client = browser();

    let res = client.get(server.url("/.env")).send().await.unwrap();
    assert_eq!(res.status(), 404);

    let res = client.get(server.url("/.git/config")).send().await.unwrap();
    assert_eq!(res.status(), 404);

    let res = client.get(server.url("/.git/")).send().await.unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn test_missing_path_rejected() {
    let server = start_server(|_| {}).await;

    let res = browser().get(server.url("/nope/")).send().await.unwrap();
    assert_eq!(res.status(), 403);
    let body = res.text().await.unwrap();
    assert!(body.contains("Access denied"));
    // Server paths never leak into error pages.
    assert!(!body.contains(&server.config.server.base_dir.display().to_string()));
}

// =============================================================================
// Expansion API Tests
// =============================================================================

#[tokio::test]
async fn test_api_lists_directory() {
    let server = start_server(|_| {}).await;

    let res = browser()
        .get(server.url("/_lister/api?path=docs"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(names(&body["data"]["files"]), vec!["guide.md", "readme.txt"]);
    assert!(names(&body["data"]["directories"]).is_empty());
    assert!(!body["data"]["parent_path"].is_null());
    assert_eq!(body["data"]["files"][1]["url"], "/docs/readme.txt");
    assert_eq!(body["data"]["files"][1]["mime_type"], "text/plain");
}

#[tokio::test]
async fn test_api_root_has_no_parent() {
    let server = start_server(|_| {}).await;

    let res = browser().get(server.url("/_lister/api")).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert!(body["data"]["parent_path"].is_null());
    assert_eq!(names(&body["data"]["directories"]), vec!["docs", "empty"]);
    assert_eq!(body["data"]["directories"][1]["is_empty"], true);
    assert_eq!(names(&body["data"]["files"]), vec!["notes.txt"]);
}

#[tokio::test]
async fn test_api_accepts_entry_urls() {
    let server = start_server(|_| {}).await;
    let client = browser();

    let res = client.get(server.url("/_lister/api")).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    let docs_url = body["data"]["directories"][0]["url"].as_str().unwrap().to_string();

    let res = client
        .get(server.url(&format!("/_lister/api?path={}", docs_url)))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(names(&body["data"]["files"]), vec!["guide.md", "readme.txt"]);
}

#[tokio::test]
async fn test_api_hides_hidden_directories() {
    let server = start_server(|_| {}).await;
    let client = browser();

    for path in [".git", "%2Egit", "/.git"] {
        let res = client
            .get(server.url(&format!("/_lister/api?path={}", path)))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400, "path {}", path);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Directory not found");
        assert!(body.get("data").is_none());
    }
}

#[tokio::test]
async fn test_api_rejects_traversal() {
    let server = start_server(|_| {}).await;
    let client = browser();

    for path in ["..%2F..%2F..%2Fetc", "%2e%2e%2f%2e%2e%2fetc", "a/../../etc/passwd"] {
        let res = client
            .get(server.url(&format!("/_lister/api?path={}", path)))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400, "path {}", path);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().is_some());
    }
}

// =============================================================================
// Admission Gate Tests
// =============================================================================

#[tokio::test]
async fn test_bot_denied() {
    let server = start_server(|_| {}).await;

    let client = reqwest::Client::builder()
        .user_agent("curl/7.68.0")
        .build()
        .unwrap();
    let res = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 403);
    assert!(res.text().await.unwrap().contains("Bot detected"));

    let log = fs::read_to_string(server.config.server.data_dir.join("security.log")).unwrap();
    assert!(log.contains("BOT_DETECTED"));
    assert!(log.contains("curl/7.68.0"));
}

#[tokio::test]
async fn test_rate_limit_blocks_client() {
    let server = start_server(|config| {
        config.security.max_requests_per_minute = 3;
    })
    .await;
    let client = browser();

    for _ in 0..3 {
        let res = client.get(server.url("/")).send().await.unwrap();
        assert_eq!(res.status(), 200);
    }

    let res = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 403);
    assert!(res.text().await.unwrap().contains("Rate limit exceeded"));

    let res = client.get(server.url("/_lister/api")).send().await.unwrap();
    assert_eq!(res.status(), 403);
    assert!(res.text().await.unwrap().contains("Access denied"));

    let blocked = fs::read_dir(&server.config.server.data_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().starts_with("blocked_"));
    assert!(blocked);
}

#[tokio::test]
async fn test_gate_disabled() {
    let server = start_server(|config| {
        config.security.enabled = false;
    })
    .await;

    let client = reqwest::Client::builder()
        .user_agent("curl/7.68.0")
        .build()
        .unwrap();
    let res = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(!server.config.server.data_dir.join("security.log").exists());
}
