//! HTTP Server Integration Tests
//!
//! Starts the real hyper server on an ephemeral port and drives it with
//! reqwest. Traversal cases use a raw TCP request because HTTP clients
//! normalise `..` before sending.

use fliteral_server::ServerConfig;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::{Duration, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;
use common::{FunctionTree, TestServer, HELLOWORLD};

/// Sends a GET for `target` verbatim and returns the status code of the reply.
async fn raw_status(server: &TestServer, target: &str) -> u16 {
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        target
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();

    response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or_else(|| panic!("unparseable response: {:?}", response))
}

// ============================================================================
// Identity
// ============================================================================

#[tokio::test]
async fn test_root_returns_identity() {
    let tree = FunctionTree::standard();
    let server = TestServer::start(tree.root()).await;

    for method in [reqwest::Method::GET, reqwest::Method::POST, reqwest::Method::DELETE] {
        let res = Client::new().request(method, server.url("/")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()["content-type"],
            "application/json; charset=utf-8"
        );
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["name"], "fliteral");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}

// ============================================================================
// Resolution
// ============================================================================

#[tokio::test]
async fn test_traversal_is_rejected() {
    let tree = FunctionTree::standard();
    let server = TestServer::start(tree.root()).await;

    for target in [
        "/..",
        "/../etc/passwd",
        "/helloworld/..",
        "/helloworld/../helloworld",
        "/nonexistent/../../x",
    ] {
        assert_eq!(raw_status(&server, target).await, 400, "target {}", target);
    }
}

#[tokio::test]
async fn test_missing_descriptor_is_not_found() {
    let tree = FunctionTree::standard();
    let server = TestServer::start(tree.root()).await;
    let client = Client::new();

    for path in ["/withoutpackagejson", "/doesnotexist", "/helloworld/index.js"] {
        let res = client.get(server.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "path {}", path);
        assert_eq!(res.text().await.unwrap(), "Not Found");
    }

    assert_eq!(raw_status(&server, "/.").await, 404);
}

// ============================================================================
// Handlers
// ============================================================================

#[tokio::test]
async fn test_helloworld() {
    let tree = FunctionTree::standard();
    let server = TestServer::start(tree.root()).await;

    let res = Client::new().get(server.url("/helloworld")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "hello world");
}

#[tokio::test]
async fn test_echo_query_parameters() {
    let tree = FunctionTree::standard();
    let server = TestServer::start(tree.root()).await;

    let res = Client::new()
        .get(server.url("/echotest?foo=1&bar=2"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/json");

    let event: Value = res.json().await.unwrap();
    assert_eq!(event["queryStringParameters"], json!({"foo": "1", "bar": "2"}));
    assert_eq!(event["httpMethod"], "GET");
    assert_eq!(event["path"], "/echotest");
    assert_eq!(event["requestContext"]["stage"], "test");
    assert!(event["requestContext"]["requestId"].is_string());
}

#[tokio::test]
async fn test_echo_post_body() {
    let tree = FunctionTree::standard();
    let server = TestServer::start(tree.root()).await;
    let body = r#"{"name":"Manny","species":"cat"}"#;

    let res = Client::new()
        .post(server.url("/echotest"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();

    let event: Value = res.json().await.unwrap();
    assert_eq!(event["httpMethod"], "POST");
    assert_eq!(event["body"], body);
    assert_eq!(event["isBase64Encoded"], false);
    assert_eq!(event["headers"]["content-type"], "application/json");
}

#[tokio::test]
async fn test_echo_binary_body_is_base64() {
    let tree = FunctionTree::standard();
    let server = TestServer::start(tree.root()).await;

    let res = Client::new()
        .post(server.url("/echotest"))
        .body(vec![0xffu8, 0x00, 0xfe])
        .send()
        .await
        .unwrap();

    let event: Value = res.json().await.unwrap();
    assert_eq!(event["isBase64Encoded"], true);
    assert_eq!(event["body"], "/wD+");
}

#[tokio::test]
async fn test_handler_failures_are_opaque_500s() {
    let tree = FunctionTree::standard();
    let server = TestServer::start(tree.root()).await;
    let client = Client::new();

    for path in ["/withouthandler", "/uncaughterror"] {
        let res = client.get(server.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR, "path {}", path);
        assert_eq!(res.text().await.unwrap(), "Internal Server Error");
    }
}

#[tokio::test]
async fn test_missing_handler_is_rechecked_every_request() {
    let tree = FunctionTree::standard();
    let server = TestServer::start(tree.root()).await;
    let client = Client::new();

    for _ in 0..2 {
        let res = client.get(server.url("/withouthandler")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    // Only the entry file changes: nothing was cached, so no mtime bump is needed
    tree.function("withouthandler", HELLOWORLD);
    let res = client.get(server.url("/withouthandler")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_idempotent_responses() {
    let tree = FunctionTree::standard();
    let server = TestServer::start(tree.root()).await;
    let client = Client::new();

    let mut seen = Vec::new();
    for _ in 0..2 {
        let res = client.get(server.url("/helloworld")).send().await.unwrap();
        let status = res.status();
        let content_type = res.headers().get("content-type").cloned();
        let body = res.bytes().await.unwrap();
        seen.push((status, content_type, body));
    }
    assert_eq!(seen[0], seen[1]);
}

// ============================================================================
// Module Cache
// ============================================================================

#[tokio::test]
async fn test_reload_after_descriptor_change() {
    let tree = FunctionTree::standard();
    tree.set_descriptor_modified("helloworld", UNIX_EPOCH + Duration::from_secs(1_000_000));
    let server = TestServer::start(tree.root()).await;
    let client = Client::new();

    let res = client.get(server.url("/helloworld")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "hello world");

    tree.function(
        "helloworld",
        "exports.handler = (e, c, done) => done(null, { statusCode: 200, body: 'version 2' });",
    );

    // Entry file edits alone are not watched
    tree.set_descriptor_modified("helloworld", UNIX_EPOCH + Duration::from_secs(1_000_000));
    let res = client.get(server.url("/helloworld")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "hello world");

    tree.set_descriptor_modified("helloworld", UNIX_EPOCH + Duration::from_secs(2_000_000));
    let res = client.get(server.url("/helloworld")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "version 2");
    assert_eq!(server.host.cache().load_count(), 2);
}

#[tokio::test]
async fn test_concurrent_first_requests_converge() {
    let tree = FunctionTree::standard();
    let server = TestServer::start(tree.root()).await;
    let client = Client::new();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        let url = server.url("/helloworld");
        handles.push(tokio::spawn(async move {
            client.get(url).send().await.unwrap().text().await.unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), "hello world");
    }

    let cache = server.host.cache();
    assert_eq!(cache.len(), 1);
    let installed = cache.get(&tree.root().canonicalize().unwrap().join("helloworld")).unwrap();

    let loads = cache.load_count();
    client.get(server.url("/helloworld")).send().await.unwrap();
    assert_eq!(cache.load_count(), loads);
    assert_eq!(
        cache.get(&installed.key).unwrap().generation,
        installed.generation
    );
}

// ============================================================================
// Deadline
// ============================================================================

async fn start_with_timeout(tree: &FunctionTree, timeout: Duration) -> TestServer {
    TestServer::start_with(ServerConfig::new(tree.root()).with_timeout(timeout)).await
}

#[tokio::test]
async fn test_never_completing_handler_times_out() {
    let tree = FunctionTree::standard();
    let server = start_with_timeout(&tree, Duration::from_millis(100)).await;

    let res = Client::new().get(server.url("/never")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(res.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_late_completion_is_ignored() {
    let tree = FunctionTree::standard();
    let server = start_with_timeout(&tree, Duration::from_millis(300)).await;

    let started = std::time::Instant::now();
    let res = Client::new().get(server.url("/slow")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(started.elapsed() < Duration::from_millis(800));
    assert!(res.text().await.unwrap().is_empty());

    // Let the handler finish; the server keeps serving normally afterwards
    tokio::time::sleep(Duration::from_millis(900)).await;
    let res = Client::new().get(server.url("/helloworld")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

// ============================================================================
// Metrics
// ============================================================================

#[tokio::test]
async fn test_requests_are_reported() {
    let tree = FunctionTree::standard();
    let server = start_with_timeout(&tree, Duration::from_secs(1)).await;
    let client = Client::new();

    client.get(server.url("/helloworld")).send().await.unwrap();
    client.get(server.url("/doesnotexist")).send().await.unwrap();
    client.get(server.url("/never")).send().await.unwrap();
    client.get(server.url("/")).send().await.unwrap();

    server.wait_for_records(3).await;
    let snapshot = server.metrics.snapshot();
    assert_eq!(snapshot.total_requests, 3);
    assert_eq!(snapshot.successful_requests, 1);
    assert_eq!(snapshot.timed_out_requests, 1);
    assert_eq!(snapshot.paths["/never"].timeout_count, 1);
    assert!(!snapshot.paths.contains_key("/"));
}
