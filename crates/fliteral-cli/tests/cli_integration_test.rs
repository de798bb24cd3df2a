//! CLI Integration Tests
//!
//! Runs the built `fliteral` binary against temporary function roots.
//!
//! Test Scenarios:
//! 1. Argument parsing and validation
//! 2. `invoke` output for success and failure outcomes
//! 3. `serve` startup and a request over a real socket

use serde_json::Value;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::process::{Command, Output};
use std::time::{Duration, Instant};

// ============================================================================
// Test Helpers
// ============================================================================

const ENV_VARS: [&str; 6] = [
    "LITERAL_PATH",
    "PORT",
    "FLITERAL_HOST",
    "FLITERAL_TIMEOUT_MS",
    "STAGE",
    "FLITERAL_METRICS_FILE",
];

/// A `fliteral` command with the configuration environment cleared.
fn fliteral() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_fliteral"));
    for var in ENV_VARS {
        command.env_remove(var);
    }
    command.env_remove("RUST_LOG");
    command
}

fn function_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_function(
        dir.path(),
        "helloworld",
        "exports.handler = (e, c, done) => done(null, { statusCode: 200, body: 'hello world' });",
    );
    write_function(
        dir.path(),
        "echotest",
        r#"exports.handler = function (event, context, completion) {
            completion(null, {
                statusCode: 200,
                headers: { 'content-type': 'application/json' },
                body: JSON.stringify({
                    method: event.httpMethod,
                    query: event.queryStringParameters,
                    body: event.body,
                    stage: event.requestContext.stage
                })
            });
        };"#,
    );
    write_function(
        dir.path(),
        "uncaughterror",
        "exports.handler = function () { throw new Error('boom'); };",
    );
    dir
}

fn write_function(root: &Path, name: &str, source: &str) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("package.json"), "{}").unwrap();
    std::fs::write(dir.join("index.js"), source).unwrap();
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

// ============================================================================
// Argument Validation
// ============================================================================

#[test]
fn test_invoke_requires_path() {
    let output = fliteral().arg("invoke").output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_unknown_command() {
    let output = fliteral().arg("deploy").output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_invoke_missing_root() {
    let dir = tempfile::tempdir().unwrap();
    let output = fliteral()
        .args(["invoke", "/helloworld", "--root"])
        .arg(dir.path().join("missing"))
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("function root"));
}

#[test]
fn test_invalid_timeout_env() {
    let root = function_root();
    let output = fliteral()
        .args(["invoke", "/helloworld", "--root"])
        .arg(root.path())
        .env("FLITERAL_TIMEOUT_MS", "soon")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("FLITERAL_TIMEOUT_MS"));
}

// ============================================================================
// Invoke
// ============================================================================

#[test]
fn test_invoke_helloworld() {
    let root = function_root();
    let output = fliteral()
        .args(["invoke", "/helloworld", "--root"])
        .arg(root.path())
        .output()
        .unwrap();

    let response = stdout_json(&output);
    assert_eq!(response["status"], 200);
    assert_eq!(response["body"], "hello world");
}

#[test]
fn test_invoke_root_from_env() {
    let root = function_root();
    let output = fliteral()
        .args(["invoke", "/echotest?foo=1&bar=2", "-m", "POST", "-b", "{\"name\":\"Manny\"}"])
        .env("LITERAL_PATH", root.path())
        .env("STAGE", "dev")
        .output()
        .unwrap();

    let response = stdout_json(&output);
    assert_eq!(response["headers"]["content-type"], "application/json");
    let body: Value = serde_json::from_str(response["body"].as_str().unwrap()).unwrap();
    assert_eq!(body["method"], "POST");
    assert_eq!(body["query"]["foo"], "1");
    assert_eq!(body["query"]["bar"], "2");
    assert_eq!(body["body"], "{\"name\":\"Manny\"}");
    assert_eq!(body["stage"], "dev");
}

#[test]
fn test_invoke_failures_print_status() {
    let root = function_root();
    for (path, status) in [("/uncaughterror", 500), ("/missing", 404), ("/../etc", 400)] {
        let output = fliteral()
            .args(["invoke", path, "--root"])
            .arg(root.path())
            .output()
            .unwrap();

        let response = stdout_json(&output);
        assert_eq!(response["status"], status, "path {}", path);
        assert!(!response["body"].as_str().unwrap().contains("boom"));
    }
}

// ============================================================================
// Serve
// ============================================================================

#[test]
fn test_serve_answers_requests() {
    let root = function_root();
    let port = free_port();
    let mut child = fliteral()
        .args(["serve", "--host", "127.0.0.1", "--port", &port.to_string(), "--root"])
        .arg(root.path())
        .spawn()
        .unwrap();

    let started = Instant::now();
    let response = loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(mut stream) => {
                stream
                    .write_all(b"GET /helloworld HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                    .unwrap();
                let mut response = String::new();
                stream.read_to_string(&mut response).unwrap();
                break response;
            }
            Err(_) if started.elapsed() < Duration::from_secs(10) => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                let _ = child.kill();
                panic!("server did not start: {}", e);
            }
        }
    };

    let _ = child.kill();
    let _ = child.wait();

    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.ends_with("hello world"));
}
