//! Fixtures and a local server for fliteral integration tests.

#![allow(dead_code)]

use fliteral_metrics::RequestMetricsCollector;
use fliteral_server::{FunctionHost, HttpServer, ServerConfig};
use std::fs::{self, File};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::net::TcpListener;

// ============================================================================
// Function Fixtures
// ============================================================================

pub const HELLOWORLD: &str = r#"
exports.handler = function (event, context, completion) {
    completion(null, { statusCode: 200, body: 'hello world' });
};
"#;

pub const ECHOTEST: &str = r#"
exports.handler = function (event, context, completion) {
    completion(null, {
        statusCode: 200,
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify(event)
    });
};
"#;

pub const WITHOUTHANDLER: &str = r#"
exports.somethingElse = function () {};
"#;

pub const UNCAUGHTERROR: &str = r#"
exports.handler = function () {
    throw new Error('uncaught in handler');
};
"#;

pub const NEVER: &str = r#"
exports.handler = function (event, context, completion) {};
"#;

/// Spins for 800ms, then completes.
pub const SLOW: &str = r#"
exports.handler = function (event, context, completion) {
    var until = Date.now() + 800;
    while (Date.now() < until) {}
    completion(null, { statusCode: 200, body: 'too late' });
};
"#;

/// A temporary function root.
pub struct FunctionTree {
    dir: tempfile::TempDir,
}

impl FunctionTree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// The standard fixture set.
    pub fn standard() -> Self {
        let tree = Self::new();
        tree.function("helloworld", HELLOWORLD);
        tree.function("echotest", ECHOTEST);
        tree.function("withouthandler", WITHOUTHANDLER);
        tree.function("uncaughterror", UNCAUGHTERROR);
        tree.function("never", NEVER);
        tree.function("slow", SLOW);
        fs::create_dir_all(tree.root().join("withoutpackagejson")).unwrap();
        fs::write(tree.root().join("withoutpackagejson/index.js"), HELLOWORLD).unwrap();
        tree
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn function(&self, name: &str, source: &str) -> PathBuf {
        let dir = self.root().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.json"), format!(r#"{{"name": "{}"}}"#, name)).unwrap();
        fs::write(dir.join("index.js"), source).unwrap();
        dir
    }

    pub fn set_descriptor_modified(&self, name: &str, modified: SystemTime) {
        File::options()
            .write(true)
            .open(self.root().join(name).join("package.json"))
            .unwrap()
            .set_modified(modified)
            .unwrap();
    }
}

// ============================================================================
// Test Server
// ============================================================================

/// A fliteral server bound to an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub host: Arc<FunctionHost>,
    pub metrics: RequestMetricsCollector,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start(root: &Path) -> Self {
        Self::start_with(ServerConfig::new(root)).await
    }

    pub async fn start_with(config: ServerConfig) -> Self {
        let metrics = RequestMetricsCollector::new();
        let host = Arc::new(
            FunctionHost::new(config)
                .unwrap()
                .with_metrics(Arc::new(metrics.clone())),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = HttpServer::new(Arc::clone(&host));
        let task = tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        Self {
            addr,
            host,
            metrics,
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Waits until the metrics collector has seen `count` requests.
    pub async fn wait_for_records(&self, count: u64) {
        for _ in 0..100 {
            if self.metrics.snapshot().total_requests >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
