//! HTTP Router for the function host
//!
//! Every request takes the same route:
//!
//! - **`/`**: answered directly with the host identity, no resolution
//! - **anything else**: adapted into an [`InvocationEvent`], dispatched to the
//!   [`FunctionHost`], translated back into a response and finally reported
//!   to the metrics sink
//!
//! The request deadline is fixed on arrival and covers body reading,
//! resolution, loading and execution.
//!
//! # Example
//!
//! ```no_run
//! use fliteral_server::{FunctionHost, FunctionRouter, ServerConfig};
//! use std::sync::Arc;
//!
//! let host = Arc::new(FunctionHost::new(ServerConfig::new("./functions")).unwrap());
//! let router = FunctionRouter::new(host);
//! ```

use fliteral_common::{FailureKind, Outcome};
use fliteral_metrics::RequestRecord;
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::{Request, Response};
use std::error::Error as StdError;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::adapter::RequestAdapter;
use crate::host::FunctionHost;
use crate::translator;

pub struct FunctionRouter {
    host: Arc<FunctionHost>,
    adapter: RequestAdapter,
}

impl FunctionRouter {
    pub fn new(host: Arc<FunctionHost>) -> Self {
        let config = host.config();
        let adapter = RequestAdapter::new(config.stage.clone(), config.max_body_bytes);
        Self { host, adapter }
    }

    pub fn host(&self) -> &Arc<FunctionHost> {
        &self.host
    }

    /// Serves one request. Never fails: every fault becomes a status code.
    pub async fn route<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let started = Instant::now();
        let deadline = started + self.host.config().timeout;

        if req.uri().path() == "/" {
            debug!(method = %req.method(), "identity request");
            return translator::identity_response(&self.host.config().identity);
        }

        let path = req.uri().path().to_string();
        let mut request_id = None;
        let outcome = match self.adapter.adapt(req, deadline).await {
            Ok(event) => {
                request_id = Some(event.request_id().to_string());
                info!(
                    method = event.method(),
                    path = event.raw_path(),
                    request_id = %event.request_id(),
                    "request received"
                );
                self.host.invoke(&event, deadline).await
            }
            Err(failure) => failure.into(),
        };

        log_outcome(&path, request_id.as_deref(), &outcome);

        let status = outcome.status_code();
        let timed_out = matches!(outcome.failure(), Some(f) if f.kind == FailureKind::Timeout);
        let response = translator::translate(outcome);

        let mut record = RequestRecord::new(path, started.elapsed(), timed_out, status);
        if let Some(request_id) = request_id {
            record = record.with_request_id(request_id);
        }
        self.host.report(record);

        response
    }
}

fn log_outcome(path: &str, request_id: Option<&str>, outcome: &Outcome) {
    let request_id = request_id.unwrap_or("-");
    match outcome {
        Outcome::Success(response) => {
            debug!(path, request_id, status = response.status_code, "request completed");
        }
        Outcome::Failure(failure) => match failure.kind {
            FailureKind::Timeout => {
                warn!(path, request_id, detail = %failure.detail, "request timed out");
            }
            FailureKind::ClientError | FailureKind::NotFound => {
                info!(path, request_id, kind = %failure.kind, detail = %failure.detail, "request rejected");
            }
            _ => {
                error!(path, request_id, kind = %failure.kind, detail = %failure.detail, "request failed");
            }
        },
    }
}
