//! Response Translator
//!
//! Maps an [`Outcome`] onto the wire. Failure responses carry only the
//! status and its canonical reason phrase; failure detail never reaches the
//! client.

use fliteral_common::{FailureKind, Outcome};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use tracing::error;

use crate::config::Identity;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json; charset=utf-8";

pub fn translate(outcome: Outcome) -> Response<Full<Bytes>> {
    match outcome {
        Outcome::Success(response) => {
            let mut builder = Response::builder().status(response.status_code);
            for (name, value) in &response.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder
                .body(Full::new(Bytes::from(response.body)))
                .unwrap_or_else(|e| {
                    error!(error = %e, "handler response rejected by the HTTP layer");
                    internal_error()
                })
        }
        Outcome::Failure(failure) => failure_response(failure.kind),
    }
}

/// The plain-text response for a failure kind.
pub fn failure_response(kind: FailureKind) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = match kind {
        FailureKind::Timeout => Bytes::new(),
        _ => Bytes::from_static(status.canonical_reason().unwrap_or("").as_bytes()),
    };
    plain(status, body)
}

/// `GET /` response: `{name, version}` as JSON.
pub fn identity_response(identity: &Identity) -> Response<Full<Bytes>> {
    match serde_json::to_vec(identity) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
            response
        }
        Err(e) => {
            error!(error = %e, "failed to serialise identity");
            internal_error()
        }
    }
}

fn internal_error() -> Response<Full<Bytes>> {
    plain(
        StatusCode::INTERNAL_SERVER_ERROR,
        Bytes::from_static(b"Internal Server Error"),
    )
}

fn plain(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    response
}
