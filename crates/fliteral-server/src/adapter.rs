//! Request Adapter
//!
//! Turns an HTTP request into an [`InvocationEvent`]. The body is read in full
//! before dispatch, bounded both by the configured size limit and by the
//! request deadline.

use fliteral_common::{Failure, InvocationEvent};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::Request;
use std::error::Error as StdError;
use tokio::time::{timeout_at, Instant};

#[derive(Debug, Clone)]
pub struct RequestAdapter {
    stage: String,
    max_body_bytes: usize,
}

impl RequestAdapter {
    pub fn new(stage: impl Into<String>, max_body_bytes: usize) -> Self {
        Self {
            stage: stage.into(),
            max_body_bytes,
        }
    }

    /// # Errors
    ///
    /// - `ClientError` if a header value is not valid UTF-8, or the body
    ///   cannot be read or exceeds the size limit
    /// - `Timeout` if the body has not fully arrived by `deadline`
    pub async fn adapt<B>(&self, req: Request<B>, deadline: Instant) -> Result<InvocationEvent, Failure>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();

        let mut builder = InvocationEvent::builder(parts.method.as_str(), parts.uri.path()).stage(&self.stage);
        if let Some(query) = parts.uri.query() {
            builder = builder.query_string(query);
        }

        for (name, value) in &parts.headers {
            let value = std::str::from_utf8(value.as_bytes()).map_err(|_| {
                Failure::client_error(format!("header {} is not valid UTF-8", name))
            })?;
            builder = builder.header(name.as_str(), value);
        }

        let collected = timeout_at(deadline, Limited::new(body, self.max_body_bytes).collect())
            .await
            .map_err(|_| Failure::timeout("deadline elapsed while reading the request body"))?;
        let body = collected.map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                Failure::client_error(format!("request body exceeds {} bytes", self.max_body_bytes))
            } else {
                Failure::client_error(format!("failed to read request body: {}", e))
            }
        })?;

        Ok(builder.body(body.to_bytes().to_vec()).build())
    }
}
