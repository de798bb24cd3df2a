//! One-shot invocation without a socket.
//!
//! Builds an HTTP request in memory, runs it through the same
//! [`FunctionRouter`] the server uses and renders the response as
//! `{status, headers, body}`.

use anyhow::{anyhow, Result};
use fliteral_server::{FunctionHost, FunctionRouter};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Request;
use serde_json::{json, Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct InvokeRequest {
    /// Request target, optionally with a query string
    pub target: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl InvokeRequest {
    pub fn get(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            method: "GET".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }
}

/// Parses a `name:value` header argument.
pub fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid header {:?}: expected name:value", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("Invalid header {:?}: empty name", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

pub async fn invoke(host: Arc<FunctionHost>, request: InvokeRequest) -> Result<Value> {
    let target = if request.target.starts_with('/') {
        request.target
    } else {
        format!("/{}", request.target)
    };

    let mut builder = Request::builder().method(request.method.as_str()).uri(target.as_str());
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let req = builder
        .body(Full::new(Bytes::from(request.body.unwrap_or_default())))
        .map_err(|e| anyhow!("Invalid request {} {}: {}", request.method, target, e))?;

    let response = FunctionRouter::new(host).route(req).await;
    let status = response.status().as_u16();

    let mut headers = Map::new();
    for (name, value) in response.headers() {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match headers.get_mut(name.as_str()) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            _ => {
                headers.insert(name.as_str().to_string(), Value::String(value));
            }
        }
    }

    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| anyhow!("Failed to read response body: {}", e))?
        .to_bytes();

    Ok(json!({
        "status": status,
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}
