//! Invocation Event
//!
//! The canonical, immutable representation of one HTTP request as seen by a
//! function handler. Built once by the request adapter, then shared read-only
//! by the resolver, the execution engine and the metrics hookup.
//!
//! # Handler payload
//!
//! [`InvocationEvent::to_handler_payload`] renders the API-gateway style object
//! passed to `handler(event, context, completion)`:
//!
//! | Field | Source |
//! |-------|--------|
//! | `resource`, `path` | raw request path |
//! | `httpMethod` | request method |
//! | `headers` | lower-cased names, repeated values joined with `", "` |
//! | `multiValueHeaders` | lower-cased names, every value |
//! | `queryStringParameters` | last value per key |
//! | `multiValueQueryStringParameters` | every value per key |
//! | `body` | UTF-8 text, or base64 when the bytes are not valid UTF-8 |
//! | `isBase64Encoded` | whether `body` is base64 |
//! | `requestContext` | `httpMethod`, `path`, `stage`, `requestId`, `requestTimeEpoch` |

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type RequestId = Uuid;

const DEFAULT_STAGE: &str = "test";

#[derive(Debug, Clone, PartialEq)]
pub struct InvocationEvent {
    headers: Vec<(String, String)>,
    method: String,
    raw_path: String,
    normalized_path: String,
    query_params: BTreeMap<String, String>,
    multi_value_query_params: BTreeMap<String, Vec<String>>,
    body: Vec<u8>,
    request_id: RequestId,
    stage: String,
    received_at: DateTime<Utc>,
}

impl InvocationEvent {
    pub fn builder(method: impl Into<String>, raw_path: impl Into<String>) -> InvocationEventBuilder {
        InvocationEventBuilder {
            method: method.into(),
            raw_path: raw_path.into(),
            query_string: None,
            headers: Vec::new(),
            body: Vec::new(),
            stage: DEFAULT_STAGE.to_string(),
        }
    }

    /// Headers in arrival order, names lower-cased.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// All values of a header, in arrival order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    pub fn normalized_path(&self) -> &str {
        &self.normalized_path
    }

    pub fn query_params(&self) -> &BTreeMap<String, String> {
        &self.query_params
    }

    pub fn multi_value_query_params(&self) -> &BTreeMap<String, Vec<String>> {
        &self.multi_value_query_params
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Renders the object delivered to the function handler as its `event`
    /// argument.
    pub fn to_handler_payload(&self) -> Value {
        let mut headers = Map::new();
        let mut multi_value_headers: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
        for (name, value) in &self.headers {
            multi_value_headers
                .entry(name.as_str())
                .or_default()
                .push(Value::String(value.clone()));
            match headers.get_mut(name) {
                Some(Value::String(existing)) => {
                    existing.push_str(", ");
                    existing.push_str(value);
                }
                _ => {
                    headers.insert(name.clone(), Value::String(value.clone()));
                }
            }
        }

        let (body, is_base64_encoded) = match std::str::from_utf8(&self.body) {
            Ok(text) => (text.to_string(), false),
            Err(_) => (STANDARD.encode(&self.body), true),
        };

        json!({
            "resource": self.raw_path,
            "path": self.raw_path,
            "httpMethod": self.method,
            "headers": headers,
            "multiValueHeaders": multi_value_headers,
            "queryStringParameters": self.query_params,
            "multiValueQueryStringParameters": self.multi_value_query_params,
            "body": body,
            "isBase64Encoded": is_base64_encoded,
            "requestContext": {
                "httpMethod": self.method,
                "path": self.raw_path,
                "stage": self.stage,
                "requestId": self.request_id.to_string(),
                "requestTimeEpoch": self.received_at.timestamp_millis(),
            },
        })
    }
}

/// Collects the parts of a request before freezing them into an
/// [`InvocationEvent`].
#[derive(Debug, Clone)]
pub struct InvocationEventBuilder {
    method: String,
    raw_path: String,
    query_string: Option<String>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    stage: String,
}

impl InvocationEventBuilder {
    /// Sets the undecoded query string (without the leading `?`).
    pub fn query_string(mut self, query: impl Into<String>) -> Self {
        self.query_string = Some(query.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into().to_ascii_lowercase(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    /// Freezes the event, assigning a fresh request id and arrival timestamp.
    pub fn build(self) -> InvocationEvent {
        let mut query_params = BTreeMap::new();
        let mut multi_value_query_params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if let Some(query) = &self.query_string {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                multi_value_query_params
                    .entry(key.to_string())
                    .or_default()
                    .push(value.to_string());
                query_params.insert(key.into_owned(), value.into_owned());
            }
        }

        InvocationEvent {
            normalized_path: normalize_path(&self.raw_path),
            headers: self.headers,
            method: self.method,
            raw_path: self.raw_path,
            query_params,
            multi_value_query_params,
            body: self.body,
            request_id: Uuid::new_v4(),
            stage: self.stage,
            received_at: Utc::now(),
        }
    }
}

/// Canonical form of a request path.
///
/// Duplicate slashes collapse, `.` segments and trailing slashes are dropped,
/// and the leading `/` is kept. `..` segments are preserved so the path
/// resolver can reject them.
///
/// ```
/// use fliteral_common::normalize_path;
///
/// assert_eq!(normalize_path("//hello/./world/"), "/hello/world");
/// assert_eq!(normalize_path("/."), "/");
/// assert_eq!(normalize_path("/../secret"), "/../secret");
/// ```
pub fn normalize_path(raw: &str) -> String {
    let segments: Vec<&str> = raw
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    format!("/{}", segments.join("/"))
}
