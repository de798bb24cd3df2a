//! Invocation outcomes and the failure taxonomy.
//!
//! Every request produces exactly one [`Outcome`]. Failures belong to a closed
//! set of [`FailureKind`]s, each mapped to a fixed HTTP status. The `detail`
//! string of a [`Failure`] is for server-side logs and metrics only; it is never
//! written to the client.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed request or path traversal attempt.
    ClientError,
    NotFound,
    /// The module (or its descriptor) could not be read or evaluated.
    ModuleLoad,
    /// The module loaded but does not export a callable handler.
    ModuleInvalid,
    /// The handler threw, rejected, or reported an error through `completion`.
    HandlerExecution,
    /// The handler completed with a result that is not a valid response.
    ResponseContract,
    Timeout,
}

impl FailureKind {
    pub fn status_code(self) -> u16 {
        match self {
            FailureKind::ClientError => 400,
            FailureKind::NotFound => 404,
            FailureKind::ModuleLoad
            | FailureKind::ModuleInvalid
            | FailureKind::HandlerExecution
            | FailureKind::ResponseContract => 500,
            FailureKind::Timeout => 504,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::ClientError => "client_error",
            FailureKind::NotFound => "not_found",
            FailureKind::ModuleLoad => "module_load",
            FailureKind::ModuleInvalid => "module_invalid",
            FailureKind::HandlerExecution => "handler_execution",
            FailureKind::ResponseContract => "response_contract",
            FailureKind::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct Failure {
    pub kind: FailureKind,
    pub detail: String,
}

impl Failure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn client_error(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::ClientError, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, detail)
    }

    pub fn module_load(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::ModuleLoad, detail)
    }

    pub fn module_invalid(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::ModuleInvalid, detail)
    }

    pub fn handler_execution(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::HandlerExecution, detail)
    }

    pub fn response_contract(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::ResponseContract, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, detail)
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }
}

/// A validated handler result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerResponse {
    pub status_code: u16,
    /// Header pairs in declaration order; array values produce repeated names.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HandlerResponse {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Validates the `result` a handler passed to `completion`.
    ///
    /// The result must be an object with a numeric `statusCode` in `200..=999`.
    /// Informational 1xx codes are rejected: they cannot end an exchange.
    /// `headers` values may be strings, numbers, booleans or arrays of those.
    /// `body` must be a string, `null` or absent; with `isBase64Encoded: true`
    /// it is decoded from base64.
    pub fn from_value(result: &Value) -> Result<Self, Failure> {
        let object = result.as_object().ok_or_else(|| {
            Failure::response_contract(format!("result must be an object, got {}", type_name(result)))
        })?;

        let status_code = match object.get("statusCode") {
            Some(Value::Number(n)) => n
                .as_f64()
                .filter(|code| code.fract() == 0.0 && (200.0..=999.0).contains(code))
                .map(|code| code as u16)
                .ok_or_else(|| Failure::response_contract(format!("statusCode {} is not a valid HTTP status", n)))?,
            Some(other) => {
                return Err(Failure::response_contract(format!(
                    "statusCode must be a number, got {}",
                    type_name(other)
                )))
            }
            None => return Err(Failure::response_contract("no statusCode provided")),
        };

        let mut headers = Vec::new();
        match object.get("headers") {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (name, value) in map {
                    if !is_valid_header_name(name) {
                        return Err(Failure::response_contract(format!("invalid header name {:?}", name)));
                    }
                    let values = match value {
                        Value::Array(items) => items.iter().collect::<Vec<_>>(),
                        single => vec![single],
                    };
                    for item in values {
                        let text = header_text(item).ok_or_else(|| {
                            Failure::response_contract(format!(
                                "header {} has unsupported value type {}",
                                name,
                                type_name(item)
                            ))
                        })?;
                        if !is_valid_header_value(&text) {
                            return Err(Failure::response_contract(format!("invalid value for header {}", name)));
                        }
                        headers.push((name.clone(), text));
                    }
                }
            }
            Some(other) => {
                return Err(Failure::response_contract(format!(
                    "headers must be an object, got {}",
                    type_name(other)
                )))
            }
        }

        let is_base64_encoded = matches!(object.get("isBase64Encoded"), Some(Value::Bool(true)));
        let body = match object.get("body") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(text)) if is_base64_encoded => STANDARD
                .decode(text)
                .map_err(|e| Failure::response_contract(format!("body is not valid base64: {}", e)))?,
            Some(Value::String(text)) => text.clone().into_bytes(),
            Some(other) => {
                return Err(Failure::response_contract(format!(
                    "body must be a string, got {}",
                    type_name(other)
                )))
            }
        };

        Ok(Self {
            status_code,
            headers,
            body,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(HandlerResponse),
    Failure(Failure),
}

impl Outcome {
    pub fn status_code(&self) -> u16 {
        match self {
            Outcome::Success(response) => response.status_code,
            Outcome::Failure(failure) => failure.status_code(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Outcome::Failure(failure) => Some(failure),
            Outcome::Success(_) => None,
        }
    }
}

impl From<Failure> for Outcome {
    fn from(failure: Failure) -> Self {
        Outcome::Failure(failure)
    }
}

impl From<HandlerResponse> for Outcome {
    fn from(response: HandlerResponse) -> Self {
        Outcome::Success(response)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn header_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// RFC 9110 token characters.
fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
                )
        })
}

fn is_valid_header_value(value: &str) -> bool {
    value.bytes().all(|b| b == b'\t' || (b >= 0x20 && b != 0x7f))
}
