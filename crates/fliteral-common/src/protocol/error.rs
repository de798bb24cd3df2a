use thiserror::Error;

/// Infrastructure errors raised outside of request handling.
///
/// Request-level problems never use this type: they are reported as a
/// [`Failure`](crate::Failure) and translated into a status code.
#[derive(Error, Debug)]
pub enum FliteralError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("JavaScript execution error: {0}")]
    JavaScriptExecution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<std::net::AddrParseError> for FliteralError {
    fn from(err: std::net::AddrParseError) -> Self {
        FliteralError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FliteralError>;
