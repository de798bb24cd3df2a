//! Metrics sinks.
//!
//! A sink is told about each finished request exactly once, after the
//! response is committed. Sinks are synchronous; the server dispatches them on
//! the blocking pool so file or network I/O never stalls a connection task.

use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Completion record for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub path: String,
    #[serde(rename = "durationMs", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub timed_out: bool,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl RequestRecord {
    pub fn new(path: impl Into<String>, duration: Duration, timed_out: bool, status: u16) -> Self {
        Self {
            path: path.into(),
            duration,
            timed_out,
            status,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// 1xx-3xx responses count as successes; everything else, including
    /// timeouts, is a failure.
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.status < 400
    }
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_micros() as f64 / 1000.0)
}

/// Receives per-request completion records.
pub trait MetricsSink: Send + Sync {
    fn record(&self, record: &RequestRecord) -> Result<(), MetricsError>;
}

impl<T: MetricsSink + ?Sized> MetricsSink for Arc<T> {
    fn record(&self, record: &RequestRecord) -> Result<(), MetricsError> {
        (**self).record(record)
    }
}

/// Emits one structured `info` event per request.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record(&self, record: &RequestRecord) -> Result<(), MetricsError> {
        info!(
            target: "fliteral::metrics",
            path = %record.path,
            duration_ms = record.duration.as_micros() as f64 / 1000.0,
            timed_out = record.timed_out,
            status = record.status,
            request_id = record.request_id.as_deref().unwrap_or("-"),
            "request completed"
        );
        Ok(())
    }
}

/// Appends one JSON object per request to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MetricsError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for JsonLinesSink {
    fn record(&self, record: &RequestRecord) -> Result<(), MetricsError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| MetricsError::Unavailable(format!("{} writer poisoned", self.path.display())))?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

/// Forwards every record to each inner sink.
///
/// All sinks are attempted even when one fails; the first error is returned.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl MetricsSink for FanoutSink {
    fn record(&self, record: &RequestRecord) -> Result<(), MetricsError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(record) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
