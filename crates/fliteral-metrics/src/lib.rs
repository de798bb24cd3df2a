//! fliteral Metrics
//!
//! This crate receives one completion record per HTTP request served by the
//! function host and forwards it to any number of sinks. Reporting happens
//! after the response has been committed, so a failing sink never affects the
//! client.
//!
//! # Architecture
//!
//! - [`MetricsSink`]: the fire-and-forget interface the server reports into
//! - [`RequestRecord`]: `{path, duration, timed_out, status}` for one request
//! - [`RequestMetricsCollector`]: in-process aggregation with per-path latency
//!   percentiles, backed by a [`MetricsRegistry`]
//! - [`TracingSink`], [`JsonLinesSink`], [`FanoutSink`]: shipping and fan-out
//!
//! # Usage Example
//!
//! ```rust
//! use fliteral_metrics::{MetricsSink, RequestMetricsCollector, RequestRecord};
//! use std::time::Duration;
//!
//! let collector = RequestMetricsCollector::new();
//! let record = RequestRecord::new("/helloworld", Duration::from_millis(12), false, 200);
//! collector.record(&record).unwrap();
//!
//! let snapshot = collector.snapshot();
//! assert_eq!(snapshot.total_requests, 1);
//! assert_eq!(snapshot.paths["/helloworld"].success_count, 1);
//! ```

pub mod collector;
pub mod registry;
pub mod sink;
pub mod snapshot;

pub use collector::RequestMetricsCollector;
pub use registry::{MetricsConfig, MetricsRegistry};
pub use sink::{FanoutSink, JsonLinesSink, MetricsError, MetricsSink, RequestRecord, TracingSink};
pub use snapshot::{MetricsSnapshot, PathMetrics};
