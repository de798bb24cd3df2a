// Copyright 2025 fliteral Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::registry::{MetricsConfig, MetricsRegistry};
use crate::sink::{MetricsError, MetricsSink, RequestRecord};
use crate::snapshot::MetricsSnapshot;
use std::sync::Arc;

/// In-process metrics sink.
///
/// `RequestMetricsCollector` aggregates completion records into per-path call
/// counts, success/failure/timeout rates and latency percentiles (P50, P95,
/// P99). It never fails, so it is safe to put first in a
/// [`FanoutSink`](crate::FanoutSink).
///
/// # Example
///
/// ```rust
/// use fliteral_metrics::{MetricsSink, RequestMetricsCollector, RequestRecord};
/// use std::time::Duration;
///
/// let collector = RequestMetricsCollector::new();
/// collector.record(&RequestRecord::new("/echotest", Duration::from_millis(4), false, 200)).unwrap();
/// collector.record(&RequestRecord::new("/echotest", Duration::from_millis(9), false, 500)).unwrap();
///
/// let snapshot = collector.snapshot();
/// assert_eq!(snapshot.paths["/echotest"].call_count, 2);
/// assert_eq!(snapshot.failed_requests, 1);
/// ```
#[derive(Debug, Clone)]
pub struct RequestMetricsCollector {
    registry: Arc<MetricsRegistry>,
}

impl RequestMetricsCollector {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(MetricsRegistry::new()))
    }

    /// Creates a collector with custom limits on tracked paths.
    pub fn with_config(config: MetricsConfig) -> Self {
        Self::with_registry(Arc::new(MetricsRegistry::with_config(config)))
    }

    /// Shares an existing registry, e.g. between a server and a test.
    pub fn with_registry(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.registry.snapshot()
    }
}

impl Default for RequestMetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for RequestMetricsCollector {
    fn record(&self, record: &RequestRecord) -> Result<(), MetricsError> {
        self.registry.record(record);
        Ok(())
    }
}
