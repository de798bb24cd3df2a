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

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Aggregated metrics for one request path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMetrics {
    pub call_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub timeout_count: u64,
    pub avg_latency_us: u64,
    pub p50_latency_us: u64,
    pub p95_latency_us: u64,
    pub p99_latency_us: u64,
}

/// Complete metrics snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub timed_out_requests: u64,
    pub uptime_ms: u64,
    pub paths: HashMap<String, PathMetrics>,
}

impl MetricsSnapshot {
    /// Paths ordered by call count, busiest first.
    pub fn busiest_paths(&self) -> Vec<(&str, &PathMetrics)> {
        let mut paths: Vec<_> = self
            .paths
            .iter()
            .map(|(path, metrics)| (path.as_str(), metrics))
            .collect();
        paths.sort_by(|a, b| b.1.call_count.cmp(&a.1.call_count).then(a.0.cmp(b.0)));
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busiest_paths_order() {
        let mut snapshot = MetricsSnapshot::default();
        for (path, calls) in [("/b", 3), ("/a", 3), ("/c", 10)] {
            snapshot.paths.insert(
                path.to_string(),
                PathMetrics {
                    call_count: calls,
                    ..Default::default()
                },
            );
        }

        let order: Vec<_> = snapshot.busiest_paths().into_iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec!["/c", "/a", "/b"]);
    }

    #[test]
    fn test_snapshot_serializes() {
        let value = serde_json::to_value(MetricsSnapshot::default()).unwrap();
        assert_eq!(value["total_requests"], 0);
        assert!(value["paths"].as_object().unwrap().is_empty());
    }
}
