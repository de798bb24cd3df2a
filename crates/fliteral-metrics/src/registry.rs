use crate::sink::RequestRecord;
use crate::snapshot::{MetricsSnapshot, PathMetrics};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Instant, SystemTime};

/// Ten bins per decade, ten decades: 1µs up to ~3 hours.
const NUM_HISTOGRAM_BINS: usize = 100;

const CLEANUP_INTERVAL: u64 = 1000;

static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Strictly increasing wall-clock milliseconds, used to order path entries for
/// LRU eviction. Falls back to the previous value + 1 if the clock is before
/// the epoch.
fn monotonic_timestamp_ms() -> u64 {
    let wall = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let mut last = LAST_TIMESTAMP.load(Ordering::Acquire);
    loop {
        let next = wall.max(last + 1);
        match LAST_TIMESTAMP.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Acquire) {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}

/// Limits on how much per-path state the registry keeps.
///
/// ```rust
/// use fliteral_metrics::MetricsConfig;
///
/// let config = MetricsConfig {
///     max_paths: 200,
///     path_ttl_secs: 600,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Least-recently-used paths are evicted beyond this count.
    pub max_paths: usize,
    /// Paths not requested within this window are dropped at cleanup.
    pub path_ttl_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            max_paths: 1000,
            path_ttl_secs: 3600,
        }
    }
}

/// Logarithmic latency histogram.
///
/// A sample of `v` microseconds lands in bin `decade(v) * 10 + leading_digit(v)`,
/// so each decade is split by its leading digit. Percentiles interpolate
/// linearly inside the bin that contains the target rank.
#[derive(Debug)]
pub(crate) struct LatencyHistogram {
    bins: [AtomicU64; NUM_HISTOGRAM_BINS],
    total_latency_us: AtomicU64,
    sample_count: AtomicU64,
}

impl LatencyHistogram {
    pub(crate) fn new() -> Self {
        Self {
            bins: std::array::from_fn(|_| AtomicU64::new(0)),
            total_latency_us: AtomicU64::new(0),
            sample_count: AtomicU64::new(0),
        }
    }

    pub(crate) fn record(&self, latency_us: u64) {
        self.bins[Self::bin_for(latency_us)].fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.sample_count.fetch_add(1, Ordering::Relaxed);
    }

    fn bin_for(latency_us: u64) -> usize {
        if latency_us == 0 {
            return 0;
        }
        let decade = latency_us.ilog10() as usize;
        let leading = (latency_us / 10u64.pow(decade as u32)) as usize;
        (decade * 10 + leading).min(NUM_HISTOGRAM_BINS - 1)
    }

    /// Inclusive lower bound of a bin, in microseconds.
    fn bin_floor(bin: usize) -> u64 {
        let decade = (bin / 10) as u32;
        let leading = (bin % 10) as u64;
        if leading == 0 {
            // Unused slot; pin to the decade start so interpolation stays monotonic
            10u64.saturating_pow(decade)
        } else {
            leading.saturating_mul(10u64.saturating_pow(decade))
        }
    }

    fn bin_ceiling(bin: usize) -> u64 {
        if bin % 10 == 9 {
            10u64.saturating_pow((bin / 10) as u32 + 1)
        } else {
            Self::bin_floor(bin + 1)
        }
    }

    pub(crate) fn percentile(&self, percentile: u64) -> u64 {
        let total = self.sample_count.load(Ordering::Relaxed);
        if total == 0 {
            return 0;
        }

        let target = ((total * percentile) + 99) / 100;
        let mut seen = 0;
        for (bin, count) in self.bins.iter().enumerate() {
            let count = count.load(Ordering::Relaxed);
            if count == 0 {
                continue;
            }
            if seen + count >= target {
                let floor = Self::bin_floor(bin);
                let ceiling = Self::bin_ceiling(bin);
                let fraction = (target - seen) as f64 / count as f64;
                return floor + (fraction * (ceiling - floor) as f64) as u64;
            }
            seen += count;
        }
        Self::bin_ceiling(NUM_HISTOGRAM_BINS - 1)
    }

    pub(crate) fn average(&self) -> u64 {
        let total = self.sample_count.load(Ordering::Relaxed);
        if total == 0 {
            return 0;
        }
        self.total_latency_us.load(Ordering::Relaxed) / total
    }
}

#[derive(Debug)]
struct PathStats {
    call_count: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    timeout_count: AtomicU64,
    latencies: LatencyHistogram,
    last_access_ms: AtomicU64,
}

impl PathStats {
    fn new() -> Self {
        Self {
            call_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            timeout_count: AtomicU64::new(0),
            latencies: LatencyHistogram::new(),
            last_access_ms: AtomicU64::new(monotonic_timestamp_ms()),
        }
    }

    fn record(&self, record: &RequestRecord, latency_us: u64) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if record.is_success() {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        if record.timed_out {
            self.timeout_count.fetch_add(1, Ordering::Relaxed);
        }
        self.latencies.record(latency_us);
        self.last_access_ms.store(monotonic_timestamp_ms(), Ordering::Relaxed);
    }

    fn snapshot(&self) -> PathMetrics {
        PathMetrics {
            call_count: self.call_count.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            timeout_count: self.timeout_count.load(Ordering::Relaxed),
            avg_latency_us: self.latencies.average(),
            p50_latency_us: self.latencies.percentile(50),
            p95_latency_us: self.latencies.percentile(95),
            p99_latency_us: self.latencies.percentile(99),
        }
    }
}

/// Process-wide request counters plus per-path statistics.
///
/// Counters are relaxed atomics; snapshots are eventually consistent. The path
/// map sits behind an `RwLock` that is only held to look up or insert an
/// entry. Every 1000 records, stale paths are dropped and the
/// map is trimmed to `max_paths` by last access.
///
/// ```rust
/// use fliteral_metrics::{MetricsRegistry, RequestRecord};
/// use std::time::Duration;
///
/// let registry = MetricsRegistry::new();
/// registry.record(&RequestRecord::new("/echotest", Duration::from_millis(3), false, 200));
/// assert_eq!(registry.snapshot().total_requests, 1);
/// ```
#[derive(Debug)]
pub struct MetricsRegistry {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    timed_out_requests: AtomicU64,
    paths: RwLock<HashMap<String, Arc<PathStats>>>,
    start_time: Instant,
    config: MetricsConfig,
    cleanup_counter: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_config(MetricsConfig::default())
    }

    pub fn with_config(config: MetricsConfig) -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            timed_out_requests: AtomicU64::new(0),
            paths: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
            config,
            cleanup_counter: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn record(&self, record: &RequestRecord) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if record.is_success() {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        if record.timed_out {
            self.timed_out_requests.fetch_add(1, Ordering::Relaxed);
        }

        self.maybe_cleanup();

        let existing = self.read_paths().get(&record.path).cloned();
        let stats = match existing {
            Some(stats) => stats,
            None => self
                .write_paths()
                .entry(record.path.clone())
                .or_insert_with(|| Arc::new(PathStats::new()))
                .clone(),
        };

        let latency_us = u64::try_from(record.duration.as_micros()).unwrap_or(u64::MAX);
        stats.record(record, latency_us);
    }

    fn maybe_cleanup(&self) {
        let count = self.cleanup_counter.fetch_add(1, Ordering::Relaxed);
        if count % CLEANUP_INTERVAL == 0 {
            self.cleanup_stale_paths();
        }
    }

    /// Drops paths idle past the TTL, then evicts least-recently-used paths
    /// until at most `max_paths` remain.
    pub fn cleanup_stale_paths(&self) {
        let now = monotonic_timestamp_ms();
        let ttl_ms = self.config.path_ttl_secs.saturating_mul(1000);
        let mut paths = self.write_paths();

        paths.retain(|_, stats| now.saturating_sub(stats.last_access_ms.load(Ordering::Relaxed)) < ttl_ms);

        if paths.len() > self.config.max_paths {
            let mut by_age: Vec<(String, u64)> = paths
                .iter()
                .map(|(path, stats)| (path.clone(), stats.last_access_ms.load(Ordering::Relaxed)))
                .collect();
            by_age.sort_by_key(|&(_, last_access)| last_access);

            let excess = by_age.len() - self.config.max_paths;
            for (path, _) in by_age.into_iter().take(excess) {
                paths.remove(&path);
            }
        }
    }

    pub fn uptime_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let paths = self
            .read_paths()
            .iter()
            .map(|(path, stats)| (path.clone(), stats.snapshot()))
            .collect();

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            timed_out_requests: self.timed_out_requests.load(Ordering::Relaxed),
            uptime_ms: self.uptime_ms(),
            paths,
        }
    }

    // A panic while holding the lock cannot leave a half-built entry behind,
    // so poisoned guards are recovered rather than propagated.
    fn read_paths(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<PathStats>>> {
        self.paths.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_paths(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<PathStats>>> {
        self.paths.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
