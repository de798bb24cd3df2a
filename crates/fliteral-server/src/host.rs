use fliteral_common::{Failure, InvocationEvent, Outcome, Result};
use fliteral_metrics::{MetricsSink, RequestRecord};
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::cache::ModuleCache;
use crate::config::ServerConfig;
use crate::engine::ExecutionEngine;
use crate::resolver::PathResolver;

/// fliteral function host - resolves, loads and runs function modules.
///
/// The host owns the process-wide [`ModuleCache`] and is shared by every
/// connection. It has no per-request state; each call to
/// [`invoke`](Self::invoke) creates its own invocation and Boa context, so
/// unrelated requests run fully in parallel.
pub struct FunctionHost {
    config: ServerConfig,
    resolver: PathResolver,
    engine: ExecutionEngine,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl FunctionHost {
    /// Creates a host serving the functions below `config.root`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the config is invalid or the root is
    /// not an existing directory.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let config = config.resolve()?;
        let resolver = PathResolver::new(config.root.clone(), config.descriptor_file.clone());
        let engine = ExecutionEngine::new(Arc::new(ModuleCache::new()));

        tracing::info!(root = %config.root.display(), timeout_ms = config.timeout.as_millis() as u64, "function host ready");

        Ok(Self {
            config,
            resolver,
            engine,
            metrics: None,
        })
    }

    /// Reports one [`RequestRecord`] per request to `sink`.
    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ModuleCache> {
        self.engine.cache()
    }

    /// Resolves the event's path and runs the function's handler.
    ///
    /// Resolution, loading and execution all count against `deadline`.
    pub async fn invoke(&self, event: &InvocationEvent, deadline: Instant) -> Outcome {
        let resolved = match timeout_at(deadline, self.resolver.resolve(event.normalized_path())).await {
            Ok(Ok(resolved)) => resolved,
            Ok(Err(failure)) => return failure.into(),
            Err(_) => return Failure::timeout("deadline elapsed during path resolution").into(),
        };

        debug!(request_id = %event.request_id(), key = %resolved.key.display(), "dispatching");
        self.engine
            .execute(resolved, event.to_handler_payload(), deadline)
            .await
    }

    /// Hands `record` to the metrics sink on the blocking pool.
    ///
    /// Never waits for the sink; a failing sink is logged and otherwise
    /// ignored.
    pub fn report(&self, record: RequestRecord) {
        let Some(sink) = self.metrics.clone() else {
            return;
        };

        tokio::task::spawn_blocking(move || {
            if let Err(e) = sink.record(&record) {
                warn!(path = %record.path, error = %e, "metrics sink failed");
            }
        });
    }
}
