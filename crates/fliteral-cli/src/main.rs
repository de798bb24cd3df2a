//! # fliteral CLI Entry Point
//!
//! Main binary for the fliteral local function runner.
//!
//! ## Usage
//!
//! ```bash
//! # Serve ./functions on 0.0.0.0:8080
//! fliteral serve
//!
//! # Serve another root with a 5 second deadline
//! fliteral serve --root ./my-functions --port 3000 --timeout-ms 5000
//!
//! # Run one request without starting a server (outputs raw JSON)
//! fliteral invoke /echotest?foo=1 --method POST --body '{"name":"Manny"}'
//! ```

use anyhow::{Context, Result};
use argh::FromArgs;
use fliteral_cli::invoke::{invoke, parse_header, InvokeRequest};
use fliteral_cli::settings::{Overrides, Settings};
use fliteral_metrics::{FanoutSink, JsonLinesSink, MetricsSink, RequestMetricsCollector, TracingSink};
use fliteral_server::{FunctionHost, HttpServer};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// fliteral - run a directory of JavaScript functions as HTTP endpoints
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Serve**: start the HTTP server
/// - **Invoke**: run a single request in-process (unix-friendly JSON output)
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Invoke(InvokeArgs),
}

/// Arguments for serving a function root.
///
/// Every option falls back to its environment variable, then to a default.
///
/// # Example
///
/// ```bash
/// LITERAL_PATH=./functions PORT=3000 fliteral serve --stage dev
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// serve a function root over HTTP
struct ServeArgs {
    /// directory holding one sub-directory per function
    /// (env LITERAL_PATH, default ./functions)
    #[argh(option, short = 'r')]
    root: Option<String>,

    /// port to listen on (env PORT, default 8080)
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// address to bind to (env FLITERAL_HOST, default 0.0.0.0)
    #[argh(option)]
    host: Option<String>,

    /// per-request deadline in milliseconds, measured from arrival
    /// (env FLITERAL_TIMEOUT_MS, default 60000)
    #[argh(option, long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// stage reported to handlers in requestContext (env STAGE, default test)
    #[argh(option)]
    stage: Option<String>,

    /// maximum request body size in bytes (default 6 MiB)
    #[argh(option, long = "max-body-bytes")]
    max_body_bytes: Option<usize>,

    /// append one JSON line per request to this file
    /// (env FLITERAL_METRICS_FILE)
    #[argh(option, long = "metrics-file")]
    metrics_file: Option<String>,
}

/// Arguments for a one-shot invocation.
///
/// The response is printed to stdout as `{status, headers, body}`; logs go to
/// stderr at `warn` unless `RUST_LOG` says otherwise.
#[derive(FromArgs)]
#[argh(subcommand, name = "invoke")]
/// run one request through the pipeline and print the response as JSON
struct InvokeArgs {
    /// request path, optionally with a query string (e.g. /echotest?foo=1)
    #[argh(positional)]
    path: String,

    /// function root (env LITERAL_PATH, default ./functions)
    #[argh(option, short = 'r')]
    root: Option<String>,

    /// HTTP method (default GET)
    #[argh(option, short = 'm', default = "\"GET\".into()")]
    method: String,

    /// request body
    #[argh(option, short = 'b')]
    body: Option<String>,

    /// request header as name:value, may be repeated
    #[argh(option, short = 'H', long = "header")]
    headers: Vec<String>,

    /// deadline in milliseconds (env FLITERAL_TIMEOUT_MS, default 60000)
    #[argh(option, long = "timeout-ms")]
    timeout_ms: Option<u64>,
}

fn init_tracing(default_level: &str, to_stderr: bool) {
    // Default level for the command, but allow RUST_LOG env var to override
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if to_stderr {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

/// Routes panics through tracing so they show up next to request logs.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        tracing::error!(panic = %info, "unhandled panic");
    }));
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    match cli.command {
        Commands::Serve(args) => {
            init_tracing("info", false);
            install_panic_hook();
            run_serve(args).await
        }
        Commands::Invoke(args) => {
            // Keep stdout clean for piping into jq and friends
            init_tracing("warn", true);
            install_panic_hook();
            run_invoke(args).await
        }
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let overrides = Overrides {
        root: args.root,
        port: args.port,
        host: args.host,
        timeout_ms: args.timeout_ms,
        stage: args.stage,
        max_body_bytes: args.max_body_bytes,
        metrics_file: args.metrics_file,
    };
    let settings = Settings::resolve(overrides, env_lookup)?;

    tracing::info!("Serving functions from: {}", settings.root.display());
    tracing::info!("Stage: {}, timeout: {}ms", settings.stage, settings.timeout.as_millis());

    let collector = RequestMetricsCollector::new();
    let mut sink = FanoutSink::new()
        .with_sink(Arc::new(collector.clone()))
        .with_sink(Arc::new(TracingSink));
    if let Some(path) = &settings.metrics_file {
        let lines = JsonLinesSink::open(path)
            .with_context(|| format!("Failed to open metrics file {}", path.display()))?;
        tracing::info!("Writing request metrics to {}", path.display());
        sink = sink.with_sink(Arc::new(lines));
    }
    let sink: Arc<dyn MetricsSink> = Arc::new(sink);

    let host = FunctionHost::new(settings.server_config())?.with_metrics(sink);
    let server = HttpServer::new(Arc::new(host));

    tokio::select! {
        result = server.run(settings.addr) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    let snapshot = collector.snapshot();
    tracing::info!(
        total = snapshot.total_requests,
        successful = snapshot.successful_requests,
        failed = snapshot.failed_requests,
        timed_out = snapshot.timed_out_requests,
        "Request summary"
    );
    for (path, metrics) in snapshot.busiest_paths().into_iter().take(10) {
        tracing::info!(
            path,
            calls = metrics.call_count,
            p50_us = metrics.p50_latency_us,
            p99_us = metrics.p99_latency_us,
            "Path summary"
        );
    }

    Ok(())
}

async fn run_invoke(args: InvokeArgs) -> Result<()> {
    let overrides = Overrides {
        root: args.root,
        timeout_ms: args.timeout_ms,
        ..Default::default()
    };
    let settings = Settings::resolve(overrides, env_lookup)?;

    let headers = args
        .headers
        .iter()
        .map(|raw| parse_header(raw))
        .collect::<Result<Vec<_>>>()?;

    let host = Arc::new(FunctionHost::new(settings.server_config())?);
    let request = InvokeRequest {
        target: args.path,
        method: args.method,
        headers,
        body: args.body,
    };
    let output = invoke(host, request).await?;

    // Output raw JSON to stdout
    println!("{}", serde_json::to_string(&output)?);

    Ok(())
}
