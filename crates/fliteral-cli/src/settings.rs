//! Flag, environment and default resolution for the CLI.
//!
//! | Setting | Flag | Environment | Default |
//! |---------|------|-------------|---------|
//! | function root | `--root` | `LITERAL_PATH` | `./functions` |
//! | port | `--port` | `PORT` | `8080` |
//! | bind host | `--host` | `FLITERAL_HOST` | `0.0.0.0` |
//! | timeout | `--timeout-ms` | `FLITERAL_TIMEOUT_MS` | `60000` |
//! | stage | `--stage` | `STAGE` | `test` |
//! | metrics file | `--metrics-file` | `FLITERAL_METRICS_FILE` | none |

use anyhow::{anyhow, Context, Result};
use fliteral_server::config::{DEFAULT_MAX_BODY_BYTES, DEFAULT_STAGE, DEFAULT_TIMEOUT};
use fliteral_server::ServerConfig;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_ROOT: &str = "LITERAL_PATH";
pub const ENV_PORT: &str = "PORT";
pub const ENV_HOST: &str = "FLITERAL_HOST";
pub const ENV_TIMEOUT_MS: &str = "FLITERAL_TIMEOUT_MS";
pub const ENV_STAGE: &str = "STAGE";
pub const ENV_METRICS_FILE: &str = "FLITERAL_METRICS_FILE";

pub const DEFAULT_ROOT: &str = "./functions";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root: Option<String>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub timeout_ms: Option<u64>,
    pub stage: Option<String>,
    pub max_body_bytes: Option<usize>,
    pub metrics_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub root: PathBuf,
    pub addr: SocketAddr,
    pub timeout: Duration,
    pub stage: String,
    pub max_body_bytes: usize,
    pub metrics_file: Option<PathBuf>,
}

impl Settings {
    /// Resolves every setting as flag > environment > default.
    ///
    /// `env` looks up one environment variable; pass `|k| std::env::var(k).ok()`
    /// in production.
    pub fn resolve<F>(overrides: Overrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = overrides
            .root
            .or_else(|| env(ENV_ROOT))
            .unwrap_or_else(|| DEFAULT_ROOT.to_string());

        let port = match overrides.port {
            Some(port) => port,
            None => parse_env(&env, ENV_PORT)?.unwrap_or(DEFAULT_PORT),
        };

        let host = overrides
            .host
            .or_else(|| env(ENV_HOST))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let ip = IpAddr::from_str(&host).map_err(|e| anyhow!("Invalid bind host {}: {}", host, e))?;

        let timeout = match overrides.timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => parse_env::<u64, _>(&env, ENV_TIMEOUT_MS)?
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TIMEOUT),
        };

        let stage = overrides
            .stage
            .or_else(|| env(ENV_STAGE))
            .unwrap_or_else(|| DEFAULT_STAGE.to_string());

        let metrics_file = overrides
            .metrics_file
            .or_else(|| env(ENV_METRICS_FILE))
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            root: PathBuf::from(root),
            addr: SocketAddr::new(ip, port),
            timeout,
            stage,
            max_body_bytes: overrides.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES),
            metrics_file,
        })
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new(&self.root)
            .with_timeout(self.timeout)
            .with_stage(&self.stage)
            .with_max_body_bytes(self.max_body_bytes)
    }
}

fn parse_env<T, F>(env: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid {}={:?}", key, raw)),
        _ => Ok(None),
    }
}
