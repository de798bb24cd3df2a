//! Server configuration.
//!
//! [`ServerConfig`] carries everything the request pipeline needs: the
//! function root, the per-request deadline, the stage reported to handlers,
//! the request body limit and the identity served at `/`.

use fliteral_common::{FliteralError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(3600);
pub const DEFAULT_STAGE: &str = "test";
pub const DEFAULT_MAX_BODY_BYTES: usize = 6 * 1024 * 1024;
pub const DEFAULT_DESCRIPTOR_FILE: &str = "package.json";

/// Name and version reported by `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub name: String,
    pub version: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: "fliteral".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Configuration for a [`FunctionHost`](crate::FunctionHost).
///
/// # Example
///
/// ```no_run
/// use fliteral_server::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::new("./functions")
///     .with_timeout(Duration::from_secs(5))
///     .with_stage("dev");
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Directory holding one sub-directory per function
    pub root: PathBuf,
    /// Deadline for a whole request, measured from arrival
    pub timeout: Duration,
    pub stage: String,
    pub max_body_bytes: usize,
    /// File that marks a directory as a function
    pub descriptor_file: String,
    pub identity: Identity,
}

impl ServerConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            timeout: DEFAULT_TIMEOUT,
            stage: DEFAULT_STAGE.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            descriptor_file: DEFAULT_DESCRIPTOR_FILE.to_string(),
            identity: Identity::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn with_descriptor_file(mut self, descriptor_file: impl Into<String>) -> Self {
        self.descriptor_file = descriptor_file.into();
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// Checks the configuration without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`FliteralError::Config`] if:
    /// - the timeout is zero or longer than one hour
    /// - the body limit is zero
    /// - the descriptor file name is empty or contains a path separator
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(FliteralError::Config(
                "timeout must be greater than zero".to_string(),
            ));
        }

        if self.timeout > MAX_TIMEOUT {
            return Err(FliteralError::Config(format!(
                "timeout must be <= 1 hour (got {} seconds)",
                self.timeout.as_secs()
            )));
        }

        if self.max_body_bytes == 0 {
            return Err(FliteralError::Config(
                "max body size must be greater than zero".to_string(),
            ));
        }

        if self.descriptor_file.is_empty()
            || self.descriptor_file.contains(['/', '\\'])
            || Path::new(&self.descriptor_file) == Path::new("..")
        {
            return Err(FliteralError::Config(format!(
                "descriptor file must be a plain file name (got {:?})",
                self.descriptor_file
            )));
        }

        Ok(())
    }

    /// Validates the configuration and canonicalises `root`.
    ///
    /// # Errors
    ///
    /// Fails like [`validate`](Self::validate), or if the root does not exist
    /// or is not a directory.
    pub fn resolve(mut self) -> Result<Self> {
        self.validate()?;

        let root = std::fs::canonicalize(&self.root).map_err(|e| {
            FliteralError::Config(format!("function root {}: {}", self.root.display(), e))
        })?;
        if !root.is_dir() {
            return Err(FliteralError::Config(format!(
                "function root {} is not a directory",
                root.display()
            )));
        }

        self.root = root;
        Ok(self)
    }
}
