//! Path Resolver
//!
//! Maps a normalised request path onto a function directory below the root.
//! Traversal attempts are rejected before the filesystem is touched.

use fliteral_common::Failure;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// A function directory that exists and carries a descriptor file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFunction {
    /// Canonical directory path; the module cache key
    pub key: PathBuf,
    pub descriptor_path: PathBuf,
    /// Descriptor modification time observed during this resolution
    pub modified: SystemTime,
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    descriptor_file: String,
}

impl PathResolver {
    /// `root` must already be canonical.
    pub fn new(root: impl Into<PathBuf>, descriptor_file: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            descriptor_file: descriptor_file.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Splits a normalised path into directory segments.
    ///
    /// Fails with `ClientError` on `..`, backslashes or NUL bytes, and with
    /// `NotFound` when nothing is left to resolve.
    pub fn segments(path: &str) -> Result<Vec<&str>, Failure> {
        let mut segments = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(Failure::client_error(format!(
                        "path traversal rejected: {}",
                        path
                    )))
                }
                s if s.contains(['\\', '\0']) => {
                    return Err(Failure::client_error(format!(
                        "illegal character in path segment {:?}",
                        s
                    )))
                }
                s => segments.push(s),
            }
        }

        if segments.is_empty() {
            return Err(Failure::not_found(format!("no function at {}", path)));
        }
        Ok(segments)
    }

    pub async fn resolve(&self, path: &str) -> Result<ResolvedFunction, Failure> {
        let segments = Self::segments(path)?;
        let directory = segments
            .iter()
            .fold(self.root.clone(), |dir, segment| dir.join(segment));
        let descriptor = directory.join(&self.descriptor_file);

        let metadata = tokio::fs::metadata(&descriptor)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::NotADirectory => Failure::not_found(format!(
                    "no {} in {}",
                    self.descriptor_file,
                    directory.display()
                )),
                _ => Failure::module_load(format!("stat {} failed: {}", descriptor.display(), e)),
            })?;

        if !metadata.is_file() {
            return Err(Failure::module_invalid(format!(
                "{} is not a regular file",
                descriptor.display()
            )));
        }

        let modified = metadata.modified().map_err(|e| {
            Failure::module_load(format!("no modification time for {}: {}", descriptor.display(), e))
        })?;

        let key = tokio::fs::canonicalize(&directory).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => Failure::not_found(format!("{} disappeared", directory.display())),
            _ => Failure::module_load(format!("canonicalize {} failed: {}", directory.display(), e)),
        })?;

        // Symlinks may point anywhere; only serve what lives under the root
        if !key.starts_with(&self.root) {
            return Err(Failure::client_error(format!(
                "{} resolves outside the function root",
                path
            )));
        }

        debug!(path, key = %key.display(), "resolved function");
        Ok(ResolvedFunction {
            descriptor_path: key.join(&self.descriptor_file),
            key,
            modified,
        })
    }
}
