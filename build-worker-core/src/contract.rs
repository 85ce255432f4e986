//! # contract: trait seams between the run controller and its collaborators
//!
//! The run controller never spawns processes, talks to git or reaches an object store
//! directly. It goes through the three traits defined here:
//!
//! - [`BuildInvoker`]: runs the install+build command and reports its exit code.
//! - [`Uploader`]: stores one object (bucket, key, bytes, content type).
//! - [`SourceFetcher`]: materialises a source repository into a working directory.
//!
//! ## Mocking & Testing
//! - Each trait is annotated for `mockall`; with the `test-export-mocks` feature (on by
//!   default) downstream crates get `MockBuildInvoker`, `MockUploader` and
//!   `MockSourceFetcher` for their own tests.
//!
//! ## Errors
//! Every seam has its own `thiserror` enum so callers can tell a failed spawn from a
//! non-zero exit, or a rejected put from a misaddressed one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal signal of a build invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildStatus {
    /// Process exit code. `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl BuildStatus {
    pub fn from_code(code: i32) -> Self {
        Self {
            exit_code: Some(code),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to spawn build command `{command}` in {}: {source}", working_dir.display())]
    Spawn {
        command: String,
        working_dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed while waiting for build command `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs the project's install+build command.
///
/// Implementations may stream output however they like; the run controller only
/// consumes the returned [`BuildStatus`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BuildInvoker: Send + Sync {
    async fn run(&self, command: &str, working_dir: &Path) -> Result<BuildStatus, BuildError>;
}

/// A single object to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObject {
    pub bucket: String,
    /// Store key, always forward-slash separated.
    pub key: String,
    pub content: Bytes,
    pub content_type: String,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("uploader is bound to bucket `{expected}` but the object was addressed to `{requested}`")]
    BucketMismatch { expected: String, requested: String },
    #[error("invalid object key `{key}`: {reason}")]
    InvalidKey { key: String, reason: String },
    #[error("store rejected `{key}`: {reason}")]
    Store { key: String, reason: String },
    #[error("store configuration error: {0}")]
    Config(String),
}

/// Object store capability: durably store bytes under a key with a content type.
///
/// No retry or backoff is expected from implementors; a failed put is reported
/// once and recorded against the file that produced it.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn put(&self, object: PutObject) -> Result<(), UploadError>;
}

/// Describes a Git repository to build from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSource {
    pub repo_url: String,
    /// Branch, tag or commit. Defaults to `main`.
    #[serde(default)]
    pub reference: Option<String>,
}

impl GitSource {
    pub fn reference(&self) -> &str {
        self.reference.as_deref().unwrap_or("main")
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to prepare {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to launch git {step}: {source}")]
    Spawn {
        step: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("git {step} for {repo_url} exited with {status}")]
    Git {
        step: &'static str,
        repo_url: String,
        status: String,
    },
}

/// Materialises a source repository at `dest`, returning the checkout path.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &GitSource, dest: &Path) -> Result<PathBuf, FetchError>;
}
