//! Git-backed [`SourceFetcher`]: clones the project to build into the working directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::contract::{FetchError, GitSource, SourceFetcher};

#[derive(Debug, Default, Clone)]
pub struct GitFetcher;

impl GitFetcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch(&self, source: &GitSource, dest: &Path) -> Result<PathBuf, FetchError> {
        let repo_url = &source.repo_url;
        let reference = source.reference();

        // If dest exists, remove it for a clean clone
        if fs::try_exists(dest).await.unwrap_or(false) {
            fs::remove_dir_all(dest).await.map_err(|e| {
                error!(error = ?e, path = %dest.display(), "[FETCH][ERROR] Failed to remove existing checkout");
                FetchError::Io {
                    path: dest.to_path_buf(),
                    source: e,
                }
            })?;
            debug!(path = %dest.display(), "[FETCH] Removed existing checkout");
        } else if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                error!(error = ?e, path = %parent.display(), "[FETCH][ERROR] Failed to create parent directory");
                FetchError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                }
            })?;
        }

        // `git clone <repo_url> <dest>`
        let status = Command::new("git")
            .arg("clone")
            .arg(repo_url)
            .arg(dest)
            .status()
            .await;
        match status {
            Ok(s) if s.success() => {
                info!(repo_url = %repo_url, path = %dest.display(), "[FETCH] Cloned git repository");
            }
            Ok(s) => {
                error!(repo_url = %repo_url, path = %dest.display(), "[FETCH][ERROR] git clone exited with {s}");
                return Err(FetchError::Git {
                    step: "clone",
                    repo_url: repo_url.clone(),
                    status: s.to_string(),
                });
            }
            Err(e) => {
                error!(error = ?e, repo_url = %repo_url, "[FETCH][ERROR] Failed to launch git clone");
                return Err(FetchError::Spawn {
                    step: "clone",
                    source: e,
                });
            }
        }

        // Then check out the requested branch, tag or commit
        let status = Command::new("git")
            .arg("-C")
            .arg(dest)
            .arg("checkout")
            .arg(reference)
            .status()
            .await;
        match status {
            Ok(s) if s.success() => {
                info!(repo_url = %repo_url, reference, "[FETCH] Checked out git reference");
                Ok(dest.to_path_buf())
            }
            Ok(s) => {
                error!(repo_url = %repo_url, reference, "[FETCH][ERROR] git checkout exited with {s}");
                Err(FetchError::Git {
                    step: "checkout",
                    repo_url: repo_url.clone(),
                    status: s.to_string(),
                })
            }
            Err(e) => {
                error!(error = ?e, repo_url = %repo_url, "[FETCH][ERROR] Failed to launch git checkout");
                Err(FetchError::Spawn {
                    step: "checkout",
                    source: e,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn fetching_a_nonexistent_repository_fails() {
        let tmp = tempdir().unwrap();
        let source = GitSource {
            repo_url: tmp.path().join("no-such-repo").display().to_string(),
            reference: None,
        };
        let dest = tmp.path().join("checkout");

        let result = GitFetcher::new().fetch(&source, &dest).await;

        // Either git is missing (spawn error) or the clone fails; never a checkout.
        assert!(matches!(
            result,
            Err(FetchError::Git { step: "clone", .. }) | Err(FetchError::Spawn { step: "clone", .. })
        ));
    }

    #[test]
    fn reference_defaults_to_main() {
        let source = GitSource {
            repo_url: "https://example.com/r.git".into(),
            reference: None,
        };
        assert_eq!(source.reference(), "main");
    }
}
