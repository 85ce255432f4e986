//! Picks the output directory a build actually produced.
//!
//! Toolchains disagree on where static output goes (`dist`, `build`, ...). Candidates
//! are checked in priority order and the first one that exists as a directory wins.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// The resolved root of the tree to upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputDirectory {
    pub path: PathBuf,
    /// Candidate name that matched.
    pub convention: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error(
        "none of the output directories {candidates:?} exist in {}; present directories: {present:?}",
        working_dir.display()
    )]
    NotFound {
        working_dir: PathBuf,
        candidates: Vec<String>,
        /// Directory names actually found in the working directory, sorted.
        present: Vec<String>,
    },
}

/// Returns the first candidate under `working_dir` that is a directory.
pub fn locate<S: AsRef<str>>(
    working_dir: &Path,
    candidates: &[S],
) -> Result<OutputDirectory, LocateError> {
    for candidate in candidates {
        let name = candidate.as_ref();
        let path = working_dir.join(name);
        if path.is_dir() {
            info!(path = %path.display(), convention = name, "[LOCATE] Found output directory");
            return Ok(OutputDirectory {
                path,
                convention: name.to_string(),
            });
        }
        debug!(path = %path.display(), "[LOCATE] Candidate output directory absent");
    }

    let present = present_directories(working_dir);
    let candidates: Vec<String> = candidates.iter().map(|c| c.as_ref().to_string()).collect();
    warn!(
        working_dir = %working_dir.display(),
        ?candidates,
        ?present,
        "[LOCATE] No output directory found"
    );
    Err(LocateError::NotFound {
        working_dir: working_dir.to_path_buf(),
        candidates,
        present,
    })
}

/// Sorted names of the directories directly under `dir`; empty if it cannot be listed.
fn present_directories(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = ?e, path = %dir.display(), "[LOCATE] Could not list working directory");
            return Vec::new();
        }
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
