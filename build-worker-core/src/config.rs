use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

pub const DEFAULT_BUILD_COMMAND: &str = "npm install && npm run build";
pub const DEFAULT_OUTPUT_CANDIDATES: &[&str] = &["dist", "build"];
pub const DEFAULT_KEY_PREFIX: &str = "__outputs";
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 8;

/// Immutable per-run configuration. Built once at the edge and passed by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    /// Opaque namespace for destination keys.
    pub project_id: String,
    pub working_dir: PathBuf,
    pub bucket: String,
    pub build_command: String,
    /// Output directory names to try, highest priority first.
    pub output_candidates: Vec<String>,
    pub rewrite: RewriteSettings,
    pub upload: UploadSettings,
}

impl RunContext {
    /// Context with every setting at its default.
    pub fn new(
        project_id: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            working_dir: working_dir.into(),
            bucket: bucket.into(),
            build_command: DEFAULT_BUILD_COMMAND.to_string(),
            output_candidates: default_output_candidates(),
            rewrite: RewriteSettings::default(),
            upload: UploadSettings::default(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            project_id = %self.project_id,
            working_dir = %self.working_dir.display(),
            bucket = %self.bucket,
            candidates = ?self.output_candidates,
            "Loaded RunContext"
        );
        debug!(?self, "RunContext loaded (full debug)");
    }
}

pub fn default_output_candidates() -> Vec<String> {
    DEFAULT_OUTPUT_CANDIDATES
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

/// What the asset path rewriter touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteSettings {
    /// Markup document at the output root loaded first by the browser.
    pub entry_document: String,
    /// Subdirectory of the output root whose scripts are rewritten.
    pub assets_dir: String,
    pub script_extensions: Vec<String>,
    /// Literals ending in one of these are treated as image references.
    pub image_extensions: Vec<String>,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self {
            entry_document: "index.html".to_string(),
            assets_dir: "assets".to_string(),
            script_extensions: ["js", "mjs", "cjs"].map(String::from).to_vec(),
            image_extensions: ["svg", "png", "jpg", "jpeg", "gif", "ico"]
                .map(String::from)
                .to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// First key segment, ahead of the project id.
    pub key_prefix: String,
    /// Upper bound on in-flight puts.
    pub concurrency: usize,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_uses_defaults() {
        let ctx = RunContext::new("proj", "/tmp/work", "bucket");
        assert_eq!(ctx.build_command, DEFAULT_BUILD_COMMAND);
        assert_eq!(ctx.output_candidates, vec!["dist", "build"]);
        assert_eq!(ctx.upload.key_prefix, "__outputs");
        assert_eq!(ctx.rewrite.entry_document, "index.html");
        assert!(ctx.rewrite.image_extensions.contains(&"ico".to_string()));
    }

    #[test]
    fn partial_settings_fill_in_defaults() {
        let settings: UploadSettings = serde_json::from_str(r#"{"concurrency": 2}"#).unwrap();
        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.key_prefix, DEFAULT_KEY_PREFIX);
    }
}
