/// `load_config` module: Loads a static YAML config, injects environment overrides, and
/// produces the immutable [`RunContext`] plus the store and source settings the CLI needs.
///
/// This module is the only place where user-supplied YAML is parsed.
///
/// # Responsibilities
/// - Parse the YAML file into `Deserialize` structs with serde defaults for every optional key
/// - Overlay environment variables for per-deployment values (project id, bucket, region)
/// - Overlay CLI flags on top of both
/// - Validate the merged result, so the core never sees an empty candidate list or a
///   project id that would escape its key namespace
///
/// # Environment
/// - `PROJECT_ID`: project namespace for destination keys
/// - `BUILD_WORKER_BUCKET`: target bucket
/// - `AWS_REGION`, `AWS_ENDPOINT_URL`: store region and S3-compatible endpoint
///
/// Credentials are never read here; the S3 client picks them up from the environment itself.
use anyhow::{bail, Context, Result};
use build_worker_core::config::{
    default_output_candidates, RewriteSettings, RunContext, UploadSettings, DEFAULT_BUILD_COMMAND,
};
use build_worker_core::contract::GitSource;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const ENV_PROJECT_ID: &str = "PROJECT_ID";
pub const ENV_BUCKET: &str = "BUILD_WORKER_BUCKET";
pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_ENDPOINT: &str = "AWS_ENDPOINT_URL";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    source: Option<GitSource>,
    #[serde(default = "default_working_dir")]
    working_dir: PathBuf,
    #[serde(default)]
    build: BuildSection,
    #[serde(default)]
    output: OutputSection,
    #[serde(default)]
    rewrite: RewriteSettings,
    #[serde(default)]
    upload: UploadSettings,
    #[serde(default)]
    store: StoreSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct BuildSection {
    command: String,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            command: DEFAULT_BUILD_COMMAND.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct OutputSection {
    candidates: Vec<String>,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            candidates: default_output_candidates(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoreSection {
    backend: StoreBackend,
    bucket: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
}

fn default_working_dir() -> PathBuf {
    PathBuf::from("./output")
}

/// Which object store the uploader talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    S3,
    /// In-process store; nothing leaves the machine. For dry runs and tests.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

/// Values given on the command line; they win over both YAML and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub project_id: Option<String>,
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub context: RunContext,
    pub source: Option<GitSource>,
    pub store: StoreSettings,
}

/// Loads the YAML config at `path`, overlays environment and CLI overrides, and validates.
pub fn load_config<P: AsRef<Path>>(path: P, overrides: &ConfigOverrides) -> Result<LoadedConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let project_id = overrides
        .project_id
        .clone()
        .or_else(|| env_var(ENV_PROJECT_ID))
        .or(raw.project_id)
        .context("project id missing: set `project_id`, PROJECT_ID or --project-id")?;
    validate_project_id(&project_id)?;

    let bucket = env_var(ENV_BUCKET)
        .or(raw.store.bucket)
        .context("bucket missing: set `store.bucket` or BUILD_WORKER_BUCKET")?;
    if bucket.trim().is_empty() {
        bail!("bucket must not be empty");
    }

    let working_dir = overrides.working_dir.clone().unwrap_or(raw.working_dir);

    if raw.output.candidates.is_empty() {
        bail!("output.candidates must name at least one directory");
    }
    if let Some(bad) = raw
        .output
        .candidates
        .iter()
        .find(|c| c.is_empty() || c.contains(['/', '\\']) || c.as_str() == "..")
    {
        bail!("output candidate {bad:?} must be a plain directory name");
    }
    if raw.upload.concurrency == 0 {
        bail!("upload.concurrency must be at least 1");
    }
    if raw.build.command.trim().is_empty() {
        bail!("build.command must not be empty");
    }

    let store = StoreSettings {
        backend: raw.store.backend,
        bucket: bucket.clone(),
        region: env_var(ENV_REGION).or(raw.store.region),
        endpoint: env_var(ENV_ENDPOINT).or(raw.store.endpoint),
    };

    let context = RunContext {
        project_id,
        working_dir,
        bucket,
        build_command: raw.build.command,
        output_candidates: raw.output.candidates,
        rewrite: raw.rewrite,
        upload: raw.upload,
    };

    info!(
        project_id = %context.project_id,
        bucket = %context.bucket,
        backend = ?store.backend,
        working_dir = %context.working_dir.display(),
        "Config loaded and merged successfully"
    );

    Ok(LoadedConfig {
        context,
        source: raw.source,
        store,
    })
}

/// Non-empty environment variable, if set.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Project ids become a single key segment.
fn validate_project_id(project_id: &str) -> Result<()> {
    if project_id.trim().is_empty() {
        bail!("project id must not be empty");
    }
    if project_id.contains(['/', '\\']) || project_id == "." || project_id == ".." {
        bail!("project id {project_id:?} must be a single key segment");
    }
    Ok(())
}
