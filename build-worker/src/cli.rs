///
/// This module implements the CLI interface for build-worker: command parsing, wiring the
/// configured collaborators together, and mapping a run's outcome to a process exit code.
///
/// All pipeline logic (building, locating, rewriting, uploading) lives in the
/// [`build-worker-core`] crate. This module is strictly CLI glue.
///
/// ## Commands
/// - `run`: fetch the source if one is configured, build it, rewrite asset paths, upload
///   the output and print the JSON run report on stdout.
/// - `locate`: resolve the output directory of an already-built working directory without
///   building or uploading anything.
///
/// ## Exit codes
/// - `0`: every file uploaded
/// - `2`: the run finished but some uploads failed
/// - `1`: anything fatal (build failure, no output directory, bad config)
///
/// [`build-worker-core`]: ../../build-worker-core/
use crate::load_config::{load_config, ConfigOverrides};
use crate::upload::ObjectStoreUploader;
use anyhow::{Context, Result};
use build_worker_core::build::ShellBuildInvoker;
use build_worker_core::contract::SourceFetcher;
use build_worker_core::locate::locate;
use build_worker_core::run::run as run_pipeline;
use build_worker_core::source::GitFetcher;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// CLI for build-worker: build a frontend project and publish its output.
#[derive(Parser)]
#[clap(
    name = "build-worker",
    version,
    about = "Build a frontend project, make its asset paths relative, and upload the output to object storage"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the project and upload its output using the given config file
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Project id, overrides `project_id` and PROJECT_ID
        #[clap(long)]
        project_id: Option<String>,
        /// Working directory, overrides `working_dir` from the config
        #[clap(long)]
        working_dir: Option<PathBuf>,
    },
    /// Print the output directory the worker would upload, without building
    Locate {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Working directory, overrides `working_dir` from the config
        #[clap(long)]
        working_dir: Option<PathBuf>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<ExitCode> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Run {
            config,
            project_id,
            working_dir,
        } => {
            let loaded = load_config(
                config,
                &ConfigOverrides {
                    project_id,
                    working_dir,
                },
            )?;
            tracing::info!(command = "run", project_id = %loaded.context.project_id, "Starting build run");

            if let Some(source) = &loaded.source {
                GitFetcher::new()
                    .fetch(source, &loaded.context.working_dir)
                    .await
                    .context("Failed to fetch project source")?;
            }

            let uploader = ObjectStoreUploader::from_settings(&loaded.store)
                .context("Failed to construct uploader")?;
            let builder = ShellBuildInvoker::new();

            let report = match run_pipeline(&loaded.context, &builder, &uploader).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(command = "run", error = %e, "Run aborted");
                    return Err(anyhow::Error::new(e));
                }
            };

            let code = report.outcome.exit_code();
            if report.outcome.is_success() {
                tracing::info!(command = "run", run_id = %report.run_id, "Run complete");
            } else {
                tracing::error!(command = "run", run_id = %report.run_id, exit_code = code, "Run did not fully succeed");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::from(code))
        }
        Commands::Locate {
            config,
            working_dir,
        } => {
            let loaded = load_config(
                config,
                &ConfigOverrides {
                    working_dir,
                    ..Default::default()
                },
            )?;
            match locate(&loaded.context.working_dir, &loaded.context.output_candidates) {
                Ok(output) => {
                    tracing::info!(command = "locate", path = %output.path.display(), "Output directory found");
                    println!("{}", serde_json::to_string_pretty(&output)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    tracing::error!(command = "locate", error = %e, "Output directory not found");
                    eprintln!("{e}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}
