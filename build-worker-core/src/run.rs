//! High-level pipeline: orchestrates build → locate → rewrite → upload for one project.
//!
//! # Phases
//! `Init → Building → (BuildFailed | LocatingOutput) → (OutputMissing | RewritingPaths)
//! → Uploading → (PartialFailure | AllSucceeded)`
//!
//! Transitions are strictly sequential and there is no retry loop. A caller that sees
//! a partial failure or a fatal state decides whether to re-run the whole thing.
//!
//! # Error Handling
//! - A non-zero build exit and a missing output directory are terminal [`RunOutcome`]s.
//! - Rewriting is best-effort and never fails the run.
//! - Per-file upload failures are absorbed into [`RunOutcome::PartialFailure`].
//! - A build that cannot be spawned, or an output tree that cannot be listed, is a
//!   [`RunError`].
//!
//! # Callable From
//! - The `build-worker` CLI and the integration tests. Both bring their own
//!   [`BuildInvoker`] and [`Uploader`].

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::RunContext;
use crate::contract::{BuildError, BuildInvoker, Uploader};
use crate::locate::{locate, LocateError, OutputDirectory};
use crate::rewrite::{AssetPathRewriter, RewriteReport};
use crate::upload::{upload_tree, FailedUpload, WalkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Init,
    Building,
    LocatingOutput,
    RewritingPaths,
    Uploading,
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    AllSucceeded {
        output: OutputDirectory,
        rewrite: RewriteReport,
        uploaded: Vec<String>,
    },
    PartialFailure {
        output: OutputDirectory,
        rewrite: RewriteReport,
        uploaded: Vec<String>,
        failed: Vec<FailedUpload>,
    },
    BuildFailed {
        exit_code: Option<i32>,
    },
    OutputDirectoryMissing {
        candidates: Vec<String>,
        present: Vec<String>,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::AllSucceeded { .. })
    }

    /// `0` all uploaded, `2` some uploads failed, `1` anything fatal.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::AllSucceeded { .. } => 0,
            RunOutcome::PartialFailure { .. } => 2,
            RunOutcome::BuildFailed { .. } | RunOutcome::OutputDirectoryMissing { .. } => 1,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub project_id: String,
    pub outcome: RunOutcome,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("output tree could not be walked: {0}")]
    Filesystem(#[from] WalkError),
}

/// Runs one build-and-publish pass for `ctx`.
pub async fn run<B, U>(ctx: &RunContext, builder: &B, uploader: &U) -> Result<RunReport, RunError>
where
    B: BuildInvoker + ?Sized,
    U: Uploader + ?Sized,
{
    let run_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("run", run_id = %run_id, project_id = %ctx.project_id);
    let outcome = drive(ctx, builder, uploader).instrument(span).await?;
    Ok(RunReport {
        run_id,
        project_id: ctx.project_id.clone(),
        outcome,
    })
}

async fn drive<B, U>(ctx: &RunContext, builder: &B, uploader: &U) -> Result<RunOutcome, RunError>
where
    B: BuildInvoker + ?Sized,
    U: Uploader + ?Sized,
{
    enter(RunPhase::Init);
    ctx.trace_loaded();

    // --- Building ---
    enter(RunPhase::Building);
    let status = builder.run(&ctx.build_command, &ctx.working_dir).await?;
    if !status.success() {
        error!(exit_code = ?status.exit_code, "[RUN][ERROR] Build failed, stopping");
        return Ok(RunOutcome::BuildFailed {
            exit_code: status.exit_code,
        });
    }

    // --- Locating output ---
    enter(RunPhase::LocatingOutput);
    let output = match locate(&ctx.working_dir, &ctx.output_candidates) {
        Ok(output) => output,
        Err(LocateError::NotFound {
            candidates,
            present,
            ..
        }) => {
            error!(?candidates, ?present, "[RUN][ERROR] Output directory missing, stopping");
            return Ok(RunOutcome::OutputDirectoryMissing {
                candidates,
                present,
            });
        }
    };

    // --- Rewriting paths ---
    enter(RunPhase::RewritingPaths);
    let rewrite = match AssetPathRewriter::new(ctx.rewrite.clone()) {
        Ok(rewriter) => {
            let root = output.path.clone();
            match tokio::task::spawn_blocking(move || rewriter.rewrite(&root)).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(error = %e, "[RUN] Rewrite task did not finish, uploading output as-is");
                    RewriteReport::default()
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "[RUN] Could not build rewrite patterns, uploading output as-is");
            RewriteReport::default()
        }
    };

    // --- Uploading ---
    enter(RunPhase::Uploading);
    let report = upload_tree(
        uploader,
        &ctx.bucket,
        &output.path,
        &ctx.project_id,
        &ctx.upload,
    )
    .await?;

    let uploaded = report.succeeded_keys();
    let failed = report.failed();
    let outcome = if failed.is_empty() {
        info!(uploaded = uploaded.len(), "[RUN] Run complete, all files uploaded");
        RunOutcome::AllSucceeded {
            output,
            rewrite,
            uploaded,
        }
    } else {
        error!(
            uploaded = uploaded.len(),
            failed = failed.len(),
            "[RUN][ERROR] Run complete with upload failures"
        );
        RunOutcome::PartialFailure {
            output,
            rewrite,
            uploaded,
            failed,
        }
    };
    Ok(outcome)
}

fn enter(phase: RunPhase) {
    info!(?phase, "[RUN] Entering phase");
}
