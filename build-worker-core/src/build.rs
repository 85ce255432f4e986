//! Shell-backed [`BuildInvoker`].
//!
//! The command runs under `sh -c` in the working directory with stdout and stderr piped.
//! Each output line is logged and, when a sink is attached, forwarded over an unbounded
//! channel. The run controller only awaits the exit status.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use crate::contract::{BuildError, BuildInvoker, BuildStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStream {
    Stdout,
    Stderr,
}

/// One line of build output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLine {
    pub stream: BuildStream,
    pub line: String,
}

pub struct ShellBuildInvoker {
    shell: String,
    line_sink: Option<UnboundedSender<BuildLine>>,
}

impl Default for ShellBuildInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellBuildInvoker {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
            line_sink: None,
        }
    }

    /// Forward every output line to `sink` in addition to logging it.
    pub fn with_line_sink(mut self, sink: UnboundedSender<BuildLine>) -> Self {
        self.line_sink = Some(sink);
        self
    }
}

#[async_trait]
impl BuildInvoker for ShellBuildInvoker {
    async fn run(&self, command: &str, working_dir: &Path) -> Result<BuildStatus, BuildError> {
        info!(command, working_dir = %working_dir.display(), "[BUILD] Spawning build command");

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| {
            error!(error = ?source, command, "[BUILD][ERROR] Failed to spawn build command");
            BuildError::Spawn {
                command: command.to_string(),
                working_dir: working_dir.to_path_buf(),
                source,
            }
        })?;

        let stdout_task = child.stdout.take().map(|out| {
            tokio::spawn(forward_lines(out, BuildStream::Stdout, self.line_sink.clone()))
        });
        let stderr_task = child.stderr.take().map(|err| {
            tokio::spawn(forward_lines(err, BuildStream::Stderr, self.line_sink.clone()))
        });

        let status = child.wait().await.map_err(|source| {
            error!(error = ?source, command, "[BUILD][ERROR] Failed waiting for build command");
            BuildError::Wait {
                command: command.to_string(),
                source,
            }
        })?;

        // Both pipes hit EOF once the process exits; drain so no line is lost.
        for task in [stdout_task, stderr_task].into_iter().flatten() {
            if let Err(e) = task.await {
                warn!(error = ?e, "[BUILD] Output forwarding task ended abnormally");
            }
        }

        let status = BuildStatus {
            exit_code: status.code(),
        };
        if status.success() {
            info!(command, "[BUILD] Build complete");
        } else {
            error!(command, exit_code = ?status.exit_code, "[BUILD][ERROR] Build exited unsuccessfully");
        }
        Ok(status)
    }
}

async fn forward_lines<R>(reader: R, stream: BuildStream, sink: Option<UnboundedSender<BuildLine>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match stream {
            BuildStream::Stdout => info!(target: "build_output", stream = "stdout", "{line}"),
            BuildStream::Stderr => warn!(target: "build_output", stream = "stderr", "{line}"),
        }
        if let Some(sink) = &sink {
            // Receiver gone just means nobody is listening any more.
            let _ = sink.send(BuildLine { stream, line });
        }
    }
}
