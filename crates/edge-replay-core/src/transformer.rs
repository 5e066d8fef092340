//! External transformer process
//!
//! The transformer reads raw log lines on stdin and writes staged,
//! gzip-compressed tab-delimited files under
//! `{staging_bucket}/{run_tag}/{table}/`. It receives the run tag as its
//! last positional argument and signals success with exit status zero.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::debug;

use crate::error::{ReplayError, Result};
use crate::run_tag::RunTag;

/// Default transformer executable
pub const DEFAULT_TRANSFORMER: &str = "/opt/science/replay/bin/run_spade_replay.sh";

/// How to launch the transformer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformerCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl TransformerCommand {
    /// Launch `program` with the run tag as its only argument
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Arguments placed before the run tag
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Executable path
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Start one transformer for `partition` with a piped stdin
    pub fn spawn(&self, run_tag: &RunTag, partition: usize) -> Result<TransformerProcess> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(run_tag.as_str())
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ReplayError::transformer(
                    format!("failed to start {}", self.program.display()),
                    e,
                )
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            ReplayError::internal("transformer spawned without a stdin pipe")
        })?;
        debug!(
            "Started transformer for partition {} (pid {:?})",
            partition,
            child.id()
        );

        Ok(TransformerProcess {
            child,
            stdin: Some(stdin),
            partition,
        })
    }
}

/// A running transformer
#[derive(Debug)]
pub struct TransformerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    partition: usize,
}

impl TransformerProcess {
    /// Write bytes to the transformer's stdin
    pub async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(data).await,
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "transformer stdin already closed",
            )),
        }
    }

    /// Close stdin and wait for a successful exit
    pub async fn finish(mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            let closed = stdin.shutdown().await;
            drop(stdin);
            if let Err(e) = closed {
                // the exit status explains an early close better than the pipe error
                let status = self.wait().await?;
                self.check(status)?;
                return Err(ReplayError::transformer("closing transformer stdin failed", e));
            }
        }
        let status = self.wait().await?;
        self.check(status)
    }

    /// Resolve a failed stdin write
    ///
    /// Reports the transformer's exit status if it already failed, and the
    /// write error otherwise.
    pub async fn fail_write(mut self, cause: std::io::Error) -> ReplayError {
        self.stdin.take();
        match self.wait().await {
            Ok(status) if !status.success() => self.status_error(status),
            Ok(_) => ReplayError::transformer("writing to transformer stdin failed", cause),
            Err(e) => e,
        }
    }

    /// Stop the transformer without letting it finish its input
    pub async fn kill(mut self) {
        self.stdin.take();
        if let Err(e) = self.child.kill().await {
            debug!(
                "Killing transformer for partition {} failed: {}",
                self.partition, e
            );
        }
    }

    async fn wait(&mut self) -> Result<ExitStatus> {
        self.child
            .wait()
            .await
            .map_err(|e| ReplayError::transformer("waiting for transformer failed", e))
    }

    fn check(&self, status: ExitStatus) -> Result<()> {
        if status.success() {
            debug!("Transformer for partition {} exited cleanly", self.partition);
            Ok(())
        } else {
            Err(self.status_error(status))
        }
    }

    fn status_error(&self, status: ExitStatus) -> ReplayError {
        ReplayError::TransformFailed {
            partition: self.partition,
            status: status.to_string(),
        }
    }
}
