// src/exec/backend.rs

//! Pluggable submission backends.
//!
//! All modes share the tag-file protocol for status; they differ in how a
//! job is submitted, how long the submission call lasts, and where
//! stdout/stderr goes:
//!
//! - `session` evaluates the job in place: the submission future resolves
//!   only when the job is over, and the supervisor is suspended meanwhile.
//! - `background` detaches a local subprocess and resolves immediately.
//! - `batch` hands the wrapper to the local `at` scheduler (survives
//!   logout) and resolves immediately.
//! - `qsub` / `msub` submit the wrapper to a cluster queue with an explicit
//!   `-o` / `-e` routing for the wrapper streams.
//!
//! A failed submission is fatal to the supervisor; job-level failures are
//! not and travel through tag files instead.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ExecMode;
use crate::errors::{PipedagError, Result};
use crate::fs::FileSystem;
use crate::store::paths::{LogsLayout, TagKind};

/// Everything a backend needs to start one job.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub job: String,
    /// Interpreter invocation (used directly by `session`).
    pub invocation: String,
    /// Wrapper script path (used by the script-based modes).
    pub script: PathBuf,
    pub log: PathBuf,
    pub oqsub: PathBuf,
    pub eqsub: PathBuf,
}

/// Trait abstracting how jobs are submitted.
///
/// Production code uses [`backend_for`]; tests can provide their own
/// implementation that completes jobs by writing tag files directly.
pub trait Backend: Send {
    fn submit(
        &mut self,
        req: SubmitRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Construct the production backend for a mode.
pub fn backend_for(
    mode: ExecMode,
    fs: Arc<dyn FileSystem>,
    layout: &LogsLayout,
    qsub_options: &str,
) -> Box<dyn Backend> {
    match mode {
        ExecMode::Session => Box::new(SessionBackend {
            fs,
            layout: layout.clone(),
        }),
        ExecMode::Background => Box::new(BackgroundBackend),
        ExecMode::Batch => Box::new(BatchBackend),
        ExecMode::Qsub => Box::new(ClusterBackend {
            submit: "qsub",
            qsub_options: qsub_options.to_string(),
        }),
        ExecMode::Msub => Box::new(ClusterBackend {
            submit: "msub",
            qsub_options: qsub_options.to_string(),
        }),
    }
}

fn shell_command(line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        c
    }
}

fn submit_failed(job: &str, reason: impl std::fmt::Display) -> PipedagError {
    PipedagError::SubmitFailed {
        job: job.to_string(),
        reason: reason.to_string(),
    }
}

/// In-process synchronous evaluation.
///
/// The runner is executed directly and awaited; its stdout/stderr is
/// captured into `<job>.log` (the diary), and the `.exit` tag is written by
/// the backend itself once the evaluation returns.
pub struct SessionBackend {
    fs: Arc<dyn FileSystem>,
    layout: LogsLayout,
}

impl Backend for SessionBackend {
    fn submit(
        &mut self,
        req: SubmitRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            info!(job = %req.job, "running job in session");

            let output = shell_command(&req.invocation)
                .output()
                .await
                .map_err(|e| submit_failed(&req.job, e))?;

            let mut diary = output.stdout;
            diary.extend_from_slice(&output.stderr);
            self.fs.write(&req.log, &diary)?;
            self.fs
                .write(&self.layout.tag(&req.job, TagKind::Exit), b"")?;

            debug!(job = %req.job, code = output.status.code(), "session evaluation returned");
            Ok(())
        })
    }
}

/// Detached local subprocess.
///
/// An intermediate shell forks the wrapper and exits immediately, so the
/// job survives the supervisor and the submission call does not block.
pub struct BackgroundBackend;

impl Backend for BackgroundBackend {
    fn submit(
        &mut self,
        req: SubmitRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let line = if cfg!(windows) {
                format!("start /B \"\" \"{}\"", req.script.display())
            } else {
                format!("nohup sh \"{}\" > /dev/null 2>&1 &", req.script.display())
            };
            info!(job = %req.job, "submitting job in background");

            let status = shell_command(&line)
                .status()
                .await
                .map_err(|e| submit_failed(&req.job, e))?;
            if !status.success() {
                return Err(submit_failed(&req.job, "background shell returned non-zero"));
            }
            Ok(())
        })
    }
}

/// Logout-proof local scheduler (`at now`).
pub struct BatchBackend;

impl Backend for BatchBackend {
    fn submit(
        &mut self,
        req: SubmitRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            info!(job = %req.job, "submitting job through at");

            let status = Command::new("at")
                .arg("now")
                .arg("-f")
                .arg(&req.script)
                .status()
                .await
                .map_err(|e| submit_failed(&req.job, e))?;
            if !status.success() {
                return Err(submit_failed(&req.job, "at returned non-zero"));
            }
            Ok(())
        })
    }
}

/// Cluster queue submission (`qsub` / `msub`).
pub struct ClusterBackend {
    submit: &'static str,
    qsub_options: String,
}

impl Backend for ClusterBackend {
    fn submit(
        &mut self,
        req: SubmitRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let submit = self.submit;
        let qsub_options = self.qsub_options.clone();

        Box::pin(async move {
            // Queue managers commonly truncate or reject long job names.
            let queue_name: String = req.job.chars().take(15).collect();
            info!(job = %req.job, queue_name = %queue_name, command = submit, "submitting job to cluster queue");

            let mut cmd = Command::new(submit);
            cmd.arg("-N")
                .arg(&queue_name)
                .arg("-o")
                .arg(&req.oqsub)
                .arg("-e")
                .arg(&req.eqsub);
            for opt in qsub_options.split_whitespace() {
                cmd.arg(opt);
            }
            cmd.arg(&req.script);

            let status = cmd
                .status()
                .await
                .map_err(|e| submit_failed(&req.job, e))?;
            if !status.success() {
                return Err(submit_failed(
                    &req.job,
                    format!("{submit} returned non-zero"),
                ));
            }
            Ok(())
        })
    }
}
