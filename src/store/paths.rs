// src/store/paths.rs

//! Canonical filenames under the logs directory.
//!
//! Every file the pipeline manager touches is named here and nowhere else;
//! the names are part of the cross-run, cross-process protocol and must not
//! drift.

use std::path::{Path, PathBuf};

use crate::job::JobStatus;

/// The empty marker files whose presence encodes status transitions between
/// the runner and the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Running,
    Finished,
    Failed,
    Exit,
}

impl TagKind {
    pub const ALL: [TagKind; 4] = [
        TagKind::Running,
        TagKind::Finished,
        TagKind::Failed,
        TagKind::Exit,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            TagKind::Running => "running",
            TagKind::Finished => "finished",
            TagKind::Failed => "failed",
            TagKind::Exit => "exit",
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            TagKind::Running => JobStatus::Running,
            TagKind::Finished => JobStatus::Finished,
            TagKind::Failed => JobStatus::Failed,
            TagKind::Exit => JobStatus::Exit,
        }
    }
}

/// Filename layout of one logs directory.
#[derive(Debug, Clone)]
pub struct LogsLayout {
    root: PathBuf,
}

impl LogsLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `PIPE.main` — graph, logs path, search path, runner command.
    pub fn pipe_main(&self) -> PathBuf {
        self.root.join("PIPE.main")
    }

    pub fn pipe_backup(&self) -> PathBuf {
        self.root.join("PIPE.backup")
    }

    /// `PIPE_jobs.main` — job name -> descriptor.
    pub fn jobs_main(&self) -> PathBuf {
        self.root.join("PIPE_jobs.main")
    }

    pub fn jobs_backup(&self) -> PathBuf {
        self.root.join("PIPE_jobs.backup")
    }

    /// `PIPE_status.main` — job name -> status.
    pub fn status_main(&self) -> PathBuf {
        self.root.join("PIPE_status.main")
    }

    pub fn status_backup(&self) -> PathBuf {
        self.root.join("PIPE_status.backup")
    }

    /// `PIPE_logs.main` — job name -> log text.
    pub fn logs_main(&self) -> PathBuf {
        self.root.join("PIPE_logs.main")
    }

    pub fn logs_backup(&self) -> PathBuf {
        self.root.join("PIPE_logs.backup")
    }

    /// `PIPE_profile.main` — job name -> timing record.
    pub fn profile_main(&self) -> PathBuf {
        self.root.join("PIPE_profile.main")
    }

    pub fn profile_backup(&self) -> PathBuf {
        self.root.join("PIPE_profile.backup")
    }

    /// `PIPE.lock` — single-writer guarantee for the supervisor; deleting it
    /// is the operator's cancellation signal.
    pub fn lock(&self) -> PathBuf {
        self.root.join("PIPE.lock")
    }

    /// `PIPE_history.txt` — append-only human-readable event history.
    pub fn history(&self) -> PathBuf {
        self.root.join("PIPE_history.txt")
    }

    /// `<job>.running` / `.finished` / `.failed` / `.exit`.
    pub fn tag(&self, job: &str, kind: TagKind) -> PathBuf {
        self.root.join(format!("{job}.{}", kind.extension()))
    }

    /// `<job>.log` — payload stdout/stderr capture.
    pub fn job_log(&self, job: &str) -> PathBuf {
        self.root.join(format!("{job}.log"))
    }

    /// `<job>.oqsub` — cluster-backend wrapper stdout.
    pub fn qsub_stdout(&self, job: &str) -> PathBuf {
        self.root.join(format!("{job}.oqsub"))
    }

    /// `<job>.eqsub` — cluster-backend wrapper stderr.
    pub fn qsub_stderr(&self, job: &str) -> PathBuf {
        self.root.join(format!("{job}.eqsub"))
    }

    /// `<job>.profile` — start/end/elapsed timing written by the runner.
    pub fn job_profile(&self, job: &str) -> PathBuf {
        self.root.join(format!("{job}.profile"))
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// `tmp/<job>.sh` (`.bat` on Windows) — per-job wrapper script.
    pub fn job_script(&self, job: &str) -> PathBuf {
        self.tmp_dir().join(format!("{job}.{}", script_extension()))
    }

    /// `tmp/pipeline_manager.sh` — wrapper used to detach the supervisor
    /// itself when the embedding application runs it in the background.
    pub fn manager_script(&self) -> PathBuf {
        self.tmp_dir()
            .join(format!("pipeline_manager.{}", script_extension()))
    }
}

fn script_extension() -> &'static str {
    if cfg!(windows) {
        "bat"
    } else {
        "sh"
    }
}
