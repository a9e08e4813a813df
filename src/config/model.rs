// src/config/model.rs

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Options for the initializer.
///
/// All flags have the conventional defaults, so a minimal caller only needs
/// a logs directory:
///
/// ```
/// use pipedag::config::InitOptions;
///
/// let opts = InitOptions::new("/data/logs");
/// assert!(opts.flag_update);
/// assert!(opts.flag_clean);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct InitOptions {
    /// Root of the logs directory holding control-plane state, per-job logs,
    /// and tag files.
    pub path_logs: PathBuf,

    /// Search path given to every payload. The `omitted` sentinel disables
    /// search-path setup in the wrapper scripts.
    #[serde(default)]
    pub path_search: Option<String>,

    /// Interpreter invocation used by script-based backends to start the
    /// runner.
    #[serde(default = "default_command_runner")]
    pub command_runner: String,

    /// Substrings forcing a restart: any job whose name contains at least
    /// one of them is restarted. Matching is case-sensitive.
    #[serde(default)]
    pub restart: Vec<String>,

    /// Enable descriptor-diff-driven restart.
    #[serde(default = "default_true")]
    pub flag_update: bool,

    /// Require operator confirmation before destructive writes and before
    /// starting with missing inputs.
    #[serde(default)]
    pub flag_pause: bool,

    /// Delete prior output files of to-be-restarted jobs.
    #[serde(default = "default_true")]
    pub flag_clean: bool,

    /// Human-readable progress to stdout.
    #[serde(default = "default_true")]
    pub flag_verbose: bool,
}

impl InitOptions {
    pub fn new(path_logs: impl Into<PathBuf>) -> Self {
        Self {
            path_logs: path_logs.into(),
            path_search: None,
            command_runner: default_command_runner(),
            restart: Vec::new(),
            flag_update: true,
            flag_pause: false,
            flag_clean: true,
            flag_verbose: true,
        }
    }
}

/// Options for the execution supervisor.
#[derive(Debug, Clone, Deserialize)]
pub struct RunOptions {
    /// Execution backend.
    #[serde(default)]
    pub mode: ExecMode,

    /// Concurrency cap: maximum number of jobs in flight.
    #[serde(default = "default_max_queued")]
    pub max_queued: usize,

    /// Poll interval, in seconds.
    #[serde(default = "default_time_between_checks")]
    pub time_between_checks: f64,

    /// Post-poll pause, in seconds, to let the filesystem settle before
    /// reading per-job logs (cluster queues flush stdout late).
    #[serde(default)]
    pub time_cool_down: f64,

    /// Extra flags appended verbatim to the cluster submission command.
    #[serde(default)]
    pub qsub_options: String,

    /// Shell-options prologue prepended to every wrapper script.
    #[serde(default)]
    pub shell_options: String,

    /// Extra runner initialization passed to the interpreter invocation.
    #[serde(default)]
    pub init_command: String,

    /// Keep wrapper scripts and tag files around for inspection.
    #[serde(default)]
    pub flag_debug: bool,

    /// Human-readable progress to stdout.
    #[serde(default = "default_true")]
    pub flag_verbose: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: ExecMode::default(),
            max_queued: default_max_queued(),
            time_between_checks: default_time_between_checks(),
            time_cool_down: 0.0,
            qsub_options: String::new(),
            shell_options: String::new(),
            init_command: String::new(),
            flag_debug: false,
            flag_verbose: true,
        }
    }
}

impl RunOptions {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.time_between_checks.max(0.0))
    }

    pub fn cool_down(&self) -> Duration {
        Duration::from_secs_f64(self.time_cool_down.max(0.0))
    }
}

fn default_command_runner() -> String {
    "pipedag-run".to_string()
}

fn default_max_queued() -> usize {
    1
}

fn default_time_between_checks() -> f64 {
    10.0
}

fn default_true() -> bool {
    true
}

/// Execution backend selector.
///
/// All modes communicate completion through the same tag-file protocol; they
/// differ in how a job is submitted and where its stdout/stderr goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// In-process synchronous evaluation; the supervisor blocks for the
    /// duration of the job.
    Session,
    /// Detached local subprocess.
    Background,
    /// Logout-proof local scheduler (`at`).
    Batch,
    /// Cluster queue via `qsub`.
    Qsub,
    /// Cluster queue via `msub`.
    Msub,
}

impl Default for ExecMode {
    fn default() -> Self {
        ExecMode::Session
    }
}

impl ExecMode {
    /// Whether this mode submits through a generated shell script.
    pub fn uses_script(&self) -> bool {
        !matches!(self, ExecMode::Session)
    }
}

impl FromStr for ExecMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "session" => Ok(ExecMode::Session),
            "background" => Ok(ExecMode::Background),
            "batch" => Ok(ExecMode::Batch),
            "qsub" => Ok(ExecMode::Qsub),
            "msub" => Ok(ExecMode::Msub),
            other => Err(format!(
                "invalid mode: {other} (expected \"session\", \"background\", \"batch\", \"qsub\" or \"msub\")"
            )),
        }
    }
}
