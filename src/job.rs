// src/job.rs

//! Job descriptors, the pipeline map, and job status values.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Canonical job name type used throughout the crate.
///
/// Job names are unique strings that also serve as stable identifiers across
/// runs: the persisted stores, the tag files, and the restart planner are all
/// keyed by them.
pub type JobName = String;

/// Sentinel value marking a declared path or option as "skip this".
///
/// A path equal to the sentinel never participates in dependency edges and
/// never triggers an ancestor restart; a search path equal to the sentinel
/// disables search-path setup in the generated wrapper script.
pub const OMITTED: &str = "omitted";

/// A pipeline is a mapping from job name to descriptor.
///
/// `BTreeMap` keeps iteration deterministic, which in turn makes graph
/// indices, tie-breaking between ready jobs, and persisted output stable.
pub type Pipeline = BTreeMap<JobName, JobSpec>;

/// User-declared description of one computational job.
///
/// Immutable within a run. The `command` is opaque: the supervisor never
/// interprets it, it only hands it to a backend. Staleness across runs is
/// decided by structural comparison of the whole descriptor, not by file
/// contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Opaque command evaluated by the runner.
    pub command: String,

    /// Files this job reads. Wildcards and the `omitted` sentinel are
    /// ignored by the dependency builder.
    #[serde(default)]
    pub files_in: Vec<PathBuf>,

    /// Files this job writes. Each output path may belong to at most one
    /// job across the whole pipeline.
    #[serde(default)]
    pub files_out: Vec<PathBuf>,

    /// Files this job deletes during execution. A consumer of a cleaned
    /// file acquires a dependency edge from the cleaner.
    #[serde(default)]
    pub files_clean: Vec<PathBuf>,

    /// Opaque payload, compared structurally for change detection.
    #[serde(default)]
    pub opt: serde_json::Value,
}

impl JobSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            files_in: Vec::new(),
            files_out: Vec::new(),
            files_clean: Vec::new(),
            opt: serde_json::Value::Null,
        }
    }

    /// Input paths that participate in dependency edges.
    pub fn effective_inputs(&self) -> impl Iterator<Item = &PathBuf> {
        self.files_in.iter().filter(|p| is_concrete_path(p))
    }

    /// Output paths that participate in dependency edges and validation.
    pub fn effective_outputs(&self) -> impl Iterator<Item = &PathBuf> {
        self.files_out.iter().filter(|p| is_concrete_path(p))
    }

    /// Cleaned paths that participate in dependency edges.
    pub fn effective_cleaned(&self) -> impl Iterator<Item = &PathBuf> {
        self.files_clean.iter().filter(|p| is_concrete_path(p))
    }
}

/// Whether a declared path is a real file path, as opposed to a wildcard or
/// the `omitted` sentinel. Non-concrete paths are treated as absent.
pub fn is_concrete_path(path: &Path) -> bool {
    match path.to_str() {
        Some(s) => !s.is_empty() && s != OMITTED && !s.contains('*') && !s.contains('?'),
        None => true,
    }
}

/// Status of a job, as persisted in `PIPE_status` and communicated through
/// tag files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Never run, or scheduled to be (re)run.
    None,
    /// Handed to a backend; no `.running` tag observed yet.
    Submitted,
    /// `.running` tag observed.
    Running,
    /// `.finished` tag observed.
    Finished,
    /// `.failed` tag observed.
    Failed,
    /// The wrapper reported termination without a proper outcome tag.
    /// The supervisor reclassifies this to `Failed`.
    Exit,
}

impl JobStatus {
    /// Whether this status is terminal for the current run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed | JobStatus::Exit)
    }

    /// Whether a job with this prior status must be restarted (seed rule of
    /// the planner; `finished` and `running` are handled separately).
    pub fn needs_restart(&self) -> bool {
        matches!(
            self,
            JobStatus::None | JobStatus::Failed | JobStatus::Submitted | JobStatus::Exit
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::None => "none",
            JobStatus::Submitted => "submitted",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::Exit => "exit",
        };
        f.write_str(s)
    }
}
