// src/exec/tags.rs

//! The tag-file protocol.
//!
//! Tag files are empty markers in the logs directory whose presence encodes
//! status transitions across processes: the runner creates them, the
//! supervisor (and a later initialization) reads and deletes them. Tags are
//! authoritative; the in-memory status is only a cache between polls.

use tracing::warn;

use crate::fs::FileSystem;
use crate::job::JobStatus;
use crate::store::paths::{LogsLayout, TagKind};

/// What the tag files currently say about a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagProbe {
    pub running: bool,
    pub finished: bool,
    pub failed: bool,
    pub exit: bool,
}

impl TagProbe {
    pub fn read(fs: &dyn FileSystem, layout: &LogsLayout, job: &str) -> Self {
        Self {
            running: fs.exists(&layout.tag(job, TagKind::Running)),
            finished: fs.exists(&layout.tag(job, TagKind::Finished)),
            failed: fs.exists(&layout.tag(job, TagKind::Failed)),
            exit: fs.exists(&layout.tag(job, TagKind::Exit)),
        }
    }

    /// Terminal status encoded by the tags, if any.
    ///
    /// An `.exit` tag without a proper outcome tag means the wrapper
    /// terminated without the runner reporting; that is reclassified to
    /// `failed` by the caller.
    pub fn terminal_status(&self) -> Option<JobStatus> {
        if self.finished {
            Some(JobStatus::Finished)
        } else if self.failed {
            Some(JobStatus::Failed)
        } else if self.exit {
            Some(JobStatus::Exit)
        } else {
            None
        }
    }
}

/// Delete every tag file of a job. Absent tags are not an error.
pub fn clear_tags(fs: &dyn FileSystem, layout: &LogsLayout, job: &str) {
    for kind in TagKind::ALL {
        let path = layout.tag(job, kind);
        if fs.exists(&path) {
            if let Err(e) = fs.remove_file(&path) {
                warn!(job, path = %path.display(), error = %e, "failed to delete tag file");
            }
        }
    }
}

/// Collect the text of `<job>.log`, with the cluster wrapper streams
/// (`.oqsub`, `.eqsub`) appended when present.
pub fn harvest_log(fs: &dyn FileSystem, layout: &LogsLayout, job: &str) -> String {
    let mut text = read_or_empty(fs, &layout.job_log(job));

    for (label, path) in [
        ("qsub stdout", layout.qsub_stdout(job)),
        ("qsub stderr", layout.qsub_stderr(job)),
    ] {
        if fs.exists(&path) {
            let extra = read_or_empty(fs, &path);
            if !extra.is_empty() {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&format!("***** {label} *****\n"));
                text.push_str(&extra);
            }
        }
    }

    text
}

/// Read `<job>.profile` as a JSON value.
///
/// The profile is written by the runner and treated as opaque; content that
/// fails to parse as JSON is kept verbatim as a string value.
pub fn read_profile(fs: &dyn FileSystem, layout: &LogsLayout, job: &str) -> serde_json::Value {
    let path = layout.job_profile(job);
    if !fs.exists(&path) {
        return serde_json::Value::Null;
    }
    let text = read_or_empty(fs, &path);
    serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
}

fn read_or_empty(fs: &dyn FileSystem, path: &std::path::Path) -> String {
    match fs.read_to_string(path) {
        Ok(text) => text,
        Err(_) => String::new(),
    }
}
