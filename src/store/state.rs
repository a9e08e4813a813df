// src/store/state.rs

//! Persisted control-plane state and the main/backup durability protocol.
//!
//! Every store is one JSON document written whole-file. A write goes to the
//! main file first and is then copied to the backup; a read tries the main
//! file and, if that fails, falls back to the backup and restores the main
//! file from it. This survives a crash in the middle of a single write,
//! which is as much durability as the protocol promises.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{PipedagError, Result};
use crate::fs::FileSystem;
use crate::job::{JobName, JobSpec, JobStatus, Pipeline};
use crate::store::paths::LogsLayout;

/// Top-level pipeline record (`PIPE.main`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipeRecord {
    /// Child adjacency of the dependency graph, keyed by job name.
    pub graph: BTreeMap<JobName, Vec<JobName>>,
    /// Logs directory this record describes.
    pub path_logs: PathBuf,
    /// Search path handed to payloads, if any.
    pub path_search: Option<String>,
    /// Interpreter invocation used by script-based backends.
    pub command_runner: String,
}

/// The four parallel job-keyed stores.
///
/// Invariant: all four maps share an identical key set at every persist
/// boundary; [`PipelineState::align_keys`] enforces it.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub jobs: Pipeline,
    pub status: BTreeMap<JobName, JobStatus>,
    pub logs: BTreeMap<JobName, String>,
    pub profile: BTreeMap<JobName, serde_json::Value>,
}

impl PipelineState {
    /// Fresh state for a pipeline: every job `none`, logs blank, profile
    /// null.
    pub fn fresh(pipeline: Pipeline) -> Self {
        let mut state = Self {
            jobs: pipeline,
            ..Default::default()
        };
        state.align_keys();
        state
    }

    /// Whether the four stores exist on disk (main or backup).
    pub fn present(fs: &dyn FileSystem, layout: &LogsLayout) -> bool {
        (fs.exists(&layout.jobs_main()) || fs.exists(&layout.jobs_backup()))
            && (fs.exists(&layout.status_main()) || fs.exists(&layout.status_backup()))
    }

    /// Load all four stores, falling back to backups where needed.
    pub fn load(fs: &dyn FileSystem, layout: &LogsLayout) -> Result<Self> {
        let jobs = read_with_backup(fs, &layout.jobs_main(), &layout.jobs_backup())?;
        let status = read_with_backup(fs, &layout.status_main(), &layout.status_backup())?;
        let logs = read_with_backup(fs, &layout.logs_main(), &layout.logs_backup())?;
        let profile = read_with_backup(fs, &layout.profile_main(), &layout.profile_backup())?;

        let mut state = Self {
            jobs,
            status,
            logs,
            profile,
        };
        state.align_keys();
        Ok(state)
    }

    /// Persist all four stores and their backups.
    pub fn save(&self, fs: &dyn FileSystem, layout: &LogsLayout) -> Result<()> {
        write_with_backup(fs, &layout.jobs_main(), &layout.jobs_backup(), &self.jobs)?;
        write_with_backup(
            fs,
            &layout.status_main(),
            &layout.status_backup(),
            &self.status,
        )?;
        write_with_backup(fs, &layout.logs_main(), &layout.logs_backup(), &self.logs)?;
        write_with_backup(
            fs,
            &layout.profile_main(),
            &layout.profile_backup(),
            &self.profile,
        )?;
        Ok(())
    }

    /// Union-merge a prior run into this state.
    ///
    /// Names present only in the old run are preserved with their old
    /// descriptor, status, log, and profile; they may matter when a superset
    /// pipeline is resumed later. Names present in both keep the *current*
    /// descriptor.
    pub fn merge_previous(&mut self, old: PipelineState) {
        for (name, spec) in old.jobs {
            self.jobs.entry(name).or_insert(spec);
        }
        for (name, status) in old.status {
            self.status.entry(name).or_insert(status);
        }
        for (name, log) in old.logs {
            self.logs.entry(name).or_insert(log);
        }
        for (name, profile) in old.profile {
            self.profile.entry(name).or_insert(profile);
        }
        self.align_keys();
    }

    /// Enforce key-set parity across the four stores, keyed by `jobs`.
    ///
    /// Missing entries get defaults (`none`, empty log, null profile);
    /// entries for unknown names are dropped.
    pub fn align_keys(&mut self) {
        let names: Vec<JobName> = self.jobs.keys().cloned().collect();

        self.status.retain(|name, _| self.jobs.contains_key(name));
        self.logs.retain(|name, _| self.jobs.contains_key(name));
        self.profile.retain(|name, _| self.jobs.contains_key(name));

        for name in names {
            self.status.entry(name.clone()).or_insert(JobStatus::None);
            self.logs.entry(name.clone()).or_default();
            self.profile
                .entry(name)
                .or_insert(serde_json::Value::Null);
        }
    }

    pub fn status_of(&self, name: &str) -> JobStatus {
        self.status.get(name).copied().unwrap_or(JobStatus::None)
    }

    pub fn set_status(&mut self, name: &str, status: JobStatus) {
        self.status.insert(name.to_string(), status);
    }

    pub fn spec_of(&self, name: &str) -> Option<&JobSpec> {
        self.jobs.get(name)
    }
}

/// Read protocol: attempt main; on error fall back to backup and restore
/// main from it.
pub fn read_with_backup<T: DeserializeOwned>(
    fs: &dyn FileSystem,
    main: &Path,
    backup: &Path,
) -> Result<T> {
    match try_read(fs, main) {
        Ok(value) => Ok(value),
        Err(main_err) => {
            warn!(
                main = %main.display(),
                error = %main_err,
                "main store unreadable; falling back to backup"
            );
            match try_read(fs, backup) {
                Ok(value) => {
                    if let Err(e) = fs.copy(backup, main) {
                        warn!(
                            main = %main.display(),
                            error = %e,
                            "failed to restore main store from backup"
                        );
                    }
                    Ok(value)
                }
                Err(backup_err) => Err(PipedagError::StoreCorrupt(format!(
                    "{}: main: {main_err}; backup: {backup_err}",
                    main.display()
                ))),
            }
        }
    }
}

/// Write protocol: write main whole-file, then copy to backup.
pub fn write_with_backup<T: Serialize>(
    fs: &dyn FileSystem,
    main: &Path,
    backup: &Path,
    value: &T,
) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    fs.write(main, &body)?;
    fs.copy(main, backup)?;
    Ok(())
}

fn try_read<T: DeserializeOwned>(fs: &dyn FileSystem, path: &Path) -> anyhow::Result<T> {
    let text = fs.read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Append a timestamped line to `PIPE_history.txt`.
///
/// History is best-effort operator context; failures are warnings, never
/// errors.
pub fn append_history(fs: &dyn FileSystem, layout: &LogsLayout, message: &str) {
    let line = format!(
        "{}  {}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        message
    );
    if let Err(e) = fs.append(&layout.history(), line.as_bytes()) {
        warn!(error = %e, "failed to append to pipeline history");
    }
}

/// Read the top-level `PIPE` record.
pub fn read_pipe_record(fs: &dyn FileSystem, layout: &LogsLayout) -> Result<PipeRecord> {
    read_with_backup(fs, &layout.pipe_main(), &layout.pipe_backup())
}

/// Write the top-level `PIPE` record and its backup.
pub fn write_pipe_record(
    fs: &dyn FileSystem,
    layout: &LogsLayout,
    record: &PipeRecord,
) -> Result<()> {
    write_with_backup(fs, &layout.pipe_main(), &layout.pipe_backup(), record)
}
