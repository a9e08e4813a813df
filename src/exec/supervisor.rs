// src/exec/supervisor.rs

//! The execution supervisor: an IO shell around [`SupervisorCore`].
//!
//! Single-threaded cooperative loop. Each tick, in order: persist the four
//! stores, poll the tag files of running jobs, pause for the cool-down,
//! ingest the logs and profiles of jobs that reached a terminal state,
//! submit ready jobs while the queue has room, then sleep. A job observed
//! `finished` in tick `t` has its descendants eligible starting tick `t+1`,
//! never within the same tick.
//!
//! The loop runs while `PIPE.lock` exists and work remains. Deleting the
//! lock is the operator's cancellation signal: the loop notices on the next
//! tick and returns cleanly, leaving in-flight jobs to be normalized by the
//! next initialization. A fatal error releases the lock and re-raises.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::RunOptions;
use crate::errors::Result;
use crate::exec::backend::{Backend, SubmitRequest};
use crate::exec::scheduler::SupervisorCore;
use crate::exec::{script, tags};
use crate::fs::FileSystem;
use crate::job::JobStatus;
use crate::store::paths::LogsLayout;
use crate::store::state::{append_history, PipeRecord, PipelineState};

/// Scoped ownership of `PIPE.lock`.
///
/// The lock is created on acquisition and removed on drop, so it is
/// released on normal completion and on unwind alike. If the operator
/// removed the lock mid-run, the drop is a no-op.
struct LockGuard {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl LockGuard {
    fn acquire(fs: Arc<dyn FileSystem>, path: PathBuf) -> Result<Self> {
        if fs.exists(&path) {
            return Err(crate::errors::PipedagError::InvalidPipeline(format!(
                "lock file {} already exists; another supervisor may be running \
                 (delete it to force a start)",
                path.display()
            )));
        }
        let stamp = format!("{}\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
        fs.write(&path, stamp.as_bytes())?;
        Ok(Self { fs, path })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.fs.exists(&self.path) {
            if let Err(e) = self.fs.remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
            }
        }
    }
}

pub struct Supervisor {
    core: SupervisorCore,
    state: PipelineState,
    record: PipeRecord,
    layout: LogsLayout,
    fs: Arc<dyn FileSystem>,
    backend: Box<dyn Backend>,
    opts: RunOptions,
}

impl Supervisor {
    pub fn new(
        core: SupervisorCore,
        state: PipelineState,
        record: PipeRecord,
        layout: LogsLayout,
        fs: Arc<dyn FileSystem>,
        backend: Box<dyn Backend>,
        opts: RunOptions,
    ) -> Self {
        Self {
            core,
            state,
            record,
            layout,
            fs,
            backend,
            opts,
        }
    }

    /// Run the pipeline to completion (or interruption).
    ///
    /// Job-level failures are not errors: they are recorded in the status
    /// and log stores and reflected in the final summary. An `Err` here
    /// means the control plane itself broke (submission failure,
    /// unwritable stores).
    pub async fn run(mut self) -> Result<()> {
        let lock = LockGuard::acquire(self.fs.clone(), self.layout.lock())?;
        append_history(
            self.fs.as_ref(),
            &self.layout,
            &format!("supervisor started (mode {:?})", self.opts.mode),
        );
        info!(mode = ?self.opts.mode, max_queued = self.opts.max_queued, "supervisor started");

        let outcome = self.run_loop().await;
        drop(lock);

        match &outcome {
            Ok(()) => {
                let counts = self.core.counts();
                append_history(
                    self.fs.as_ref(),
                    &self.layout,
                    &format!(
                        "supervisor stopped ({} finished, {} failed, {} blocked, {} todo)",
                        counts.finished, counts.failed, counts.blocked, counts.todo
                    ),
                );
                if self.opts.flag_verbose {
                    println!(
                        "pipeline done: {} finished, {} failed, {} blocked",
                        counts.finished, counts.failed, counts.blocked
                    );
                }
                if counts.failed > 0 {
                    warn!(failed = counts.failed, "pipeline completed with failures");
                }
            }
            Err(e) => {
                error!(error = %e, "supervisor aborted");
                append_history(
                    self.fs.as_ref(),
                    &self.layout,
                    &format!("supervisor aborted: {e}"),
                );
            }
        }

        outcome
    }

    async fn run_loop(&mut self) -> Result<()> {
        loop {
            if !self.fs.exists(&self.layout.lock()) {
                info!("lock file removed by operator; stopping");
                self.persist()?;
                return Ok(());
            }

            self.persist()?;

            let transitions = self.poll_running();

            // Snapshot the ready set before ingesting this tick's
            // transitions: a job observed finished in tick t releases its
            // descendants starting tick t+1, never within the same tick.
            // Every snapshot entry has all parents finished already, so no
            // failure ingested below can invalidate it.
            let ready = self.core.ready_jobs(self.opts.max_queued);

            // Let the filesystem settle before reading per-job logs;
            // cluster queues flush their stdout files late.
            if !transitions.is_empty() && !self.opts.cool_down().is_zero() {
                tokio::time::sleep(self.opts.cool_down()).await;
            }

            self.apply_transitions(&transitions);

            self.submit_ready(&ready).await?;

            if self.core.is_complete() {
                self.persist()?;
                return Ok(());
            }

            tokio::time::sleep(self.opts.poll_interval()).await;
        }
    }

    /// Persist all four stores and their backups.
    fn persist(&mut self) -> Result<()> {
        self.state.align_keys();
        self.state.save(self.fs.as_ref(), &self.layout)
    }

    /// Inspect the tag files of every running job.
    ///
    /// Returns the jobs that reached a terminal state this tick; `.exit`
    /// without an outcome tag is reclassified to `failed` on the spot.
    fn poll_running(&mut self) -> Vec<(usize, JobStatus)> {
        let mut transitions = Vec::new();

        for idx in self.core.running_jobs() {
            let name = self.core.graph().name_of(idx).to_string();
            let probe = tags::TagProbe::read(self.fs.as_ref(), &self.layout, &name);

            match probe.terminal_status() {
                Some(JobStatus::Finished) => transitions.push((idx, JobStatus::Finished)),
                Some(JobStatus::Failed) => transitions.push((idx, JobStatus::Failed)),
                Some(JobStatus::Exit) => {
                    warn!(job = %name, "wrapper terminated without an outcome tag; treating as failed");
                    transitions.push((idx, JobStatus::Failed));
                }
                Some(_) | None => {
                    if probe.running && self.core.status_of(idx) == JobStatus::Submitted {
                        debug!(job = %name, "running tag observed");
                        self.core.mark_running(idx);
                        self.state.set_status(&name, JobStatus::Running);
                    }
                }
            }
        }

        transitions
    }

    /// Ingest terminal jobs: aggregate their logs and profiles, drop their
    /// tags and scripts, update the core (which cascades failures).
    fn apply_transitions(&mut self, transitions: &[(usize, JobStatus)]) {
        for &(idx, outcome) in transitions {
            let name = self.core.graph().name_of(idx).to_string();

            let log = tags::harvest_log(self.fs.as_ref(), &self.layout, &name);
            self.state.logs.insert(name.clone(), log);
            self.state.profile.insert(
                name.clone(),
                tags::read_profile(self.fs.as_ref(), &self.layout, &name),
            );
            self.state.set_status(&name, outcome);

            if !self.opts.flag_debug {
                tags::clear_tags(self.fs.as_ref(), &self.layout, &name);
                let script_path = self.layout.job_script(&name);
                if self.fs.exists(&script_path) {
                    if let Err(e) = self.fs.remove_file(&script_path) {
                        warn!(job = %name, error = %e, "failed to delete wrapper script");
                    }
                }
            }

            let blocked = self.core.record_outcome(idx, outcome);

            if self.opts.flag_verbose {
                println!("job '{name}' {outcome}");
                for b in &blocked {
                    println!(
                        "job '{}' will not run (upstream failure in '{name}')",
                        self.core.graph().name_of(*b)
                    );
                }
            }
            info!(job = %name, status = %outcome, blocked = blocked.len(), "job reached terminal state");
        }
    }

    /// Submit the snapshot of ready jobs. A submission error is fatal: the
    /// caller releases the lock and re-raises.
    async fn submit_ready(&mut self, ready: &[usize]) -> Result<()> {
        for &idx in ready {
            let name = self.core.graph().name_of(idx).to_string();

            let script_path = if self.opts.mode.uses_script() {
                script::write_script(
                    self.fs.as_ref(),
                    &self.record,
                    &self.layout,
                    &name,
                    &self.opts.shell_options,
                    &self.opts.init_command,
                )?
            } else {
                self.layout.job_script(&name)
            };

            let request = SubmitRequest {
                job: name.clone(),
                invocation: script::runner_invocation(
                    &self.record,
                    &self.layout,
                    &name,
                    &self.opts.init_command,
                ),
                script: script_path,
                log: self.layout.job_log(&name),
                oqsub: self.layout.qsub_stdout(&name),
                eqsub: self.layout.qsub_stderr(&name),
            };

            self.core.mark_submitted(idx);
            self.state.set_status(&name, JobStatus::Submitted);
            if self.opts.flag_verbose {
                println!("job '{name}' submitted");
            }
            info!(job = %name, queued = self.core.queued(), "job submitted");

            self.backend.submit(request).await?;
        }
        Ok(())
    }
}
