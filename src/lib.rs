// src/lib.rs

//! `pipedag` — a pipeline manager driven by a filesystem protocol.
//!
//! Given a user-declared set of jobs with declared input and output files,
//! the **initializer** builds the dependency graph, diffs the pipeline
//! against the persisted description of a previous run, computes the
//! minimal-but-sufficient set of jobs to (re)start, and prepares the logs
//! directory. The **supervisor** then executes the plan: it keeps a bounded
//! queue of jobs in flight across one of several backends, polls their tag
//! files, aggregates their logs, cascades failures to descendants, and
//! persists enough state for a later restart to resume correctly.
//!
//! Commands are opaque: the crate never interprets what a job does, and
//! staleness is decided by structural comparison of job descriptors, not by
//! file contents.

pub mod config;
pub mod dag;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod job;
pub mod logging;
pub mod plan;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::config::{validate_acyclic, validate_pipeline, InitOptions, RunOptions};
use crate::dag::JobGraph;
use crate::errors::Result;
use crate::exec::{backend_for, Backend, Supervisor, SupervisorCore};
use crate::fs::{FileSystem, RealFileSystem};
use crate::job::Pipeline;
use crate::plan::{final_state, plan_restart, prepare_filesystem};
use crate::store::state::{append_history, read_pipe_record, write_pipe_record, PipeRecord};
use crate::store::{LogsLayout, PipelineState};

/// Initialize (or re-initialize) a pipeline in a logs directory.
///
/// Validates the pipeline, computes the restart plan against any prior run
/// persisted in `opts.path_logs`, prepares the filesystem, and writes the
/// control-plane stores. Returns the canonical path of the `PIPE.main`
/// record.
///
/// Structural errors (missing command, duplicate outputs, cycles) are fatal
/// and reported before the logs directory is touched.
pub fn init_pipeline(pipeline: Pipeline, opts: &InitOptions) -> Result<PathBuf> {
    init_pipeline_with(&RealFileSystem, pipeline, opts)
}

/// [`init_pipeline`] against an explicit filesystem, for embedding and
/// tests.
pub fn init_pipeline_with(
    fs: &dyn FileSystem,
    pipeline: Pipeline,
    opts: &InitOptions,
) -> Result<PathBuf> {
    validate_pipeline(&pipeline)?;
    let graph = JobGraph::build(&pipeline);
    validate_acyclic(&graph)?;

    let layout = LogsLayout::new(&opts.path_logs);

    let mut prior = if PipelineState::present(fs, &layout) {
        PipelineState::load(fs, &layout)?
    } else {
        PipelineState::default()
    };

    let plan = plan_restart(
        &graph,
        fs,
        &layout,
        &pipeline,
        &mut prior,
        &opts.restart,
        opts.flag_update,
    );
    if opts.flag_verbose {
        for name in plan.restarted_names(&graph) {
            println!("job '{name}' scheduled for (re)start");
        }
    }

    let mut state = final_state(&graph, &plan, &pipeline, &prior);

    prepare_filesystem(fs, &layout, &graph, &pipeline, &state, opts)?;

    // Names known only to the prior run are kept around: they may matter
    // when a superset pipeline is resumed later.
    state.merge_previous(prior);

    let record = PipeRecord {
        graph: graph.adjacency_by_name(),
        path_logs: layout.root().to_path_buf(),
        path_search: opts.path_search.clone(),
        command_runner: opts.command_runner.clone(),
    };
    write_pipe_record(fs, &layout, &record)?;
    state.save(fs, &layout)?;
    append_history(
        fs,
        &layout,
        &format!(
            "pipeline initialized ({} jobs, {} to run)",
            graph.len(),
            plan.count()
        ),
    );
    info!(jobs = graph.len(), to_run = plan.count(), "pipeline initialized");

    fs.canonicalize(&layout.pipe_main())
        .map_err(crate::errors::PipedagError::from)
}

/// Execute the prepared pipeline in `path_logs` with the production backend
/// for `opts.mode`.
pub async fn run_pipeline(path_logs: impl AsRef<Path>, opts: &RunOptions) -> Result<()> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let layout = LogsLayout::new(path_logs.as_ref());
    let backend = backend_for(opts.mode, fs.clone(), &layout, &opts.qsub_options);
    run_pipeline_with(fs, path_logs.as_ref(), opts, backend).await
}

/// [`run_pipeline`] against an explicit filesystem and backend, for
/// embedding and tests.
pub async fn run_pipeline_with(
    fs: Arc<dyn FileSystem>,
    path_logs: &Path,
    opts: &RunOptions,
    backend: Box<dyn Backend>,
) -> Result<()> {
    let layout = LogsLayout::new(path_logs);
    let record = read_pipe_record(fs.as_ref(), &layout)?;
    let state = PipelineState::load(fs.as_ref(), &layout)?;

    // The supervisor runs the jobs of the *current* pipeline; names kept
    // from earlier runs stay in the stores but are not scheduled.
    let current: Pipeline = state
        .jobs
        .iter()
        .filter(|(name, _)| record.graph.contains_key(*name))
        .map(|(name, spec)| (name.clone(), spec.clone()))
        .collect();
    let graph = JobGraph::build(&current);

    let core = SupervisorCore::new(graph, &state.status);
    let supervisor = Supervisor::new(core, state, record, layout, fs, backend, opts.clone());
    supervisor.run().await
}
