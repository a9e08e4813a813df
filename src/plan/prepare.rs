// src/plan/prepare.rs

//! Filesystem preparation between planning and execution.
//!
//! Creates the directories the run will write into, deletes the stale
//! outputs of jobs that are about to be re-executed, purges leftover tag
//! files and logs from earlier runs, and reports inputs that no job
//! produces and that are absent from disk.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::InitOptions;
use crate::dag::JobGraph;
use crate::errors::{PipedagError, Result};
use crate::fs::FileSystem;
use crate::job::{JobStatus, Pipeline};
use crate::store::paths::LogsLayout;
use crate::store::state::PipelineState;

/// Filenames purged from the logs directory before a run.
const PURGED_EXTENSIONS: [&str; 7] = [
    "running", "failed", "finished", "exit", "log", "oqsub", "eqsub",
];

/// Prepare the logs directory and the output locations for execution.
///
/// Returns the list of missing external inputs (inputs of non-finished jobs
/// that no pipeline job produces and that do not exist on disk). With
/// `flag_pause` on, the operator is asked to confirm before stale outputs
/// are deleted and before starting with missing inputs; declining aborts.
pub fn prepare_filesystem(
    fs: &dyn FileSystem,
    layout: &LogsLayout,
    graph: &JobGraph,
    pipeline: &Pipeline,
    state: &PipelineState,
    opts: &InitOptions,
) -> Result<Vec<PathBuf>> {
    fs.create_dir_all(layout.root())?;

    create_output_dirs(fs, pipeline)?;

    if opts.flag_clean {
        clean_stale_outputs(fs, pipeline, state, opts)?;
    }

    purge_logs_dir(fs, layout)?;

    let missing = missing_external_inputs(fs, graph, pipeline, state);
    if !missing.is_empty() {
        for path in &missing {
            warn!(path = %path.display(), "input produced by no job is missing on disk");
        }
        if opts.flag_pause
            && !operator_confirms(&format!(
                "{} input file(s) are missing; start anyway?",
                missing.len()
            ))
        {
            return Err(PipedagError::InvalidPipeline(
                "interrupted by the operator: missing input files".to_string(),
            ));
        }
    }

    Ok(missing)
}

/// Create every missing parent directory of every declared output.
fn create_output_dirs(fs: &dyn FileSystem, pipeline: &Pipeline) -> Result<()> {
    let mut dirs: BTreeSet<PathBuf> = BTreeSet::new();
    for spec in pipeline.values() {
        for out in spec.effective_outputs() {
            if let Some(parent) = out.parent() {
                if !parent.as_os_str().is_empty() {
                    dirs.insert(parent.to_path_buf());
                }
            }
        }
    }

    for dir in dirs {
        if !fs.exists(&dir) {
            debug!(dir = %dir.display(), "creating output directory");
            fs.create_dir_all(&dir)?;
        }
    }
    Ok(())
}

/// Delete the declared outputs of every job that is not `finished`.
///
/// Deletion failures (typically permissions) are downgraded to warnings.
fn clean_stale_outputs(
    fs: &dyn FileSystem,
    pipeline: &Pipeline,
    state: &PipelineState,
    opts: &InitOptions,
) -> Result<()> {
    let stale: Vec<(&str, &PathBuf)> = pipeline
        .iter()
        .filter(|(name, _)| state.status_of(name) != JobStatus::Finished)
        .flat_map(|(name, spec)| {
            spec.effective_outputs()
                .filter(|out| fs.exists(out))
                .map(move |out| (name.as_str(), out))
        })
        .collect();

    if stale.is_empty() {
        return Ok(());
    }

    if opts.flag_pause
        && !operator_confirms(&format!(
            "{} stale output file(s) will be deleted; proceed?",
            stale.len()
        ))
    {
        return Err(PipedagError::InvalidPipeline(
            "interrupted by the operator: stale outputs kept".to_string(),
        ));
    }

    for (job, out) in stale {
        if let Err(e) = fs.remove_file(out) {
            warn!(job, path = %out.display(), error = %e, "could not delete stale output");
        }
    }
    Ok(())
}

/// Remove every per-job artifact of earlier runs: tag files, logs, cluster
/// streams, and the `tmp/` script directory.
fn purge_logs_dir(fs: &dyn FileSystem, layout: &LogsLayout) -> Result<()> {
    for entry in fs.read_dir(layout.root())? {
        let purge = entry
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| PURGED_EXTENSIONS.contains(&ext))
            .unwrap_or(false);
        if purge {
            if let Err(e) = fs.remove_file(&entry) {
                warn!(path = %entry.display(), error = %e, "could not purge stale file");
            }
        }
    }

    let tmp = layout.tmp_dir();
    if fs.exists(&tmp) {
        fs.remove_dir_all(&tmp)?;
    }
    Ok(())
}

/// Inputs of non-finished jobs that no pipeline job produces and that are
/// absent from disk.
fn missing_external_inputs(
    fs: &dyn FileSystem,
    graph: &JobGraph,
    pipeline: &Pipeline,
    state: &PipelineState,
) -> Vec<PathBuf> {
    let mut missing: BTreeSet<PathBuf> = BTreeSet::new();

    for (name, spec) in pipeline.iter() {
        if state.status_of(name) == JobStatus::Finished {
            continue;
        }
        for input in spec.effective_inputs() {
            if !graph.has_producer(input) && !fs.exists(input) {
                missing.insert(input.clone());
            }
        }
    }

    missing.into_iter().collect()
}

/// Ask the operator a yes/no question on the controlling terminal.
fn operator_confirms(question: &str) -> bool {
    print!("{question} [y/N] ");
    let _ = std::io::stdout().flush();

    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::job::JobSpec;
    use std::path::Path;

    fn spec(command: &str, files_in: &[&str], files_out: &[&str]) -> JobSpec {
        JobSpec {
            command: command.to_string(),
            files_in: files_in.iter().map(PathBuf::from).collect(),
            files_out: files_out.iter().map(PathBuf::from).collect(),
            files_clean: Vec::new(),
            opt: serde_json::Value::Null,
        }
    }

    fn setup() -> (MockFileSystem, LogsLayout, InitOptions) {
        let fs = MockFileSystem::new();
        let layout = LogsLayout::new("/logs");
        fs.add_dir("/logs");
        (fs, layout, InitOptions::new("/logs"))
    }

    #[test]
    fn creates_missing_output_directories() {
        let (fs, layout, opts) = setup();
        let mut pipeline = Pipeline::new();
        pipeline.insert("gen".into(), spec("gen", &[], &["/w/deep/dir/a.out"]));
        let graph = JobGraph::build(&pipeline);
        let state = PipelineState::fresh(pipeline.clone());

        prepare_filesystem(&fs, &layout, &graph, &pipeline, &state, &opts).unwrap();
        assert!(fs.exists(Path::new("/w/deep/dir")));
    }

    #[test]
    fn cleans_outputs_of_non_finished_jobs_only() {
        let (fs, layout, opts) = setup();
        let mut pipeline = Pipeline::new();
        pipeline.insert("keep".into(), spec("keep", &[], &["/w/keep.out"]));
        pipeline.insert("redo".into(), spec("redo", &[], &["/w/redo.out"]));
        fs.add_file("/w/keep.out", "old");
        fs.add_file("/w/redo.out", "old");

        let graph = JobGraph::build(&pipeline);
        let mut state = PipelineState::fresh(pipeline.clone());
        state.set_status("keep", JobStatus::Finished);

        prepare_filesystem(&fs, &layout, &graph, &pipeline, &state, &opts).unwrap();
        assert!(fs.exists(Path::new("/w/keep.out")));
        assert!(!fs.exists(Path::new("/w/redo.out")));
    }

    #[test]
    fn flag_clean_off_keeps_stale_outputs() {
        let (fs, layout, mut opts) = setup();
        opts.flag_clean = false;
        let mut pipeline = Pipeline::new();
        pipeline.insert("redo".into(), spec("redo", &[], &["/w/redo.out"]));
        fs.add_file("/w/redo.out", "old");

        let graph = JobGraph::build(&pipeline);
        let state = PipelineState::fresh(pipeline.clone());

        prepare_filesystem(&fs, &layout, &graph, &pipeline, &state, &opts).unwrap();
        assert!(fs.exists(Path::new("/w/redo.out")));
    }

    #[test]
    fn purges_stale_tags_logs_and_tmp() {
        let (fs, layout, opts) = setup();
        fs.add_file("/logs/old.finished", "");
        fs.add_file("/logs/old.log", "text");
        fs.add_file("/logs/old.oqsub", "queue");
        fs.add_file("/logs/PIPE_status.main", "{}");
        fs.add_file("/logs/tmp/old.sh", "#!/bin/sh");

        let pipeline = Pipeline::new();
        let graph = JobGraph::build(&pipeline);
        let state = PipelineState::fresh(pipeline.clone());

        prepare_filesystem(&fs, &layout, &graph, &pipeline, &state, &opts).unwrap();
        assert!(!fs.exists(Path::new("/logs/old.finished")));
        assert!(!fs.exists(Path::new("/logs/old.log")));
        assert!(!fs.exists(Path::new("/logs/old.oqsub")));
        assert!(!fs.exists(Path::new("/logs/tmp/old.sh")));
        // Control-plane stores survive the purge.
        assert!(fs.exists(Path::new("/logs/PIPE_status.main")));
    }

    #[test]
    fn reports_missing_external_inputs_for_non_finished_jobs() {
        let (fs, layout, opts) = setup();
        let mut pipeline = Pipeline::new();
        pipeline.insert("gen".into(), spec("gen", &[], &["/w/a.out"]));
        pipeline.insert(
            "use".into(),
            spec("use", &["/w/a.out", "/ext/raw.dat"], &["/w/b.out"]),
        );

        let graph = JobGraph::build(&pipeline);
        let state = PipelineState::fresh(pipeline.clone());

        let missing =
            prepare_filesystem(&fs, &layout, &graph, &pipeline, &state, &opts).unwrap();
        // a.out is produced by the pipeline: not reported. raw.dat is not.
        assert_eq!(missing, vec![PathBuf::from("/ext/raw.dat")]);
    }
}
