// src/exec/script.rs

//! Wrapper-script generation for script-based execution modes.
//!
//! The wrapper composes, in order: an optional shell-options prologue, the
//! interpreter invocation that starts the runner for one job, and the
//! unconditional creation of the `.exit` tag. The runner itself honors the
//! rest of the contract: it creates `<job>.running` on start, exactly one of
//! `<job>.finished` / `<job>.failed` on exit (failing the job when declared
//! outputs are absent), deletes `<job>.running`, and writes `<job>.profile`.
//! A crash that skips those steps leaves only the `.exit` tag, which the
//! supervisor treats as failure.

use std::path::PathBuf;

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::job::OMITTED;
use crate::store::paths::LogsLayout;
use crate::store::state::PipeRecord;

/// The interpreter invocation for one job: the runner is told where the
/// descriptors live, which job to run, where the logs directory is, and
/// which search path to install (skipped when the caller opted out with the
/// `omitted` sentinel).
pub fn runner_invocation(
    record: &PipeRecord,
    layout: &LogsLayout,
    job: &str,
    init_command: &str,
) -> String {
    let mut line = format!(
        "{} --jobs \"{}\" --job \"{}\" --logs \"{}\"",
        record.command_runner,
        layout.jobs_main().display(),
        job,
        layout.root().display(),
    );

    match record.path_search.as_deref() {
        None => {}
        Some(OMITTED) => {}
        Some(search) => {
            line.push_str(&format!(" --search-path \"{search}\""));
        }
    }

    if !init_command.is_empty() {
        line.push_str(&format!(" --init \"{init_command}\""));
    }

    line
}

/// Render the wrapper script for a job.
///
/// Stdout/stderr of the runner goes into `<job>.log`; anything the wrapper
/// itself prints stays on the wrapper streams (routed to `.oqsub`/`.eqsub`
/// by the cluster modes). The `.exit` tag is written no matter how the
/// runner terminated.
pub fn render_script(
    record: &PipeRecord,
    layout: &LogsLayout,
    job: &str,
    shell_options: &str,
    init_command: &str,
) -> String {
    let invocation = runner_invocation(record, layout, job, init_command);
    let log = layout.job_log(job);
    let exit_tag = layout.tag(job, crate::store::paths::TagKind::Exit);

    if cfg!(windows) {
        let mut script = String::from("@echo off\r\n");
        if !shell_options.is_empty() {
            script.push_str(shell_options);
            script.push_str("\r\n");
        }
        script.push_str(&format!(
            "{invocation} > \"{}\" 2>&1\r\n",
            log.display()
        ));
        script.push_str(&format!("type nul > \"{}\"\r\n", exit_tag.display()));
        script
    } else {
        let mut script = String::from("#!/bin/sh\n");
        if !shell_options.is_empty() {
            script.push_str(shell_options);
            script.push('\n');
        }
        // `|| :` so a failing runner still reaches the exit tag even under
        // `set -e` prologues.
        script.push_str(&format!(
            "{invocation} > \"{}\" 2>&1 || :\n",
            log.display()
        ));
        script.push_str(&format!("touch \"{}\"\n", exit_tag.display()));
        script
    }
}

/// Write the wrapper script to `tmp/<job>.sh` and return its path.
pub fn write_script(
    fs: &dyn FileSystem,
    record: &PipeRecord,
    layout: &LogsLayout,
    job: &str,
    shell_options: &str,
    init_command: &str,
) -> Result<PathBuf> {
    let path = layout.job_script(job);
    let body = render_script(record, layout, job, shell_options, init_command);
    fs.create_dir_all(&layout.tmp_dir())?;
    fs.write(&path, body.as_bytes())?;
    Ok(path)
}
