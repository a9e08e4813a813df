// src/plan/planner.rs

//! The restart planner.
//!
//! Given the current pipeline, the persisted state of a prior run, and the
//! user's overrides, decide which jobs must be (re)executed so that after
//! the run every requested output is fresh and internally consistent.
//!
//! The computation proceeds in phases:
//!
//! - **A** — normalize prior statuses from on-disk tags: a job left
//!   `submitted`/`running` by an interrupted run is promoted to `finished`
//!   if its tag arrived, demoted to `none` otherwise.
//! - **B** — seed the restart set from prior status, user-supplied name
//!   substrings, and descriptor diffs.
//! - **C** — close the set to fixpoint: descendants of restarted jobs, and
//!   ancestors whose edge files are missing on disk.
//! - **D** — assign final statuses: `finished` survives only outside the
//!   restart set; everything else becomes `none` with a blank log.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::dag::JobGraph;
use crate::exec::tags::{self, TagProbe};
use crate::fs::FileSystem;
use crate::job::{is_concrete_path, JobStatus, Pipeline};
use crate::plan::equality::specs_equal;
use crate::store::paths::LogsLayout;
use crate::store::state::PipelineState;

/// Result of the planning phases: a restart mask over graph indices.
#[derive(Debug, Clone)]
pub struct RestartPlan {
    restart: Vec<bool>,
}

impl RestartPlan {
    pub fn is_restart(&self, idx: usize) -> bool {
        self.restart[idx]
    }

    pub fn count(&self) -> usize {
        self.restart.iter().filter(|&&r| r).count()
    }

    pub fn restarted_names<'g>(&self, graph: &'g JobGraph) -> Vec<&'g str> {
        graph
            .names()
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.restart[*idx])
            .map(|(_, name)| name.as_str())
            .collect()
    }
}

/// Run phases A through C. `prior` is mutated by the normalization phase.
pub fn plan_restart(
    graph: &JobGraph,
    fs: &dyn FileSystem,
    layout: &LogsLayout,
    current: &Pipeline,
    prior: &mut PipelineState,
    restart_names: &[String],
    flag_update: bool,
) -> RestartPlan {
    normalize_prior_status(fs, layout, prior);

    let mut restart = seed_restart(graph, current, prior, restart_names, flag_update);
    close_to_fixpoint(graph, fs, &mut restart);

    let plan = RestartPlan { restart };
    info!(
        restarted = plan.count(),
        total = graph.len(),
        "restart plan computed"
    );
    plan
}

/// Phase A — reconcile prior statuses with the tag files.
///
/// Only jobs left `submitted` or `running` are probed: anything else was
/// already terminal (or never ran) when the prior supervisor stopped. A
/// `.finished` tag promotes the job and its log is harvested; otherwise the
/// job was interrupted and reverts to `none`.
pub fn normalize_prior_status(fs: &dyn FileSystem, layout: &LogsLayout, prior: &mut PipelineState) {
    let in_flight: Vec<String> = prior
        .status
        .iter()
        .filter(|(_, s)| matches!(s, JobStatus::Submitted | JobStatus::Running))
        .map(|(name, _)| name.clone())
        .collect();

    for name in in_flight {
        let probe = TagProbe::read(fs, layout, &name);
        if probe.finished {
            debug!(job = %name, "interrupted job finished after the fact");
            prior.set_status(&name, JobStatus::Finished);
            prior
                .logs
                .insert(name.clone(), tags::harvest_log(fs, layout, &name));
            prior
                .profile
                .insert(name.clone(), tags::read_profile(fs, layout, &name));
        } else {
            debug!(job = %name, "interrupted job has no finished tag; resetting");
            prior.set_status(&name, JobStatus::None);
        }
    }
}

/// Phase B — the seed restart set.
fn seed_restart(
    graph: &JobGraph,
    current: &Pipeline,
    prior: &PipelineState,
    restart_names: &[String],
    flag_update: bool,
) -> Vec<bool> {
    let mut restart = vec![false; graph.len()];

    for (idx, name) in graph.names().iter().enumerate() {
        let prior_status = prior.status_of(name);
        if prior_status.needs_restart() {
            debug!(job = %name, status = %prior_status, "restart: prior status");
            restart[idx] = true;
            continue;
        }

        if restart_names.iter().any(|sub| name.contains(sub.as_str())) {
            debug!(job = %name, "restart: requested by name");
            restart[idx] = true;
            continue;
        }

        if flag_update {
            let changed = match prior.spec_of(name) {
                None => true,
                Some(old) => !specs_equal(&current[name], old),
            };
            if changed {
                debug!(job = %name, "restart: descriptor is new or changed");
                restart[idx] = true;
            }
        }
    }

    restart
}

/// Phase C — close the restart set to fixpoint.
///
/// Each round applies two monotone rules until neither adds a job:
///
/// - every descendant of a restarted job restarts;
/// - walking the ancestor subgraph of every restarted job, any edge whose
///   file set has a file missing on disk restarts the edge's source, unless
///   the file is non-concrete (`omitted`, wildcard) or an already-restarted
///   producer of that file exists among the target's parents.
///
/// Termination: the universe is finite and jobs are never un-marked, so the
/// fixpoint is reached in at most `|jobs|` rounds.
fn close_to_fixpoint(graph: &JobGraph, fs: &dyn FileSystem, restart: &mut [bool]) {
    loop {
        let mut changed = false;

        for idx in 0..graph.len() {
            if !restart[idx] {
                continue;
            }
            for &child in graph.children_of(idx) {
                if !restart[child] {
                    restart[child] = true;
                    changed = true;
                }
            }
        }

        for idx in 0..graph.len() {
            if !restart[idx] {
                continue;
            }
            if mark_ancestors_with_missing_files(graph, fs, idx, restart) {
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }
}

/// Walk every edge between ancestors of `job` (and into `job` itself) and
/// mark sources of edges whose files are missing. Returns whether anything
/// was newly marked.
fn mark_ancestors_with_missing_files(
    graph: &JobGraph,
    fs: &dyn FileSystem,
    job: usize,
    restart: &mut [bool],
) -> bool {
    let mut targets: Vec<usize> = graph.ancestors_of(job);
    targets.push(job);
    let mut changed = false;

    for &q in &targets {
        for &p in graph.parents_of(q) {
            if restart[p] {
                continue;
            }
            let Some(files) = graph.files_on_edge(p, q) else {
                continue;
            };
            let missing = files.iter().any(|f| {
                is_concrete_path(f)
                    && !fs.exists(f)
                    && !recreated_by_restarted_parent(graph, restart, q, f)
            });
            if missing {
                debug!(
                    parent = graph.name_of(p),
                    child = graph.name_of(q),
                    "restart: parent output missing on disk"
                );
                restart[p] = true;
                changed = true;
            }
        }
    }

    changed
}

fn recreated_by_restarted_parent(
    graph: &JobGraph,
    restart: &[bool],
    child: usize,
    file: &std::path::Path,
) -> bool {
    graph
        .parents_of(child)
        .iter()
        .any(|&r| restart[r] && graph.outputs_of(r).contains(file))
}

/// Phase D — final statuses and logs for the new run.
///
/// `finished` outside the restart set keeps its status, log, and profile;
/// every other job starts the run as `none` with a blank log.
pub fn final_state(
    graph: &JobGraph,
    plan: &RestartPlan,
    current: &Pipeline,
    prior: &PipelineState,
) -> PipelineState {
    let mut state = PipelineState::fresh(current.clone());

    let kept: HashSet<&str> = graph
        .names()
        .iter()
        .enumerate()
        .filter(|(idx, name)| {
            !plan.is_restart(*idx) && prior.status_of(name) == JobStatus::Finished
        })
        .map(|(_, name)| name.as_str())
        .collect();

    for name in kept {
        state.set_status(name, JobStatus::Finished);
        if let Some(log) = prior.logs.get(name) {
            state.logs.insert(name.to_string(), log.clone());
        }
        if let Some(profile) = prior.profile.get(name) {
            state.profile.insert(name.to_string(), profile.clone());
        }
    }

    state
}
