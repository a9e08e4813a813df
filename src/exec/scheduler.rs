// src/exec/scheduler.rs

//! Pure scheduling core of the supervisor.
//!
//! Jobs are partitioned into `todo`, `running`, and `done` (disjoint,
//! exhaustive). The core owns the working adjacency in the form of
//! remaining in-edge counts: a `todo` job with zero remaining in-edges is
//! ready. Completion of a finished job clears its outgoing edges; a failure
//! removes every transitive descendant from `todo`.
//!
//! The core performs no IO and is unit-testable without Tokio, tag files,
//! or processes; the IO shell lives in [`super::supervisor`].

use std::collections::BTreeMap;

use tracing::debug;

use crate::dag::JobGraph;
use crate::job::{JobName, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Todo,
    Running,
    Done,
}

/// Snapshot of the partition sizes, for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreCounts {
    pub todo: usize,
    pub running: usize,
    pub finished: usize,
    pub failed: usize,
    /// Jobs that will never run because an ancestor failed.
    pub blocked: usize,
}

#[derive(Debug)]
pub struct SupervisorCore {
    graph: JobGraph,
    deps_left: Vec<usize>,
    part: Vec<Part>,
    status: Vec<JobStatus>,
    queued: usize,
}

impl SupervisorCore {
    /// Build the core from the planned statuses.
    ///
    /// Jobs already `finished` go straight to `done` and their outgoing
    /// edges are cleared, so their descendants can become ready; every
    /// other job starts in `todo` as `none`.
    pub fn new(graph: JobGraph, planned: &BTreeMap<JobName, JobStatus>) -> Self {
        let n = graph.len();
        let mut deps_left: Vec<usize> = (0..n).map(|i| graph.parents_of(i).len()).collect();
        let mut part = vec![Part::Todo; n];
        let mut status = vec![JobStatus::None; n];

        for (idx, name) in graph.names().iter().enumerate() {
            if planned.get(name).copied() == Some(JobStatus::Finished) {
                part[idx] = Part::Done;
                status[idx] = JobStatus::Finished;
            }
        }
        for idx in 0..n {
            if part[idx] == Part::Done {
                for &child in graph.children_of(idx) {
                    deps_left[child] -= 1;
                }
            }
        }

        Self {
            graph,
            deps_left,
            part,
            status,
            queued: 0,
        }
    }

    pub fn graph(&self) -> &JobGraph {
        &self.graph
    }

    /// Normal exit condition: `todo ∪ running = ∅`.
    pub fn is_complete(&self) -> bool {
        !self
            .part
            .iter()
            .any(|p| matches!(p, Part::Todo | Part::Running))
    }

    pub fn queued(&self) -> usize {
        self.queued
    }

    pub fn status_of(&self, idx: usize) -> JobStatus {
        self.status[idx]
    }

    /// Indices currently in the `running` partition, in insertion order.
    pub fn running_jobs(&self) -> Vec<usize> {
        (0..self.part.len())
            .filter(|&i| self.part[i] == Part::Running)
            .collect()
    }

    /// Ready jobs to submit this tick: `todo`, no remaining in-edges, in
    /// insertion order, limited so the queue never exceeds `max_queued`.
    pub fn ready_jobs(&self, max_queued: usize) -> Vec<usize> {
        let slots = max_queued.saturating_sub(self.queued);
        (0..self.part.len())
            .filter(|&i| self.part[i] == Part::Todo && self.deps_left[i] == 0)
            .take(slots)
            .collect()
    }

    /// Move a job from `todo` to `running` after handing it to a backend.
    pub fn mark_submitted(&mut self, idx: usize) {
        debug_assert_eq!(self.part[idx], Part::Todo);
        self.part[idx] = Part::Running;
        self.status[idx] = JobStatus::Submitted;
        self.queued += 1;
    }

    /// The `.running` tag was observed for a submitted job.
    pub fn mark_running(&mut self, idx: usize) {
        if self.status[idx] == JobStatus::Submitted {
            self.status[idx] = JobStatus::Running;
        }
    }

    /// Record a terminal outcome for a running job.
    ///
    /// `finished` clears the job's outgoing edges so its descendants may
    /// become ready on the next tick. `failed` removes every transitive
    /// descendant from `todo`; the removed indices are returned (their
    /// status stays `none` — they were never started).
    pub fn record_outcome(&mut self, idx: usize, outcome: JobStatus) -> Vec<usize> {
        debug_assert_eq!(self.part[idx], Part::Running);
        debug_assert!(matches!(outcome, JobStatus::Finished | JobStatus::Failed));

        self.part[idx] = Part::Done;
        self.status[idx] = outcome;
        self.queued -= 1;

        match outcome {
            JobStatus::Finished => {
                for &child in self.graph.children_of(idx).iter() {
                    self.deps_left[child] -= 1;
                }
                Vec::new()
            }
            _ => {
                let mut blocked = Vec::new();
                for d in self.graph.descendants_of(idx) {
                    if self.part[d] == Part::Todo {
                        debug!(
                            job = self.graph.name_of(d),
                            failed = self.graph.name_of(idx),
                            "removing descendant of failed job from todo"
                        );
                        self.part[d] = Part::Done;
                        blocked.push(d);
                    }
                }
                blocked
            }
        }
    }

    pub fn counts(&self) -> CoreCounts {
        let mut counts = CoreCounts {
            todo: 0,
            running: 0,
            finished: 0,
            failed: 0,
            blocked: 0,
        };
        for idx in 0..self.part.len() {
            match (self.part[idx], self.status[idx]) {
                (Part::Todo, _) => counts.todo += 1,
                (Part::Running, _) => counts.running += 1,
                (Part::Done, JobStatus::Finished) => counts.finished += 1,
                (Part::Done, JobStatus::Failed) => counts.failed += 1,
                (Part::Done, _) => counts.blocked += 1,
            }
        }
        counts
    }
}
