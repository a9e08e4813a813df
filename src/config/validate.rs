// src/config/validate.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;

use crate::dag::JobGraph;
use crate::errors::{PipedagError, Result};
use crate::job::Pipeline;

/// Run the per-job structural checks that do not need the dependency graph:
///
/// - every job declares a non-empty command,
/// - no output path is produced by more than one job,
/// - no job lists the same path in both its `files_out` and `files_clean`
///   (the behavior of such a job would be undefined once its outgoing edges
///   are cleared mid-run, so it is rejected up front).
pub fn validate_pipeline(pipeline: &Pipeline) -> Result<()> {
    ensure_commands(pipeline)?;
    ensure_unique_outputs(pipeline)?;
    ensure_no_produce_clean_overlap(pipeline)?;
    Ok(())
}

fn ensure_commands(pipeline: &Pipeline) -> Result<()> {
    for (name, spec) in pipeline.iter() {
        if spec.command.trim().is_empty() {
            return Err(PipedagError::InvalidPipeline(format!(
                "job '{}' has no command",
                name
            )));
        }
    }
    Ok(())
}

fn ensure_unique_outputs(pipeline: &Pipeline) -> Result<()> {
    let mut producers: BTreeMap<PathBuf, Vec<&str>> = BTreeMap::new();

    for (name, spec) in pipeline.iter() {
        for path in spec.effective_outputs() {
            producers.entry(path.clone()).or_default().push(name);
        }
    }

    let offending: Vec<String> = producers
        .iter()
        .filter(|(_, jobs)| jobs.len() >= 2)
        .map(|(path, jobs)| format!("{} (produced by {})", path.display(), jobs.join(", ")))
        .collect();

    if !offending.is_empty() {
        return Err(PipedagError::DuplicateOutput(offending.join("; ")));
    }
    Ok(())
}

fn ensure_no_produce_clean_overlap(pipeline: &Pipeline) -> Result<()> {
    for (name, spec) in pipeline.iter() {
        for path in spec.effective_outputs() {
            if spec.files_clean.contains(path) {
                return Err(PipedagError::InvalidPipeline(format!(
                    "job '{}' both produces and cleans '{}'",
                    name,
                    path.display()
                )));
            }
        }
    }
    Ok(())
}

/// Check that the dependency graph is acyclic.
///
/// On failure the error names every job participating in at least one cycle,
/// not just a single witness.
pub fn validate_acyclic(graph: &JobGraph) -> Result<()> {
    let mut check: DiGraphMap<usize, ()> = DiGraphMap::new();

    for idx in 0..graph.len() {
        check.add_node(idx);
    }
    for idx in 0..graph.len() {
        for &child in graph.children_of(idx) {
            check.add_edge(idx, child, ());
        }
    }

    // Every strongly connected component with more than one node is a cycle.
    // Self-edges are never built, so single-node components are fine.
    let mut cycling: Vec<&str> = tarjan_scc(&check)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .flatten()
        .map(|idx| graph.name_of(idx))
        .collect();

    if !cycling.is_empty() {
        cycling.sort_unstable();
        return Err(PipedagError::GraphCycle(cycling.join(", ")));
    }
    Ok(())
}
