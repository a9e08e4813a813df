// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::job::{JobName, Pipeline};

/// Dependency graph over job indices.
///
/// Jobs are held as an ordered name vector plus a `name -> index` map; the
/// adjacency lists and per-edge file sets are keyed by index. This keeps the
/// hot paths (planner fixpoint, supervisor poll) free of string lookups, and
/// the order of `names` doubles as the deterministic tie-break order for
/// ready jobs.
///
/// There is an edge `B -> A` iff `files_in(A)` intersects
/// `files_out(B) ∪ files_clean(B)`. Duplicate edges are coalesced and their
/// file sets unioned; a job consuming a path it also declares itself is not
/// given a self-edge.
#[derive(Debug, Clone)]
pub struct JobGraph {
    names: Vec<JobName>,
    index: HashMap<JobName, usize>,
    parents: Vec<Vec<usize>>,
    children: Vec<Vec<usize>>,
    edge_files: HashMap<(usize, usize), BTreeSet<PathBuf>>,
    outputs: Vec<BTreeSet<PathBuf>>,
    produced: BTreeSet<PathBuf>,
}

impl JobGraph {
    /// Build the graph from a pipeline.
    ///
    /// Wildcard paths and the `omitted` sentinel are skipped entirely, as if
    /// the corresponding declaration were empty.
    pub fn build(pipeline: &Pipeline) -> Self {
        let names: Vec<JobName> = pipeline.keys().cloned().collect();
        let index: HashMap<JobName, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();

        let n = names.len();
        let mut parents: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut edge_files: HashMap<(usize, usize), BTreeSet<PathBuf>> = HashMap::new();
        let mut outputs: Vec<BTreeSet<PathBuf>> = vec![BTreeSet::new(); n];

        // Invert files_out ∪ files_clean into a path -> producers index. A
        // path may map to several jobs when one job produces it and another
        // cleans it.
        let mut produced_by: HashMap<&Path, Vec<usize>> = HashMap::new();
        let mut produced: BTreeSet<PathBuf> = BTreeSet::new();

        for (name, spec) in pipeline.iter() {
            let b = index[name];
            for path in spec.effective_outputs() {
                produced_by.entry(path.as_path()).or_default().push(b);
                produced.insert(path.clone());
                outputs[b].insert(path.clone());
            }
            for path in spec.effective_cleaned() {
                produced_by.entry(path.as_path()).or_default().push(b);
            }
        }

        for (name, spec) in pipeline.iter() {
            let a = index[name];
            for path in spec.effective_inputs() {
                let Some(sources) = produced_by.get(path.as_path()) else {
                    continue;
                };
                for &b in sources {
                    if b == a {
                        continue;
                    }
                    let files = edge_files.entry((b, a)).or_insert_with(|| {
                        parents[a].push(b);
                        children[b].push(a);
                        BTreeSet::new()
                    });
                    files.insert(path.clone());
                }
            }
        }

        Self {
            names,
            index,
            parents,
            children,
            edge_files,
            outputs,
            produced,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Job names in index order.
    pub fn names(&self) -> &[JobName] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name_of(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    /// Immediate parents of a job (the jobs it depends on).
    pub fn parents_of(&self, idx: usize) -> &[usize] {
        &self.parents[idx]
    }

    /// Immediate children of a job (the jobs that depend on it).
    pub fn children_of(&self, idx: usize) -> &[usize] {
        &self.children[idx]
    }

    /// The files that induced the edge `parent -> child`.
    pub fn files_on_edge(&self, parent: usize, child: usize) -> Option<&BTreeSet<PathBuf>> {
        self.edge_files.get(&(parent, child))
    }

    /// Declared outputs of a job (wildcards and sentinels excluded).
    pub fn outputs_of(&self, idx: usize) -> &BTreeSet<PathBuf> {
        &self.outputs[idx]
    }

    /// Whether any job in the pipeline lists this path in its `files_out`.
    pub fn has_producer(&self, path: &Path) -> bool {
        self.produced.contains(path)
    }

    /// All transitive descendants of a job, excluding the job itself.
    pub fn descendants_of(&self, idx: usize) -> Vec<usize> {
        self.walk(idx, &self.children)
    }

    /// All transitive ancestors of a job, excluding the job itself.
    pub fn ancestors_of(&self, idx: usize) -> Vec<usize> {
        self.walk(idx, &self.parents)
    }

    fn walk(&self, start: usize, adjacency: &[Vec<usize>]) -> Vec<usize> {
        let mut seen = vec![false; self.len()];
        let mut stack: Vec<usize> = adjacency[start].clone();
        let mut out = Vec::new();

        while let Some(i) = stack.pop() {
            if seen[i] || i == start {
                continue;
            }
            seen[i] = true;
            out.push(i);
            stack.extend_from_slice(&adjacency[i]);
        }

        out
    }

    /// Name-keyed adjacency (child lists), for the persisted `PIPE` record.
    pub fn adjacency_by_name(&self) -> BTreeMap<JobName, Vec<JobName>> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let children = self.children[i]
                    .iter()
                    .map(|&c| self.names[c].clone())
                    .collect();
                (name.clone(), children)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobSpec;

    fn spec(command: &str, files_in: &[&str], files_out: &[&str], files_clean: &[&str]) -> JobSpec {
        JobSpec {
            command: command.to_string(),
            files_in: files_in.iter().map(PathBuf::from).collect(),
            files_out: files_out.iter().map(PathBuf::from).collect(),
            files_clean: files_clean.iter().map(PathBuf::from).collect(),
            opt: serde_json::Value::Null,
        }
    }

    fn diamond() -> Pipeline {
        let mut p = Pipeline::new();
        p.insert("a".into(), spec("gen", &[], &["/w/a.out"], &[]));
        p.insert("b".into(), spec("left", &["/w/a.out"], &["/w/b.out"], &[]));
        p.insert("c".into(), spec("right", &["/w/a.out"], &["/w/c.out"], &[]));
        p.insert(
            "d".into(),
            spec("join", &["/w/b.out", "/w/c.out"], &["/w/d.out"], &[]),
        );
        p
    }

    #[test]
    fn diamond_edges_and_file_sets() {
        let g = JobGraph::build(&diamond());
        let (a, b, c, d) = (
            g.index_of("a").unwrap(),
            g.index_of("b").unwrap(),
            g.index_of("c").unwrap(),
            g.index_of("d").unwrap(),
        );

        assert_eq!(g.parents_of(a), &[] as &[usize]);
        assert_eq!(g.parents_of(b), &[a]);
        assert_eq!(g.parents_of(c), &[a]);
        let mut d_parents = g.parents_of(d).to_vec();
        d_parents.sort_unstable();
        assert_eq!(d_parents, vec![b, c]);

        let files = g.files_on_edge(a, b).unwrap();
        assert!(files.contains(Path::new("/w/a.out")));
        assert_eq!(files.len(), 1);

        let mut descendants = g.descendants_of(a);
        descendants.sort_unstable();
        assert_eq!(descendants, vec![b, c, d]);

        let mut ancestors = g.ancestors_of(d);
        ancestors.sort_unstable();
        assert_eq!(ancestors, vec![a, b, c]);
    }

    #[test]
    fn cleaner_becomes_a_parent_of_the_consumer() {
        let mut p = Pipeline::new();
        p.insert("producer".into(), spec("gen", &[], &["/w/f"], &[]));
        p.insert("cleaner".into(), spec("rm", &[], &[], &["/w/f"]));
        p.insert("consumer".into(), spec("use", &["/w/f"], &[], &[]));

        let g = JobGraph::build(&p);
        let consumer = g.index_of("consumer").unwrap();
        let mut parents: Vec<&str> = g
            .parents_of(consumer)
            .iter()
            .map(|&i| g.name_of(i))
            .collect();
        parents.sort_unstable();
        assert_eq!(parents, vec!["cleaner", "producer"]);
    }

    #[test]
    fn wildcards_and_sentinel_inputs_induce_no_edges() {
        let mut p = Pipeline::new();
        p.insert("gen".into(), spec("gen", &[], &["/w/a.out"], &[]));
        p.insert(
            "use".into(),
            spec("use", &["/w/*.out", "omitted"], &[], &[]),
        );

        let g = JobGraph::build(&p);
        let use_idx = g.index_of("use").unwrap();
        assert!(g.parents_of(use_idx).is_empty());
    }

    #[test]
    fn own_output_as_input_is_not_a_self_edge() {
        let mut p = Pipeline::new();
        p.insert(
            "inplace".into(),
            spec("touch", &["/w/state"], &["/w/state"], &[]),
        );

        let g = JobGraph::build(&p);
        let idx = g.index_of("inplace").unwrap();
        assert!(g.parents_of(idx).is_empty());
        assert!(g.children_of(idx).is_empty());
    }

    #[test]
    fn duplicate_edges_are_coalesced_with_unioned_files() {
        let mut p = Pipeline::new();
        p.insert(
            "gen".into(),
            spec("gen", &[], &["/w/a.out", "/w/b.out"], &[]),
        );
        p.insert(
            "use".into(),
            spec("use", &["/w/a.out", "/w/b.out"], &[], &[]),
        );

        let g = JobGraph::build(&p);
        let (gen, use_idx) = (g.index_of("gen").unwrap(), g.index_of("use").unwrap());
        assert_eq!(g.parents_of(use_idx), &[gen]);
        assert_eq!(g.files_on_edge(gen, use_idx).unwrap().len(), 2);
    }
}
