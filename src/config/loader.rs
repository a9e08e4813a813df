// src/config/loader.rs

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::dag::JobGraph;
use crate::errors::Result;
use crate::job::Pipeline;

/// On-disk pipeline definition.
///
/// ```toml
/// [job.preprocess]
/// command = "preprocess --subject 1"
/// files_in = ["/data/raw/subj1.nii"]
/// files_out = ["/data/clean/subj1.nii"]
///
/// [job.preprocess.opt]
/// smoothing = 6.0
/// ```
#[derive(Debug, Clone, Deserialize)]
struct PipelineFile {
    #[serde(default)]
    job: Pipeline,
}

/// Load a pipeline definition from a TOML file.
///
/// This only performs deserialization; it does **not** perform semantic
/// validation (unique outputs, acyclicity). Use [`load_and_validate`] for
/// that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Pipeline> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let file: PipelineFile = toml::from_str(&contents)?;

    Ok(file.job)
}

/// Load a pipeline definition from a path and run the fatal structural
/// checks: every job has a command, no output is produced twice, and the
/// dependency graph is acyclic.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Pipeline> {
    let pipeline = load_from_path(&path)?;
    super::validate::validate_pipeline(&pipeline)?;
    let graph = JobGraph::build(&pipeline);
    super::validate::validate_acyclic(&graph)?;
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const EXAMPLE: &str = r#"
[job.preprocess]
command = "preprocess --subject 1"
files_out = ["/data/clean/subj1.nii"]

[job.preprocess.opt]
smoothing = 6.0

[job.analyze]
command = "analyze --subject 1"
files_in = ["/data/clean/subj1.nii"]
files_out = ["/data/results/subj1.csv"]
"#;

    #[test]
    fn loads_jobs_with_opaque_opt_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(&path, EXAMPLE).unwrap();

        let pipeline = load_and_validate(&path).unwrap();
        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline["analyze"].files_in.len(), 1);
        assert_eq!(pipeline["preprocess"].opt["smoothing"], 6.0);
    }

    #[test]
    fn cyclic_file_on_disk_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(
            &path,
            r#"
[job.x]
command = "x"
files_in = ["/f/y"]
files_out = ["/f/x"]

[job.y]
command = "y"
files_in = ["/f/x"]
files_out = ["/f/y"]
"#,
        )
        .unwrap();

        assert!(load_and_validate(&path).is_err());
    }
}
