#![allow(dead_code)]

use std::path::PathBuf;

use pipedag::job::{JobSpec, Pipeline};

/// Builder for `Pipeline` to simplify test setup.
pub struct PipelineBuilder {
    pipeline: Pipeline,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            pipeline: Pipeline::new(),
        }
    }

    pub fn with_job(mut self, name: &str, spec: JobSpec) -> Self {
        self.pipeline.insert(name.to_string(), spec);
        self
    }

    pub fn build(self) -> Pipeline {
        self.pipeline
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `JobSpec`.
pub struct JobSpecBuilder {
    spec: JobSpec,
}

impl JobSpecBuilder {
    pub fn new(command: &str) -> Self {
        Self {
            spec: JobSpec::new(command),
        }
    }

    pub fn input(mut self, path: &str) -> Self {
        self.spec.files_in.push(PathBuf::from(path));
        self
    }

    pub fn output(mut self, path: &str) -> Self {
        self.spec.files_out.push(PathBuf::from(path));
        self
    }

    pub fn clean(mut self, path: &str) -> Self {
        self.spec.files_clean.push(PathBuf::from(path));
        self
    }

    pub fn opt(mut self, value: serde_json::Value) -> Self {
        self.spec.opt = value;
        self
    }

    pub fn build(self) -> JobSpec {
        self.spec
    }
}

/// The diamond used across the integration tests:
/// `a -> {b, c} -> d`, with every edge carried by one output file.
pub fn diamond_pipeline() -> Pipeline {
    PipelineBuilder::new()
        .with_job(
            "a",
            JobSpecBuilder::new("gen a").output("/w/a.out").build(),
        )
        .with_job(
            "b",
            JobSpecBuilder::new("gen b")
                .input("/w/a.out")
                .output("/w/b.out")
                .build(),
        )
        .with_job(
            "c",
            JobSpecBuilder::new("gen c")
                .input("/w/a.out")
                .output("/w/c.out")
                .build(),
        )
        .with_job(
            "d",
            JobSpecBuilder::new("gen d")
                .input("/w/b.out")
                .input("/w/c.out")
                .output("/w/d.out")
                .build(),
        )
        .build()
}
