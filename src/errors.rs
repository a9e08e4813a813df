// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipedagError {
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("Cycle detected in job graph: {0}")]
    GraphCycle(String),

    #[error("Output produced by more than one job: {0}")]
    DuplicateOutput(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("State store unreadable (main and backup): {0}")]
    StoreCorrupt(String),

    #[error("Backend submission failed for job '{job}': {reason}")]
    SubmitFailed { job: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipedagError>;
