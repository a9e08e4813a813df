// src/dag/mod.rs

//! Dependency graph over job names.
//!
//! [`graph`] derives the DAG from the declared `files_in` / `files_out` /
//! `files_clean` of each job and keeps, for every edge, the set of files
//! that induced it. Acyclicity is checked separately in `config::validate`.

pub mod graph;

pub use graph::JobGraph;
