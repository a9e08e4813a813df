// src/exec/mod.rs

//! Execution: the tag-file protocol, wrapper scripts, backend adapters, and
//! the supervisor.
//!
//! - [`tags`] reads and clears the per-job marker files.
//! - [`script`] renders the wrapper scripts submitted by script-based modes.
//! - [`backend`] abstracts submission over the execution modes.
//! - [`scheduler`] is the pure in-memory core deciding what runs when.
//! - [`supervisor`] is the IO shell around the core: the poll loop.

pub mod backend;
pub mod scheduler;
pub mod script;
pub mod supervisor;
pub mod tags;

pub use backend::{backend_for, Backend, SubmitRequest};
pub use scheduler::{CoreCounts, SupervisorCore};
pub use supervisor::Supervisor;
