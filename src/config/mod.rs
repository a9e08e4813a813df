// src/config/mod.rs

//! Options, pipeline loading, and validation.
//!
//! - [`model`] holds the initializer and supervisor option structs.
//! - [`loader`] reads a pipeline definition from a TOML file.
//! - [`validate`] performs the fatal structural checks (commands present,
//!   unique outputs, acyclic graph).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ExecMode, InitOptions, RunOptions};
pub use validate::{validate_acyclic, validate_pipeline};
