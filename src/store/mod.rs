// src/store/mod.rs

//! Persistent control-plane state inside the logs directory.
//!
//! - [`paths`] owns every canonical filename (stores, tags, logs, scripts).
//! - [`state`] holds the persisted records and the main/backup read-write
//!   protocol.

pub mod paths;
pub mod state;

pub use paths::{LogsLayout, TagKind};
pub use state::{append_history, read_pipe_record, write_pipe_record, PipeRecord, PipelineState};
