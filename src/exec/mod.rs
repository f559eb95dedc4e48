// src/exec/mod.rs

//! Shell-command adapter for pipeline files.
//!
//! - [`command`] runs one command with the context exported as environment
//!   variables.
//! - [`pipeline`] builds tasks, groups and compensations from a
//!   [`PipelineFile`](crate::config::PipelineFile).
//!
//! Nothing here makes orchestration decisions; it only constructs tasks.

pub mod command;
pub mod pipeline;

pub use command::{run_command, stdout_key};
pub use pipeline::{build_orchestrator, compensation_task, shell_task};
