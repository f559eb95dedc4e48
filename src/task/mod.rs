// src/task/mod.rs

//! Task definitions and grouping.
//!
//! - [`definition`] holds the [`Task`] contract: bodies, hooks, dependencies.
//! - [`skip`] defines the [`SkipDecision`] returned by skip predicates.
//! - [`group`] holds [`TaskGroup`] and the expander that flattens groups into
//!   namespaced tasks.

pub mod definition;
pub mod group;
pub mod skip;

pub use definition::{BoxFuture, Task, TaskHooks};
pub use group::{ExpandedGroup, GroupMeta, GroupOptions, TaskGroup, expand, expand_groups};
pub use skip::SkipDecision;
