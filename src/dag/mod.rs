// src/dag/mod.rs

//! Dependency graph handling.
//!
//! - [`registry`] stores tasks by id and produces a dependency-respecting
//!   execution order, rejecting duplicates, unknown dependencies and cycles.

pub mod registry;

pub use registry::TaskRegistry;
