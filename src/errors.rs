// src/errors.rs

//! Crate-wide error type and helpers.
//!
//! Every variant belongs to one of five [`ErrorKind`]s. Validation errors are
//! raised before any task runs; execution and rollback errors are tagged with
//! the task name and the lifecycle [`Phase`] that failed.

use std::fmt;

use thiserror::Error;

/// Lifecycle phase in which a task failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    BeforeExecute,
    Validate,
    Execute,
    AfterExecute,
    BeforeRollback,
    Undo,
    AfterRollback,
    Compensate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::BeforeExecute => "before_execute",
            Phase::Validate => "validate",
            Phase::Execute => "execute",
            Phase::AfterExecute => "after_execute",
            Phase::BeforeRollback => "before_rollback",
            Phase::Undo => "undo",
            Phase::AfterRollback => "after_rollback",
            Phase::Compensate => "compensate",
        };
        f.write_str(s)
    }
}

/// Coarse classification of [`TaskchainError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Execution,
    Rollback,
    UnsupportedOperation,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskchainError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Circular dependency detected involving task '{task}' ({})", path.join(" -> "))]
    CircularDependency { task: String, path: Vec<String> },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Context key not found: {0}")]
    ContextKeyNotFound(String),

    #[error("No compensation registered for task: {0}")]
    CompensationNotFound(String),

    #[error("Task '{task}' failed during {phase}: {message}")]
    Execution {
        task: String,
        phase: Phase,
        message: String,
    },

    #[error("Rollback of task '{task}' failed during {phase}: {message}")]
    Rollback {
        task: String,
        phase: Phase,
        message: String,
    },

    #[error("Task '{0}' does not support undo")]
    UnsupportedUndo(String),
}

impl TaskchainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskchainError::Validation(_)
            | TaskchainError::ConfigError(_)
            | TaskchainError::DuplicateTask(_)
            | TaskchainError::UnknownDependency { .. }
            | TaskchainError::CircularDependency { .. } => ErrorKind::Validation,
            TaskchainError::TaskNotFound(_)
            | TaskchainError::ContextKeyNotFound(_)
            | TaskchainError::CompensationNotFound(_) => ErrorKind::NotFound,
            TaskchainError::Execution { .. } => ErrorKind::Execution,
            TaskchainError::Rollback { .. } => ErrorKind::Rollback,
            TaskchainError::UnsupportedUndo(_) => ErrorKind::UnsupportedOperation,
        }
    }

    /// Build an execution error from a task body failure.
    ///
    /// The full `anyhow` context chain is kept in the message.
    pub fn execution(task: &str, phase: Phase, err: &anyhow::Error) -> Self {
        TaskchainError::Execution {
            task: task.to_string(),
            phase,
            message: format!("{err:#}"),
        }
    }

    /// Build a rollback error from an undo/compensation failure.
    pub fn rollback(task: &str, phase: Phase, err: &anyhow::Error) -> Self {
        TaskchainError::Rollback {
            task: task.to_string(),
            phase,
            message: format!("{err:#}"),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskchainError>;
