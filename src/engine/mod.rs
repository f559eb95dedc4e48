// src/engine/mod.rs

//! Orchestration engine.
//!
//! - [`executor`] runs one task's forward or rollback lifecycle.
//! - [`rollback`] keeps the rollback stack and applies a [`RollbackStrategy`].
//! - [`orchestrator`] drives a whole run: group expansion, resolution,
//!   feature filtering, sequential execution and rollback on failure.
//!
//! The types shared across those pieces (options, run states, run output)
//! live here.

use std::collections::BTreeSet;
use std::fmt;

use crate::context::WorkflowContext;
use crate::errors::{Result, TaskchainError};
use crate::types::RollbackStrategy;

pub mod executor;
pub mod orchestrator;
pub mod rollback;

pub use executor::TaskExecutor;
pub use orchestrator::{ExecutionPlan, Orchestrator};
pub use rollback::{RollbackEntry, RollbackManager, RollbackResult};

/// Upper bound accepted for [`OrchestratorOptions::max_rollback_retries`].
pub const MAX_ROLLBACK_RETRIES_LIMIT: u32 = 10;

/// Knobs for one orchestration run.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Fixed id for the run; a fresh UUID is generated when `None`.
    pub execution_id: Option<String>,
    /// Exposed to tasks through [`WorkflowContext::is_dry_run`].
    pub dry_run: bool,
    pub enable_rollback: bool,
    pub rollback_strategy: RollbackStrategy,
    /// Keep undoing remaining entries after a rollback step fails.
    pub continue_on_error: bool,
    pub enabled_features: BTreeSet<String>,
    pub max_rollback_retries: u32,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            execution_id: None,
            dry_run: false,
            enable_rollback: true,
            rollback_strategy: RollbackStrategy::default(),
            continue_on_error: false,
            enabled_features: BTreeSet::new(),
            max_rollback_retries: executor::DEFAULT_MAX_ROLLBACK_RETRIES,
        }
    }
}

impl OrchestratorOptions {
    pub fn with_execution_id(mut self, id: impl Into<String>) -> Self {
        self.execution_id = Some(id.into());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn enable_rollback(mut self, enable: bool) -> Self {
        self.enable_rollback = enable;
        self
    }

    pub fn with_strategy(mut self, strategy: RollbackStrategy) -> Self {
        self.rollback_strategy = strategy;
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn enable_feature(mut self, feature: impl Into<String>) -> Self {
        self.enabled_features.insert(feature.into());
        self
    }

    pub fn with_max_rollback_retries(mut self, retries: u32) -> Self {
        self.max_rollback_retries = retries;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(id) = &self.execution_id {
            if id.trim().is_empty() {
                return Err(TaskchainError::Validation(
                    "execution_id must not be empty".to_string(),
                ));
            }
        }
        if self.enabled_features.iter().any(|f| f.trim().is_empty()) {
            return Err(TaskchainError::Validation(
                "enabled_features must not contain empty names".to_string(),
            ));
        }
        if self.max_rollback_retries > MAX_ROLLBACK_RETRIES_LIMIT {
            return Err(TaskchainError::Validation(format!(
                "max_rollback_retries must be <= {MAX_ROLLBACK_RETRIES_LIMIT} (got {})",
                self.max_rollback_retries
            )));
        }
        Ok(())
    }
}

/// Lifecycle of a single [`Orchestrator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Created,
    Resolving,
    Filtering,
    Executing,
    Completed,
    RollingBack,
    Done,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrchestratorState::Created => "created",
            OrchestratorState::Resolving => "resolving",
            OrchestratorState::Filtering => "filtering",
            OrchestratorState::Executing => "executing",
            OrchestratorState::Completed => "completed",
            OrchestratorState::RollingBack => "rolling_back",
            OrchestratorState::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTask {
    pub task_id: String,
    pub reason: Option<String>,
}

/// Everything a finished run reports.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub execution_id: String,
    pub success: bool,
    pub executed_task_ids: Vec<String>,
    pub skipped_tasks: Vec<SkippedTask>,
    /// Tasks filtered out because a required feature was not enabled.
    pub disabled_task_ids: Vec<String>,
    pub rolled_back_tasks: Vec<String>,
    /// The failing forward task first, then any tasks whose rollback failed.
    pub failed_tasks: Vec<String>,
    pub errors: Vec<TaskchainError>,
    pub duration_ms: u64,
    /// Context produced by the last task that ran.
    pub context: WorkflowContext,
}

impl RunOutput {
    pub fn skipped_task_ids(&self) -> impl Iterator<Item = &str> {
        self.skipped_tasks.iter().map(|s| s.task_id.as_str())
    }
}
