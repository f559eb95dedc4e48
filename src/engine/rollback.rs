// src/engine/rollback.rs

//! Rollback stack and strategy dispatch.
//!
//! The orchestrator records every executed task here, in execution order.
//! On a forward failure it calls [`RollbackManager::rollback`], which walks
//! the stack most-recent-first and undoes each entry with the configured
//! [`RollbackStrategy`]. Failures are accumulated into the returned
//! [`RollbackResult`]; the manager itself never fails.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tracing::{debug, info, warn};

use crate::context::WorkflowContext;
use crate::engine::executor::TaskExecutor;
use crate::errors::{Result, TaskchainError};
use crate::task::Task;
use crate::types::RollbackStrategy;

/// One executed (or tracked-skipped) task on the rollback stack.
#[derive(Debug, Clone)]
pub struct RollbackEntry {
    pub task_id: String,
    pub task_name: String,
    pub task: Arc<Task>,
    pub executed_at: SystemTime,
    /// Set when a compensation was registered for the task at record time.
    pub compensation_id: Option<String>,
    /// Context the task produced; undo runs against it.
    pub context: WorkflowContext,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackResult {
    pub success: bool,
    pub rolled_back_tasks: Vec<String>,
    pub failed_tasks: Vec<String>,
    pub errors: Vec<TaskchainError>,
    pub duration_ms: u64,
}

impl RollbackResult {
    fn empty() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct RollbackManager {
    strategy: RollbackStrategy,
    continue_on_error: bool,
    executor: TaskExecutor,
    stack: Vec<RollbackEntry>,
    compensations: HashMap<String, Arc<Task>>,
}

impl RollbackManager {
    pub fn new(
        strategy: RollbackStrategy,
        continue_on_error: bool,
        executor: TaskExecutor,
    ) -> Self {
        Self {
            strategy,
            continue_on_error,
            executor,
            stack: Vec::new(),
            compensations: HashMap::new(),
        }
    }

    pub fn strategy(&self) -> RollbackStrategy {
        self.strategy
    }

    /// Register `compensation` as the saga step that replaces `task_id`'s undo.
    pub fn register_compensation(
        &mut self,
        task_id: impl Into<String>,
        compensation: impl Into<Arc<Task>>,
    ) {
        let task_id = task_id.into();
        debug!(task = %task_id, "registered compensation");
        self.compensations.insert(task_id, compensation.into());
    }

    pub fn unregister_compensation(&mut self, task_id: &str) -> Option<Arc<Task>> {
        self.compensations.remove(task_id)
    }

    pub fn compensation_for(&self, task_id: &str) -> Result<Arc<Task>> {
        self.compensations
            .get(task_id)
            .cloned()
            .ok_or_else(|| TaskchainError::CompensationNotFound(task_id.to_string()))
    }

    /// Push `task` onto the stack together with the context it produced.
    pub fn record(&mut self, task: Arc<Task>, context: WorkflowContext) {
        let compensation_id = self
            .compensations
            .contains_key(task.id())
            .then(|| task.id().to_string());

        debug!(task = %task.id(), depth = self.stack.len() + 1, "recorded for rollback");
        self.stack.push(RollbackEntry {
            task_id: task.id().to_string(),
            task_name: task.name().to_string(),
            task,
            executed_at: SystemTime::now(),
            compensation_id,
            context,
        });
    }

    pub fn entries(&self) -> &[RollbackEntry] {
        &self.stack
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Drop every recorded entry. Compensations stay registered.
    pub fn reset(&mut self) {
        self.stack.clear();
    }

    /// Undo the recorded entries in reverse order.
    pub async fn rollback(&self) -> RollbackResult {
        if self.strategy == RollbackStrategy::None {
            debug!("rollback strategy is none; nothing to undo");
            return RollbackResult::empty();
        }

        let started = Instant::now();
        let mut result = RollbackResult::empty();

        info!(
            strategy = %self.strategy,
            entries = self.stack.len(),
            "rolling back"
        );

        for entry in self.stack.iter().rev() {
            match self.undo_entry(entry).await {
                Ok(()) => result.rolled_back_tasks.push(entry.task_id.clone()),
                Err(err) => {
                    warn!(task = %entry.task_id, error = %err, "rollback step failed");
                    result.success = false;
                    result.failed_tasks.push(entry.task_id.clone());
                    result.errors.push(err);
                    if !self.continue_on_error {
                        break;
                    }
                }
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            success = result.success,
            rolled_back = result.rolled_back_tasks.len(),
            failed = result.failed_tasks.len(),
            "rollback finished"
        );
        result
    }

    async fn undo_entry(&self, entry: &RollbackEntry) -> Result<()> {
        match self.strategy {
            RollbackStrategy::Reverse => self.reverse_undo(entry).await,
            RollbackStrategy::Compensation => match &entry.compensation_id {
                Some(id) => {
                    let compensation = self.compensation_for(id)?;
                    self.executor
                        .compensate(&entry.task, &compensation, entry.context.clone())
                        .await
                }
                None => self.reverse_undo(entry).await,
            },
            RollbackStrategy::Custom => {
                match self
                    .executor
                    .undo_with_hooks(&entry.task, entry.context.clone())
                    .await
                {
                    Err(TaskchainError::UnsupportedUndo(_)) => Ok(()),
                    other => other,
                }
            }
            RollbackStrategy::None => Ok(()),
        }
    }

    async fn reverse_undo(&self, entry: &RollbackEntry) -> Result<()> {
        match self.executor.undo(&entry.task, entry.context.clone()).await {
            Err(TaskchainError::UnsupportedUndo(_)) => {
                debug!(task = %entry.task_id, "no undo; nothing to roll back");
                Ok(())
            }
            other => other,
        }
    }
}
