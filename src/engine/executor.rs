// src/engine/executor.rs

//! Single-task lifecycle runner.
//!
//! Forward: `before_execute -> validate -> execute -> after_execute`, with
//! `on_execute_error` seeing execute failures before they surface.
//!
//! Rollback: plain `undo`, or `before_rollback -> undo -> after_rollback`
//! with `on_rollback_error` deciding between propagate, recover and retry.
//!
//! Every failure is converted into a [`TaskchainError`] tagged with the task
//! name and the [`Phase`] that failed.

use tracing::{debug, warn};

use crate::context::WorkflowContext;
use crate::errors::{Phase, Result, TaskchainError};
use crate::task::Task;
use crate::task::definition::StepFn;
use crate::types::RollbackErrorAction;

pub const DEFAULT_MAX_ROLLBACK_RETRIES: u32 = 1;

#[derive(Debug, Clone, Copy)]
pub struct TaskExecutor {
    max_rollback_retries: u32,
}

impl Default for TaskExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROLLBACK_RETRIES)
    }
}

impl TaskExecutor {
    pub fn new(max_rollback_retries: u32) -> Self {
        Self {
            max_rollback_retries,
        }
    }

    pub fn max_rollback_retries(&self) -> u32 {
        self.max_rollback_retries
    }

    /// Run the forward lifecycle and return the context the task produced.
    pub async fn execute(&self, task: &Task, ctx: WorkflowContext) -> Result<WorkflowContext> {
        debug!(task = %task.id(), "executing task");

        run_step(task, &task.hooks.before_execute, &ctx, Phase::BeforeExecute, false).await?;
        run_step(task, &task.validate, &ctx, Phase::Validate, false).await?;

        let next = match (task.execute)(ctx.clone()).await {
            Ok(next) => next,
            Err(err) => {
                let err = TaskchainError::execution(task.name(), Phase::Execute, &err);
                if let Some(hook) = &task.hooks.on_execute_error {
                    if let Err(hook_err) = hook(ctx.clone(), err.clone()).await {
                        warn!(
                            task = %task.id(),
                            error = %format!("{hook_err:#}"),
                            "on_execute_error hook failed"
                        );
                    }
                }
                return Err(err);
            }
        };

        run_step(task, &task.hooks.after_execute, &next, Phase::AfterExecute, false).await?;

        debug!(task = %task.id(), "task executed");
        Ok(next)
    }

    /// Invoke the task's undo body without hooks.
    ///
    /// A task without undo fails with [`TaskchainError::UnsupportedUndo`].
    pub async fn undo(&self, task: &Task, ctx: WorkflowContext) -> Result<()> {
        let undo = task
            .undo
            .as_ref()
            .ok_or_else(|| TaskchainError::UnsupportedUndo(task.id().to_string()))?;

        debug!(task = %task.id(), "undoing task");
        undo(ctx)
            .await
            .map_err(|e| TaskchainError::rollback(task.name(), Phase::Undo, &e))
    }

    /// Invoke the undo body wrapped in the task's rollback hooks.
    pub async fn undo_with_hooks(&self, task: &Task, ctx: WorkflowContext) -> Result<()> {
        if task.undo.is_none() {
            return Err(TaskchainError::UnsupportedUndo(task.id().to_string()));
        }

        run_step(task, &task.hooks.before_rollback, &ctx, Phase::BeforeRollback, true).await?;

        let mut retries = 0;
        loop {
            let err = match self.undo(task, ctx.clone()).await {
                Ok(()) => break,
                Err(err) => err,
            };

            match self.on_rollback_error(task, &ctx, &err).await {
                RollbackErrorAction::Recovered => {
                    debug!(task = %task.id(), "rollback error recovered by hook");
                    break;
                }
                RollbackErrorAction::Retry if retries < self.max_rollback_retries => {
                    retries += 1;
                    debug!(task = %task.id(), attempt = retries, "retrying undo");
                }
                RollbackErrorAction::Retry => {
                    warn!(
                        task = %task.id(),
                        retries,
                        "undo retries exhausted"
                    );
                    return Err(err);
                }
                RollbackErrorAction::Propagate => return Err(err),
            }
        }

        run_step(task, &task.hooks.after_rollback, &ctx, Phase::AfterRollback, true).await
    }

    /// Run `compensation`'s forward body in place of `task`'s undo.
    ///
    /// The context the compensation produces is discarded.
    pub async fn compensate(
        &self,
        task: &Task,
        compensation: &Task,
        ctx: WorkflowContext,
    ) -> Result<()> {
        debug!(
            task = %task.id(),
            compensation = %compensation.id(),
            "running compensation"
        );
        (compensation.execute)(ctx)
            .await
            .map(|_| ())
            .map_err(|e| TaskchainError::rollback(task.name(), Phase::Compensate, &e))
    }

    async fn on_rollback_error(
        &self,
        task: &Task,
        ctx: &WorkflowContext,
        err: &TaskchainError,
    ) -> RollbackErrorAction {
        let Some(hook) = &task.hooks.on_rollback_error else {
            return RollbackErrorAction::Propagate;
        };
        match hook(ctx.clone(), err.clone()).await {
            Ok(action) => action,
            Err(hook_err) => {
                warn!(
                    task = %task.id(),
                    error = %format!("{hook_err:#}"),
                    "on_rollback_error hook failed"
                );
                RollbackErrorAction::Propagate
            }
        }
    }
}

/// Run an optional step, tagging failures with `phase`.
async fn run_step(
    task: &Task,
    step: &Option<StepFn>,
    ctx: &WorkflowContext,
    phase: Phase,
    rollback: bool,
) -> Result<()> {
    let Some(step) = step else {
        return Ok(());
    };
    step(ctx.clone()).await.map_err(|e| {
        if rollback {
            TaskchainError::rollback(task.name(), phase, &e)
        } else {
            TaskchainError::execution(task.name(), phase, &e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextMap;
    use std::sync::{Arc, Mutex};

    fn ctx() -> WorkflowContext {
        WorkflowContext::new("e", ContextMap::new())
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn push(log: &Log, entry: &str) {
        log.lock().unwrap().push(entry.to_string());
    }

    fn traced_task(log: &Log, fail_execute: bool) -> Task {
        let (l1, l2, l3, l4, l5) = (
            log.clone(),
            log.clone(),
            log.clone(),
            log.clone(),
            log.clone(),
        );
        Task::new("bump", move |ctx| {
            let log = l1.clone();
            async move {
                push(&log, "execute");
                if fail_execute {
                    anyhow::bail!("version file is read-only");
                }
                Ok(ctx.fork("version", "1.0.1"))
            }
        })
        .with_before_execute(move |_| {
            let log = l2.clone();
            async move {
                push(&log, "before");
                Ok(())
            }
        })
        .with_validate(move |_| {
            let log = l3.clone();
            async move {
                push(&log, "validate");
                Ok(())
            }
        })
        .with_after_execute(move |ctx| {
            let log = l4.clone();
            async move {
                assert!(ctx.has("version"));
                push(&log, "after");
                Ok(())
            }
        })
        .with_on_execute_error(move |_, err| {
            let log = l5.clone();
            async move {
                push(&log, &format!("on_error:{:?}", err.kind()));
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn forward_lifecycle_runs_in_order() {
        let log: Log = Arc::default();
        let task = traced_task(&log, false);

        let next = TaskExecutor::default().execute(&task, ctx()).await.unwrap();

        assert_eq!(next.get("version").unwrap(), "1.0.1");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["before", "validate", "execute", "after"]
        );
    }

    #[tokio::test]
    async fn execute_failure_routes_through_error_hook() {
        let log: Log = Arc::default();
        let task = traced_task(&log, true);

        let err = TaskExecutor::default()
            .execute(&task, ctx())
            .await
            .unwrap_err();

        match err {
            TaskchainError::Execution { task, phase, message } => {
                assert_eq!(task, "bump");
                assert_eq!(phase, Phase::Execute);
                assert!(message.contains("read-only"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 4);
        assert!(log[3].starts_with("on_error"));
    }

    #[tokio::test]
    async fn validate_failure_is_tagged_and_skips_execute() {
        let executed = Arc::new(Mutex::new(false));
        let flag = executed.clone();
        let task = Task::new("push", move |ctx| {
            let flag = flag.clone();
            async move {
                *flag.lock().unwrap() = true;
                Ok(ctx)
            }
        })
        .with_validate(|_| async { anyhow::bail!("no remote configured") });

        let err = TaskExecutor::default()
            .execute(&task, ctx())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TaskchainError::Execution { phase: Phase::Validate, .. }
        ));
        assert!(!*executed.lock().unwrap());
    }

    fn assert_execution_phase(err: TaskchainError, expected: Phase) {
        match err {
            TaskchainError::Execution { task, phase, .. } => {
                assert_eq!(task, "bump");
                assert_eq!(phase, expected);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    fn assert_rollback_phase(err: TaskchainError, expected: Phase) {
        match err {
            TaskchainError::Rollback { task, phase, .. } => {
                assert_eq!(task, "bump");
                assert_eq!(phase, expected);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn before_execute_failure_is_tagged_and_skips_execute() {
        let log: Log = Arc::default();
        let task = traced_task(&log, false)
            .with_before_execute(|_| async { anyhow::bail!("lock held") });

        let err = TaskExecutor::default()
            .execute(&task, ctx())
            .await
            .unwrap_err();

        assert_execution_phase(err, Phase::BeforeExecute);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn after_execute_failure_is_tagged() {
        let log: Log = Arc::default();
        let task = traced_task(&log, false)
            .with_after_execute(|_| async { anyhow::bail!("version not written") });

        let err = TaskExecutor::default()
            .execute(&task, ctx())
            .await
            .unwrap_err();

        assert_execution_phase(err, Phase::AfterExecute);
        assert_eq!(*log.lock().unwrap(), vec!["before", "validate", "execute"]);
    }

    #[tokio::test]
    async fn failing_error_hook_keeps_the_original_error() {
        let task = Task::new("bump", |_| async { anyhow::bail!("version file is read-only") })
            .with_on_execute_error(|_, _| async { anyhow::bail!("notifier offline") });

        let err = TaskExecutor::default()
            .execute(&task, ctx())
            .await
            .unwrap_err();

        match err {
            TaskchainError::Execution { task, phase, message } => {
                assert_eq!(task, "bump");
                assert_eq!(phase, Phase::Execute);
                assert!(message.contains("read-only"));
                assert!(!message.contains("notifier"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    fn undoable_bump(log: &Log) -> Task {
        let log = log.clone();
        Task::noop("bump").with_undo(move |_| {
            let log = log.clone();
            async move {
                push(&log, "undo");
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn before_rollback_failure_is_tagged_and_skips_undo() {
        let log: Log = Arc::default();
        let task = undoable_bump(&log)
            .with_before_rollback(|_| async { anyhow::bail!("repository locked") });

        let err = TaskExecutor::default()
            .undo_with_hooks(&task, ctx())
            .await
            .unwrap_err();

        assert_rollback_phase(err, Phase::BeforeRollback);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn after_rollback_failure_is_tagged() {
        let log: Log = Arc::default();
        let task = undoable_bump(&log)
            .with_after_rollback(|_| async { anyhow::bail!("cleanup failed") });

        let err = TaskExecutor::default()
            .undo_with_hooks(&task, ctx())
            .await
            .unwrap_err();

        assert_rollback_phase(err, Phase::AfterRollback);
        assert_eq!(*log.lock().unwrap(), vec!["undo"]);
    }

    #[tokio::test]
    async fn undo_without_body_is_unsupported() {
        let task = Task::noop("init");
        let exec = TaskExecutor::default();

        assert_eq!(
            exec.undo(&task, ctx()).await,
            Err(TaskchainError::UnsupportedUndo("init".into()))
        );
        assert_eq!(
            exec.undo_with_hooks(&task, ctx()).await,
            Err(TaskchainError::UnsupportedUndo("init".into()))
        );
    }

    #[tokio::test]
    async fn rollback_hook_retry_is_bounded() {
        let attempts = Arc::new(Mutex::new(0u32));
        let counter = attempts.clone();
        let task = Task::noop("tag")
            .with_undo(move |_| {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    anyhow::bail!("tag is protected")
                }
            })
            .with_on_rollback_error(|_, _| async { Ok(RollbackErrorAction::Retry) });

        let err = TaskExecutor::new(2)
            .undo_with_hooks(&task, ctx())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TaskchainError::Rollback { phase: Phase::Undo, .. }
        ));
        assert_eq!(*attempts.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn rollback_hook_can_recover() {
        let after = Arc::new(Mutex::new(false));
        let flag = after.clone();
        let task = Task::noop("push")
            .with_undo(|_| async { anyhow::bail!("remote rejected") })
            .with_on_rollback_error(|_, _| async { Ok(RollbackErrorAction::Recovered) })
            .with_after_rollback(move |_| {
                let flag = flag.clone();
                async move {
                    *flag.lock().unwrap() = true;
                    Ok(())
                }
            });

        TaskExecutor::default()
            .undo_with_hooks(&task, ctx())
            .await
            .unwrap();
        assert!(*after.lock().unwrap());
    }

    #[tokio::test]
    async fn compensation_failure_is_tagged() {
        let task = Task::noop("release");
        let compensation =
            Task::new("delete-release", |_| async { anyhow::bail!("404 from API") });

        let err = TaskExecutor::default()
            .compensate(&task, &compensation, ctx())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TaskchainError::Rollback { phase: Phase::Compensate, ref task, .. } if task == "release"
        ));
    }
}
