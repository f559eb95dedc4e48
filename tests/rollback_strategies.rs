// tests/rollback_strategies.rs
mod common;
use crate::common::init_tracing;
use crate::common::recorder::{
    failing_task, recording_compensation, recording_task, recording_task_without_undo,
    task_with_failing_undo, with_rollback_error_action,
};

use std::error::Error;

use taskchain::engine::{Orchestrator, RollbackManager, TaskExecutor};
use taskchain::errors::{Phase, TaskchainError};
use taskchain::task::Task;
use taskchain::types::{RollbackErrorAction, RollbackStrategy};
use taskchain::WorkflowContext;

use common::CallLog;

type TestResult = Result<(), Box<dyn Error>>;

/// a -> b -> c, then `boom` fails.
fn chain(orch: &mut Orchestrator, log: &CallLog, b: Task) {
    orch.add_task(recording_task("a", log))
        .add_task(b.depends_on("a"))
        .add_task(recording_task("c", log).depends_on("b"))
        .add_task(failing_task("boom", log, "exploded").depends_on("c"));
}

#[tokio::test]
async fn reverse_undoes_in_reverse_execution_order() -> TestResult {
    crate::common::with_timeout(async {
        init_tracing();

        let log = CallLog::new();
        let mut orch = common::orchestrator();
        chain(&mut orch, &log, recording_task("b", &log));

        let out = orch.run().await?;

        assert_eq!(out.executed_task_ids, vec!["a", "b", "c"]);
        assert_eq!(out.rolled_back_tasks, vec!["c", "b", "a"]);
        assert_eq!(log.undone(), vec!["c", "b", "a"]);
        assert_eq!(out.failed_tasks, vec!["boom"]);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn task_without_undo_is_not_a_rollback_error() -> TestResult {
    crate::common::with_timeout(async {
        init_tracing();

        let log = CallLog::new();
        let mut orch = common::orchestrator();
        chain(&mut orch, &log, recording_task_without_undo("b", &log));

        let out = orch.run().await?;

        assert_eq!(out.rolled_back_tasks, vec!["c", "b", "a"]);
        assert_eq!(log.undone(), vec!["c", "a"]);
        assert_eq!(out.errors.len(), 1);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn failing_undo_halts_rollback_by_default() -> TestResult {
    crate::common::with_timeout(async {
        init_tracing();

        let log = CallLog::new();
        let mut orch = common::orchestrator();
        chain(&mut orch, &log, task_with_failing_undo("b", &log, "locked"));

        let out = orch.run().await?;

        assert!(!out.success);
        assert_eq!(out.rolled_back_tasks, vec!["c"]);
        assert_eq!(out.failed_tasks, vec!["boom", "b"]);
        assert_eq!(log.undone(), vec!["c", "b"]);
        assert!(matches!(
            &out.errors[1],
            TaskchainError::Rollback { task, phase: Phase::Undo, .. } if task == "b"
        ));

        Ok(())
    })
    .await
}

#[tokio::test]
async fn continue_on_error_keeps_undoing() -> TestResult {
    crate::common::with_timeout(async {
        init_tracing();

        let log = CallLog::new();
        let mut orch = Orchestrator::new(common::options().continue_on_error(true));
        chain(&mut orch, &log, task_with_failing_undo("b", &log, "locked"));

        let out = orch.run().await?;

        assert_eq!(out.rolled_back_tasks, vec!["c", "a"]);
        assert_eq!(out.failed_tasks, vec!["boom", "b"]);
        assert_eq!(out.errors.len(), 2);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn compensation_strategy_prefers_registered_compensations() -> TestResult {
    crate::common::with_timeout(async {
        init_tracing();

        let log = CallLog::new();
        let mut orch =
            Orchestrator::new(common::options().with_strategy(RollbackStrategy::Compensation));
        chain(&mut orch, &log, recording_task("b", &log));
        orch.register_compensation("b", recording_compensation("b", &log));

        let out = orch.run().await?;

        assert_eq!(out.rolled_back_tasks, vec!["c", "b", "a"]);
        assert_eq!(log.undone(), vec!["c", "a"]);
        assert_eq!(log.compensated(), vec!["b"]);
        assert_eq!(
            log.calls()[4..],
            ["undo:c", "compensate:b", "undo:a"].map(String::from)
        );

        Ok(())
    })
    .await
}

#[tokio::test]
async fn custom_strategy_consults_rollback_error_hook() -> TestResult {
    crate::common::with_timeout(async {
        init_tracing();

        let log = CallLog::new();
        let recovered = with_rollback_error_action(
            task_with_failing_undo("b", &log, "locked"),
            &log,
            RollbackErrorAction::Recovered,
        );
        let mut orch = Orchestrator::new(common::options().with_strategy(RollbackStrategy::Custom));
        chain(&mut orch, &log, recovered);

        let out = orch.run().await?;

        assert_eq!(out.rolled_back_tasks, vec!["c", "b", "a"]);
        assert_eq!(out.failed_tasks, vec!["boom"]);
        assert_eq!(log.with_action("rollback_error"), vec!["b"]);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn custom_strategy_retries_are_bounded_by_options() -> TestResult {
    crate::common::with_timeout(async {
        init_tracing();

        let log = CallLog::new();
        let retrying = with_rollback_error_action(
            task_with_failing_undo("b", &log, "locked"),
            &log,
            RollbackErrorAction::Retry,
        );
        let mut orch = Orchestrator::new(
            common::options()
                .with_strategy(RollbackStrategy::Custom)
                .with_max_rollback_retries(2),
        );
        chain(&mut orch, &log, retrying);

        let out = orch.run().await?;

        assert_eq!(log.undone(), vec!["c", "b", "b", "b"]);
        assert_eq!(out.failed_tasks, vec!["boom", "b"]);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn none_strategy_skips_rollback() -> TestResult {
    crate::common::with_timeout(async {
        init_tracing();

        let log = CallLog::new();
        let mut orch = Orchestrator::new(common::options().with_strategy(RollbackStrategy::None));
        chain(&mut orch, &log, recording_task("b", &log));

        let out = orch.run().await?;

        assert!(!out.success);
        assert!(out.rolled_back_tasks.is_empty());
        assert!(log.undone().is_empty());

        Ok(())
    })
    .await
}

#[tokio::test]
async fn manager_can_be_driven_directly() -> TestResult {
    crate::common::with_timeout(async {
        init_tracing();

        let log = CallLog::new();
        let ctx = WorkflowContext::new("direct", Default::default());
        let mut manager =
            RollbackManager::new(RollbackStrategy::Reverse, false, TaskExecutor::default());
        for id in ["a", "b", "c"] {
            manager.record(recording_task(id, &log).into(), ctx.clone());
        }

        let result = manager.rollback().await;

        assert!(result.success);
        assert_eq!(result.rolled_back_tasks, vec!["c", "b", "a"]);
        assert_eq!(manager.len(), 3);

        Ok(())
    })
    .await
}
