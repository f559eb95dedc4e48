#![allow(dead_code)]

//! Tasks that record what the engine did to them.

use std::sync::{Arc, Mutex};

use taskchain::task::Task;
use taskchain::types::RollbackErrorAction;

/// Shared, ordered log of lifecycle calls such as `"execute:bump"` or
/// `"undo:bump"`.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Task ids recorded with the given action prefix, in call order.
    pub fn with_action(&self, action: &str) -> Vec<String> {
        let prefix = format!("{action}:");
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    pub fn executed(&self) -> Vec<String> {
        self.with_action("execute")
    }

    pub fn undone(&self) -> Vec<String> {
        self.with_action("undo")
    }

    pub fn compensated(&self) -> Vec<String> {
        self.with_action("compensate")
    }
}

fn recorded_execute(id: &str, log: &CallLog, fail: Option<&str>) -> Task {
    let log = log.clone();
    let label = id.to_string();
    let fail = fail.map(str::to_string);
    Task::new(id, move |ctx| {
        let log = log.clone();
        let label = label.clone();
        let fail = fail.clone();
        async move {
            log.record(format!("execute:{label}"));
            if let Some(msg) = fail {
                anyhow::bail!(msg);
            }
            Ok(ctx.fork(label, true))
        }
    })
}

fn with_recorded_undo(task: Task, log: &CallLog, fail: Option<&str>) -> Task {
    let log = log.clone();
    let label = task.id().to_string();
    let fail = fail.map(str::to_string);
    task.with_undo(move |_ctx| {
        let log = log.clone();
        let label = label.clone();
        let fail = fail.clone();
        async move {
            log.record(format!("undo:{label}"));
            if let Some(msg) = fail {
                anyhow::bail!(msg);
            }
            Ok(())
        }
    })
}

/// Succeeds, forks `<id> = true`, and has a succeeding undo.
pub fn recording_task(id: &str, log: &CallLog) -> Task {
    with_recorded_undo(recorded_execute(id, log, None), log, None)
}

/// Succeeds but has no undo.
pub fn recording_task_without_undo(id: &str, log: &CallLog) -> Task {
    recorded_execute(id, log, None)
}

/// Fails in `execute` with `message`; its undo would succeed.
pub fn failing_task(id: &str, log: &CallLog, message: &str) -> Task {
    with_recorded_undo(recorded_execute(id, log, Some(message)), log, None)
}

/// Succeeds, but its undo fails with `message`.
pub fn task_with_failing_undo(id: &str, log: &CallLog, message: &str) -> Task {
    with_recorded_undo(recorded_execute(id, log, None), log, Some(message))
}

/// Compensation task recording `compensate:<for_task>`.
pub fn recording_compensation(for_task: &str, log: &CallLog) -> Task {
    let log = log.clone();
    let label = for_task.to_string();
    Task::new(format!("compensate-{for_task}"), move |ctx| {
        let log = log.clone();
        let label = label.clone();
        async move {
            log.record(format!("compensate:{label}"));
            Ok(ctx)
        }
    })
}

/// `on_rollback_error` hook that always answers `action`, recording
/// `rollback_error:<id>` each time it is consulted.
pub fn with_rollback_error_action(task: Task, log: &CallLog, action: RollbackErrorAction) -> Task {
    let log = log.clone();
    let label = task.id().to_string();
    task.with_on_rollback_error(move |_ctx, _err| {
        let log = log.clone();
        let label = label.clone();
        async move {
            log.record(format!("rollback_error:{label}"));
            Ok(action)
        }
    })
}
