use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// How executed tasks are undone when a later task fails.
///
/// - `Reverse`: call each task's own `undo`, most recent first (default).
/// - `Compensation`: prefer a registered compensation task over `undo`.
/// - `Custom`: like `Reverse`, but wraps each undo in the task's rollback
///   hooks.
/// - `None`: never undo anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackStrategy {
    Reverse,
    Compensation,
    Custom,
    None,
}

impl Default for RollbackStrategy {
    fn default() -> Self {
        RollbackStrategy::Reverse
    }
}

impl FromStr for RollbackStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reverse" => Ok(RollbackStrategy::Reverse),
            "compensation" | "saga" => Ok(RollbackStrategy::Compensation),
            "custom" => Ok(RollbackStrategy::Custom),
            "none" => Ok(RollbackStrategy::None),
            other => Err(format!(
                "invalid rollback strategy: {other} (expected \"reverse\", \"compensation\", \"custom\" or \"none\")"
            )),
        }
    }
}

impl fmt::Display for RollbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RollbackStrategy::Reverse => "reverse",
            RollbackStrategy::Compensation => "compensation",
            RollbackStrategy::Custom => "custom",
            RollbackStrategy::None => "none",
        };
        f.write_str(s)
    }
}

/// What a task's `on_rollback_error` hook wants done with a failed undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackErrorAction {
    /// Record the failure.
    Propagate,
    /// The hook fixed things up; count the task as rolled back.
    Recovered,
    /// Run the undo again (bounded by `max_rollback_retries`).
    Retry,
}

impl Default for RollbackErrorAction {
    fn default() -> Self {
        RollbackErrorAction::Propagate
    }
}
