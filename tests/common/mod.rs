#![allow(dead_code)]

pub use taskchain_test_utils::builders;
pub use taskchain_test_utils::recorder;
pub use taskchain_test_utils::{CallLog, init_tracing, with_timeout};

use taskchain::engine::{Orchestrator, OrchestratorOptions};

/// Options with a fixed execution id so outputs are comparable.
pub fn options() -> OrchestratorOptions {
    OrchestratorOptions::default().with_execution_id("test-run")
}

pub fn orchestrator() -> Orchestrator {
    Orchestrator::new(options())
}
