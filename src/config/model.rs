// src/config/model.rs

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::context::ContextMap;
use crate::engine::OrchestratorOptions;
use crate::types::RollbackStrategy;

/// Pipeline file exactly as deserialized from TOML, before validation.
///
/// ```toml
/// [options]
/// rollback_strategy = "reverse"
/// enabled_features = ["publish"]
///
/// [config]
/// remote = "origin"
///
/// [task.bump]
/// cmd = "./scripts/bump.sh"
/// undo = "git checkout -- package.json"
///
/// [[group]]
/// id = "git"
///
/// [[group.task]]
/// id = "commit"
/// cmd = "git commit -am release"
/// after = ["bump"]
/// ```
///
/// Every section is optional; an empty file fails validation instead.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPipelineFile {
    #[serde(default)]
    pub options: OptionsSection,

    /// Read-only values exposed through `WorkflowContext::config_value`.
    #[serde(default)]
    pub config: ContextMap,

    /// Top-level tasks from `[task.<id>]`, keyed by id.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,

    /// Groups from `[[group]]`, in declaration order.
    #[serde(default)]
    pub group: Vec<GroupConfig>,
}

/// Validated pipeline file.
///
/// Only obtainable through `TryFrom<RawPipelineFile>` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct PipelineFile {
    pub options: OptionsSection,
    pub config: ContextMap,
    pub task: BTreeMap<String, TaskConfig>,
    pub group: Vec<GroupConfig>,
}

impl PipelineFile {
    pub(crate) fn new_unchecked(raw: RawPipelineFile) -> Self {
        Self {
            options: raw.options,
            config: raw.config,
            task: raw.task,
            group: raw.group,
        }
    }

    /// Total number of tasks, grouped ones included.
    pub fn task_count(&self) -> usize {
        self.task.len() + self.group.iter().map(|g| g.task.len()).sum::<usize>()
    }
}

/// `[options]` section; mirrors [`OrchestratorOptions`].
#[derive(Debug, Clone, Deserialize)]
pub struct OptionsSection {
    #[serde(default)]
    pub rollback_strategy: RollbackStrategy,

    #[serde(default = "default_true")]
    pub enable_rollback: bool,

    #[serde(default)]
    pub continue_on_error: bool,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub enabled_features: Vec<String>,

    #[serde(default = "default_max_rollback_retries")]
    pub max_rollback_retries: u32,
}

fn default_true() -> bool {
    true
}

fn default_max_rollback_retries() -> u32 {
    crate::engine::executor::DEFAULT_MAX_ROLLBACK_RETRIES
}

impl Default for OptionsSection {
    fn default() -> Self {
        Self {
            rollback_strategy: RollbackStrategy::default(),
            enable_rollback: true,
            continue_on_error: false,
            dry_run: false,
            enabled_features: Vec::new(),
            max_rollback_retries: default_max_rollback_retries(),
        }
    }
}

impl From<&OptionsSection> for OrchestratorOptions {
    fn from(section: &OptionsSection) -> Self {
        OrchestratorOptions {
            execution_id: None,
            dry_run: section.dry_run,
            enable_rollback: section.enable_rollback,
            rollback_strategy: section.rollback_strategy,
            continue_on_error: section.continue_on_error,
            enabled_features: section.enabled_features.iter().cloned().collect::<BTreeSet<_>>(),
            max_rollback_retries: section.max_rollback_retries,
        }
    }
}

/// `[task.<id>]` section, and the body of a `[[group.task]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Shell command run as the task's forward body.
    pub cmd: String,

    /// Shell command run as the task's undo.
    #[serde(default)]
    pub undo: Option<String>,

    /// Dependencies. Inside a group, bare ids refer to the same group and
    /// `group:task` ids to other groups.
    #[serde(default)]
    pub after: Vec<String>,

    /// Features that must all be enabled for the task to run.
    #[serde(default)]
    pub features: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Shell command registered as the task's compensation.
    #[serde(default)]
    pub compensate: Option<String>,

    /// Skip the task when this environment variable is set and non-empty.
    #[serde(default)]
    pub skip_if_env: Option<String>,

    /// Keep the task on the rollback stack when it is skipped.
    #[serde(default)]
    pub record_when_skipped: bool,
}

/// `[[group]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    pub id: String,

    #[serde(default)]
    pub depends_on_groups: Vec<String>,

    /// Skip the whole group unconditionally.
    #[serde(default)]
    pub skip_when: bool,

    /// Skip the whole group when this environment variable is set and non-empty.
    #[serde(default)]
    pub skip_if_env: Option<String>,

    #[serde(default)]
    pub skip_reason: Option<String>,

    /// Tasks from `[[group.task]]`, in declaration order.
    #[serde(default)]
    pub task: Vec<GroupTaskConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupTaskConfig {
    pub id: String,

    #[serde(flatten)]
    pub spec: TaskConfig,
}
