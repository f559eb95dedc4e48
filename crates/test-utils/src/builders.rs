#![allow(dead_code)]

use std::collections::BTreeMap;

use taskchain::config::{
    GroupConfig, GroupTaskConfig, OptionsSection, PipelineFile, RawPipelineFile, TaskConfig,
};
use taskchain::types::RollbackStrategy;

/// Builder for `PipelineFile` to simplify test setup.
pub struct PipelineFileBuilder {
    raw: RawPipelineFile,
}

impl PipelineFileBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawPipelineFile {
                options: OptionsSection::default(),
                config: BTreeMap::new(),
                task: BTreeMap::new(),
                group: Vec::new(),
            },
        }
    }

    pub fn with_task(mut self, id: &str, task: TaskConfig) -> Self {
        self.raw.task.insert(id.to_string(), task);
        self
    }

    pub fn with_group(mut self, group: GroupConfig) -> Self {
        self.raw.group.push(group);
        self
    }

    pub fn with_strategy(mut self, strategy: RollbackStrategy) -> Self {
        self.raw.options.rollback_strategy = strategy;
        self
    }

    pub fn with_feature(mut self, feature: &str) -> Self {
        self.raw.options.enabled_features.push(feature.to_string());
        self
    }

    pub fn with_config(mut self, key: &str, value: serde_json::Value) -> Self {
        self.raw.config.insert(key.to_string(), value);
        self
    }

    pub fn raw(self) -> RawPipelineFile {
        self.raw
    }

    pub fn build(self) -> PipelineFile {
        PipelineFile::try_from(self.raw).expect("Failed to build valid pipeline from builder")
    }
}

impl Default for PipelineFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: cmd.to_string(),
                undo: None,
                after: vec![],
                features: vec![],
                description: None,
                compensate: None,
                skip_if_env: None,
                record_when_skipped: false,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn undo(mut self, cmd: &str) -> Self {
        self.task.undo = Some(cmd.to_string());
        self
    }

    pub fn feature(mut self, feature: &str) -> Self {
        self.task.features.push(feature.to_string());
        self
    }

    pub fn compensate(mut self, cmd: &str) -> Self {
        self.task.compensate = Some(cmd.to_string());
        self
    }

    pub fn skip_if_env(mut self, var: &str) -> Self {
        self.task.skip_if_env = Some(var.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Builder for `GroupConfig`.
pub struct GroupConfigBuilder {
    group: GroupConfig,
}

impl GroupConfigBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            group: GroupConfig {
                id: id.to_string(),
                depends_on_groups: vec![],
                skip_when: false,
                skip_if_env: None,
                skip_reason: None,
                task: vec![],
            },
        }
    }

    pub fn depends_on(mut self, group: &str) -> Self {
        self.group.depends_on_groups.push(group.to_string());
        self
    }

    pub fn skip_when(mut self, skip: bool) -> Self {
        self.group.skip_when = skip;
        self
    }

    pub fn task(mut self, id: &str, spec: TaskConfig) -> Self {
        self.group.task.push(GroupTaskConfig {
            id: id.to_string(),
            spec,
        });
        self
    }

    pub fn build(self) -> GroupConfig {
        self.group
    }
}
