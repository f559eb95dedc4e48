// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{PipelineFile, RawPipelineFile};
use crate::errors::{Result, TaskchainError};

pub const DEFAULT_PIPELINE_FILE: &str = "Taskchain.toml";

/// Read and deserialize a pipeline file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPipelineFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        TaskchainError::ConfigError(format!("reading {}: {e}", path.display()))
    })?;
    parse_str(&contents)
        .map_err(|e| TaskchainError::ConfigError(format!("parsing {}: {e}", path.display())))
}

/// Deserialize pipeline TOML held in memory.
pub fn parse_str(contents: &str) -> std::result::Result<RawPipelineFile, toml::de::Error> {
    toml::from_str(contents)
}

/// Load a pipeline file and validate it.
///
/// Validation here covers the file's own shape (ids, commands, options).
/// Dependency and cycle checks happen when the orchestrator resolves the
/// tasks the file describes.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PipelineFile> {
    let raw = load_from_path(&path)?;
    PipelineFile::try_from(raw)
}
