// src/config/mod.rs

//! Pipeline file loading and validation.
//!
//! - `model.rs` holds the TOML-backed data model.
//! - `loader.rs` reads and parses a file from disk.
//! - `validate.rs` checks ids, commands and options, producing a
//!   [`PipelineFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{DEFAULT_PIPELINE_FILE, load_and_validate, load_from_path};
pub use model::{
    GroupConfig, GroupTaskConfig, OptionsSection, PipelineFile, RawPipelineFile, TaskConfig,
};
pub use validate::validate_raw_pipeline;
