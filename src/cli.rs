// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::RollbackStrategy;

/// Command-line arguments for `taskchain`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskchain",
    version,
    about = "Run a dependency-ordered pipeline of shell tasks with rollback on failure.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    #[arg(long, value_name = "PATH", default_value = crate::config::DEFAULT_PIPELINE_FILE)]
    pub config: String,

    /// Log commands instead of running them.
    #[arg(long)]
    pub dry_run: bool,

    /// Enable a feature (repeatable). Added to `[options].enabled_features`.
    #[arg(long = "feature", value_name = "NAME")]
    pub features: Vec<String>,

    /// Rollback strategy: reverse, compensation (saga), custom or none.
    #[arg(long, value_name = "STRATEGY")]
    pub strategy: Option<RollbackStrategy>,

    /// Keep rolling back remaining tasks after a rollback step fails.
    #[arg(long)]
    pub continue_on_error: bool,

    /// Do not roll back on failure.
    #[arg(long)]
    pub no_rollback: bool,

    /// Print the resolved execution order and exit.
    #[arg(long)]
    pub plan: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKCHAIN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let args = CliArgs::try_parse_from([
            "taskchain",
            "--config",
            "release.toml",
            "--feature",
            "npm",
            "--feature",
            "github",
            "--strategy",
            "saga",
            "--no-rollback",
        ])
        .unwrap();

        assert_eq!(args.config, "release.toml");
        assert_eq!(args.features, vec!["npm", "github"]);
        assert_eq!(args.strategy, Some(RollbackStrategy::Compensation));
        assert!(args.no_rollback);
        assert!(!args.plan);
    }

    #[test]
    fn defaults() {
        let args = CliArgs::try_parse_from(["taskchain"]).unwrap();
        assert_eq!(args.config, "Taskchain.toml");
        assert!(args.strategy.is_none());
        assert!(args.features.is_empty());
    }

    #[test]
    fn rejects_unknown_strategy() {
        assert!(CliArgs::try_parse_from(["taskchain", "--strategy", "yolo"]).is_err());
    }
}
