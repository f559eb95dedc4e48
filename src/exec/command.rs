// src/exec/command.rs

//! Shell-command task bodies.
//!
//! Commands run through the platform shell with the workflow context exposed
//! as environment variables:
//!
//! - `TASKCHAIN_EXECUTION_ID` and `TASKCHAIN_DRY_RUN`;
//! - `TASKCHAIN_<KEY>` for each scalar data value;
//! - `TASKCHAIN_CONFIG_<KEY>` for each scalar config value.
//!
//! Keys are upper-cased and every non-alphanumeric character becomes `_`.
//! Arrays, objects and nulls are not exported.

use std::process::Stdio;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use crate::context::WorkflowContext;

pub const ENV_PREFIX: &str = "TASKCHAIN_";

/// Context key under which a task's trimmed stdout is stored.
pub fn stdout_key(task_id: &str) -> String {
    format!("{task_id}.stdout")
}

/// Environment variable name for a context key.
pub fn env_key(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{ENV_PREFIX}{sanitized}")
}

fn env_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Environment variables a command sees for `ctx`.
pub fn context_env(ctx: &WorkflowContext) -> Vec<(String, String)> {
    let mut vars = vec![
        (env_key("execution_id"), ctx.execution_id().to_string()),
        (env_key("dry_run"), ctx.is_dry_run().to_string()),
    ];
    vars.extend(
        ctx.config()
            .iter()
            .filter_map(|(k, v)| env_value(v).map(|v| (env_key(&format!("config_{k}")), v))),
    );
    vars.extend(ctx.keys().filter_map(|k| {
        ctx.get(k)
            .ok()
            .and_then(env_value)
            .map(|v| (env_key(k), v))
    }));
    vars
}

fn shell(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

/// Run `cmd` for `task_id` and return its trimmed stdout.
///
/// In dry-run mode the command is only logged and an empty string is
/// returned. A non-zero exit fails with the exit code and the last stderr
/// line.
pub async fn run_command(task_id: &str, cmd: &str, ctx: &WorkflowContext) -> Result<String> {
    if ctx.is_dry_run() {
        info!(task = %task_id, cmd = %cmd, "dry-run: not running command");
        return Ok(String::new());
    }

    info!(task = %task_id, cmd = %cmd, "running command");

    let mut command = shell(cmd);
    command
        .envs(context_env(ctx))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = command
        .output()
        .await
        .with_context(|| format!("spawning `{cmd}` for task '{task_id}'"))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines() {
        debug!(task = %task_id, "stderr: {}", line);
    }

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let last = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("no stderr output");
        bail!("`{cmd}` exited with status {code}: {last}");
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    debug!(task = %task_id, bytes = stdout.len(), "command finished");
    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextMap;
    use serde_json::json;

    #[test]
    fn env_keys_are_sanitized() {
        assert_eq!(env_key("version"), "TASKCHAIN_VERSION");
        assert_eq!(env_key("bump.stdout"), "TASKCHAIN_BUMP_STDOUT");
        assert_eq!(env_key("git:tag-name"), "TASKCHAIN_GIT_TAG_NAME");
    }

    #[test]
    fn only_scalars_are_exported() {
        let mut config = ContextMap::new();
        config.insert("remote".into(), json!("origin"));
        let ctx = WorkflowContext::new("run-1", config).fork_multiple([
            ("version", json!("1.2.3")),
            ("attempt", json!(2)),
            ("tags", json!(["a"])),
        ]);

        let vars = context_env(&ctx);
        let lookup = |k: &str| {
            vars.iter()
                .find(|(name, _)| name == k)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(lookup("TASKCHAIN_EXECUTION_ID"), Some("run-1"));
        assert_eq!(lookup("TASKCHAIN_DRY_RUN"), Some("false"));
        assert_eq!(lookup("TASKCHAIN_CONFIG_REMOTE"), Some("origin"));
        assert_eq!(lookup("TASKCHAIN_VERSION"), Some("1.2.3"));
        assert_eq!(lookup("TASKCHAIN_ATTEMPT"), Some("2"));
        assert_eq!(lookup("TASKCHAIN_TAGS"), None);
    }

    #[tokio::test]
    async fn dry_run_does_not_spawn() {
        let ctx = WorkflowContext::new("e", ContextMap::new()).with_dry_run(true);
        let out = run_command("a", "exit 7", &ctx).await.unwrap();
        assert!(out.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_reads_context() {
        let ctx = WorkflowContext::new("e", ContextMap::new()).fork("version", "1.0.0");
        let out = run_command("echo", "echo \"v$TASKCHAIN_VERSION\"", &ctx)
            .await
            .unwrap();
        assert_eq!(out, "v1.0.0");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_reports_code_and_stderr() {
        let ctx = WorkflowContext::new("e", ContextMap::new());
        let err = run_command("push", "echo 'remote rejected' >&2; exit 3", &ctx)
            .await
            .unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("status 3"));
        assert!(msg.contains("remote rejected"));
    }
}
