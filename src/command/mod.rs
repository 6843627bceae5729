//! Execution of storage CLI command lines.
//!
//! [`CommandExecutor`] is the single seam between the harness and the external CLI.
//! Command lines are built from a [`CommandDescriptor`] with [`build_command_line`],
//! after [`adapt_flags`] has fitted the flags to the [`ExecutionContext`].

use std::process::Stdio;

use async_trait::async_trait;
use dyn_clone::DynClone;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::config::ExecutionContext;
use crate::types::{CommandDescriptor, ExecutionResult};

pub mod scratch_key;

const IMPERSONATION_FLAG_PREFIX: &str = "--impersonate-service-account";
const DEFAULT_REGION_FLAG: &str = "--region=US";
const OUTPUT_PREVIEW_LENGTH: usize = 100;

/// Type alias for a boxed executor trait object.
pub type Executor = Box<dyn CommandExecutor + Send + Sync>;

/// Runs one command line to completion and captures its output.
///
/// Implementations never fail: spawn errors, non-zero exits and I/O errors are reported
/// through [`ExecutionResult::failed`]. No retry and no timeout at this layer.
#[async_trait]
pub trait CommandExecutor: DynClone {
    async fn execute(&self, command_line: &str) -> ExecutionResult;
}

dyn_clone::clone_trait_object!(CommandExecutor);

/// Executes command lines through the platform shell (`sh -c` / `cmd /C`).
#[derive(Debug, Clone, Default)]
pub struct ShellCommandExecutor;

impl ShellCommandExecutor {
    pub fn new() -> Self {
        Self
    }

    fn shell_command(command_line: &str) -> Command {
        let mut command = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C");
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c");
            c
        };
        command
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl CommandExecutor for ShellCommandExecutor {
    async fn execute(&self, command_line: &str) -> ExecutionResult {
        debug!(command = command_line, "executing CLI command.");

        let output = match Self::shell_command(command_line).output().await {
            Ok(output) => output,
            Err(e) => {
                debug!(command = command_line, error = %e, "failed to spawn CLI command.");
                return ExecutionResult::failed(format!(
                    "Command failed to start: {command_line}: {e}"
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            debug!(
                command = command_line,
                output_preview = %preview(&stdout),
                "CLI command succeeded."
            );
            return ExecutionResult {
                success: true,
                stdout,
                stderr,
                error: None,
            };
        }

        debug!(
            command = command_line,
            status = %output.status,
            "CLI command failed."
        );
        trace!(stderr = %stderr, "CLI command stderr.");
        let error = format!("Command failed: {command_line}\n{stderr}");
        ExecutionResult {
            success: false,
            stdout,
            stderr,
            error: Some(error),
        }
    }
}

fn preview(output: &str) -> String {
    let flattened = output.replace('\n', " ");
    match flattened.char_indices().nth(OUTPUT_PREVIEW_LENGTH) {
        Some((idx, _)) => format!("{}...", &flattened[..idx]),
        None => flattened,
    }
}

/// Fit command flags to the execution context.
///
/// With ambient authentication, impersonation flags are dropped. With a region override,
/// the default `--region=US` flag is rewritten to the configured region. Order is kept.
pub fn adapt_flags(flags: &[String], context: &ExecutionContext) -> Vec<String> {
    flags
        .iter()
        .filter(|flag| !(context.ambient_auth && flag.starts_with(IMPERSONATION_FLAG_PREFIX)))
        .map(|flag| match &context.region_override {
            Some(region) if flag == DEFAULT_REGION_FLAG => format!("--region={region}"),
            _ => flag.clone(),
        })
        .collect()
}

/// Join prefix, verb, paths and adapted flags with single spaces, skipping absent parts.
pub fn build_command_line(descriptor: &CommandDescriptor, context: &ExecutionContext) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !descriptor.prefix.is_empty() {
        parts.push(descriptor.prefix.clone());
    }
    parts.push(descriptor.verb.token().to_string());
    if let Some(source) = &descriptor.source {
        parts.push(source.to_string());
    }
    if let Some(destination) = &descriptor.destination {
        parts.push(destination.to_string());
    }
    parts.extend(adapt_flags(&descriptor.flags, context));

    let command_line = parts.join(" ");
    trace!(verb = %descriptor.verb, command = command_line, "command built.");
    command_line
}

/// Build the command line for `descriptor` and run it.
pub async fn execute_descriptor(
    executor: &(dyn CommandExecutor + Send + Sync),
    descriptor: &CommandDescriptor,
    context: &ExecutionContext,
) -> ExecutionResult {
    let command_line = build_command_line(descriptor, context);
    let result = executor.execute(&command_line).await;
    debug!(
        verb = %descriptor.verb,
        success = result.success,
        "storage command completed."
    );
    result
}
