use std::ffi::OsStr;
use std::path::Path;

use tokio::process::Command;
use tracing::trace;

/// Error from a failed engine command.
#[derive(Debug, thiserror::Error)]
#[error("command failed: {command}\n{detail}")]
pub struct CommandError {
    pub command: String,
    pub detail: String,
}

/// Format a human-readable display string for an engine invocation.
pub(crate) fn format_command_display<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(program.to_string_lossy().into_owned());
    parts.extend(args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()));
    parts.join(" ")
}

/// Run `program` with an argument list (no shell) and return trimmed stdout.
pub(crate) async fn exec(program: &Path, args: &[&str]) -> Result<String, CommandError> {
    let cmd_display = format_command_display(program, args);
    trace!(command = %cmd_display, "exec");

    let output = Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| CommandError {
            command: cmd_display.clone(),
            detail: e.to_string(),
        })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(CommandError {
            command: cmd_display,
            detail: stderr,
        })
    }
}

/// Run a command, ignoring any errors.
pub(crate) async fn exec_ignore_errors(program: &Path, args: &[&str]) {
    if let Err(e) = exec(program, args).await {
        trace!(command = %e.command, detail = %e.detail, "command failed (ignored)");
    }
}
