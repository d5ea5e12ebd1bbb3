//! Reader for the files the in-container script leaves in a workspace.

use std::io::ErrorKind;
use std::path::Path;

use sandbox::{Collected, OUTPUT_DELIMITER, Result, SandboxError, TIMEOUT_NOTICE};
use tracing::{debug, warn};

use crate::paths::WorkspacePaths;

/// Read the outcome of a finished run.
///
/// Must only be called after the launcher returned, i.e. once nothing can
/// write into the workspace any more. A missing completion marker means the
/// run was cut short: whatever partial output exists is returned with
/// [`TIMEOUT_NOTICE`] appended and no timing. Fails only if the workspace
/// itself (or a sentinel file that does exist) cannot be read.
pub async fn collect(workspace: &Path) -> Result<Collected> {
    let paths = WorkspacePaths::new(workspace.to_path_buf());

    let meta = tokio::fs::metadata(workspace)
        .await
        .map_err(|e| protocol_err("stat workspace", workspace, e))?;
    if !meta.is_dir() {
        return Err(SandboxError::Protocol(format!(
            "workspace is not a directory: {}",
            workspace.display()
        )));
    }
    let errors = read_optional(&paths.errors()).await?.unwrap_or_default();

    let collected = match read_optional(&paths.completed()).await? {
        Some(content) => {
            let (output, exec_time) = split_output(&content);
            Collected {
                output,
                exec_time,
                errors,
                timed_out: false,
            }
        }
        None => {
            let mut output = match read_optional(&paths.partial_log()).await {
                Ok(partial) => partial.unwrap_or_default(),
                Err(e) => {
                    warn!(error = %e, "partial log unreadable, reporting empty output");
                    String::new()
                }
            };
            output.push_str(TIMEOUT_NOTICE);
            Collected {
                output,
                exec_time: None,
                errors,
                timed_out: true,
            }
        }
    };

    debug!(
        path = %workspace.display(),
        output_bytes = collected.output.len(),
        error_bytes = collected.errors.len(),
        timed_out = collected.timed_out,
        "workspace collected"
    );
    Ok(collected)
}

/// Split completion-marker content on the first delimiter.
///
/// Everything before is program output; everything after, trimmed, is the
/// timing value (`None` when blank or when the delimiter is missing).
pub fn split_output(content: &str) -> (String, Option<String>) {
    match content.split_once(OUTPUT_DELIMITER) {
        Some((output, time)) => {
            let time = time.trim();
            let time = (!time.is_empty()).then(|| time.to_string());
            (output.to_string(), time)
        }
        None => (content.to_string(), None),
    }
}

/// Read a file as lossy UTF-8. `Ok(None)` when it does not exist.
async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(protocol_err("read", path, e)),
    }
}

fn protocol_err(action: &str, path: &Path, e: std::io::Error) -> SandboxError {
    SandboxError::Protocol(format!("{action} {}: {e}", path.display()))
}
