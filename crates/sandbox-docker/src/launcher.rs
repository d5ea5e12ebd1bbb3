use std::ffi::OsString;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use sandbox::{JobId, LaunchOutcome, LaunchRequest, Launcher, Result, SandboxError};
use tokio::io::AsyncBufReadExt;
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::command::{exec_ignore_errors, format_command_display};
use crate::config::DockerConfig;
use crate::paths::{CONTAINER_MOUNT, ENTRY_SCRIPT};

/// Exit statuses docker reserves for its own failures: 125 for the engine
/// (daemon unreachable, image missing, invalid flags), 126 when the entry
/// script cannot be invoked, 127 when it is not found.
const ENGINE_FAILURE_EXITS: [i32; 3] = [125, 126, 127];

/// Engine stderr lines kept for the launch error message.
const STDERR_TAIL_LINES: usize = 20;

/// Runs each job in a fresh `docker run --rm` container with the workspace
/// bind-mounted at [`CONTAINER_MOUNT`].
pub struct DockerLauncher {
    config: DockerConfig,
}

impl DockerLauncher {
    pub fn new(config: DockerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DockerConfig {
        &self.config
    }

    fn container_name(&self, job_id: &JobId) -> String {
        format!("{}{job_id}", self.config.name_prefix)
    }

    /// Argument list for `docker run`. Every value is its own argument, so
    /// nothing from the registry or the request is ever shell-parsed.
    fn run_args(&self, request: &LaunchRequest<'_>, name: &str) -> Result<Vec<OsString>> {
        let workspace = request.workspace;
        if !workspace.is_absolute() || workspace.to_string_lossy().contains(':') {
            return Err(SandboxError::Launch(format!(
                "workspace path cannot be bind-mounted: {}",
                workspace.display()
            )));
        }

        let mut volume = OsString::from(workspace.as_os_str());
        volume.push(":");
        volume.push(CONTAINER_MOUNT);

        let mut args: Vec<OsString> = vec![
            "run".into(),
            "--rm".into(),
            "--name".into(),
            name.into(),
            "--volume".into(),
            volume,
        ];

        if let Some(user) = &self.config.user {
            args.push("--user".into());
            args.push(user.into());
        }
        for (key, value) in &self.config.env {
            args.push("--env".into());
            args.push(format!("{key}={value}").into());
        }
        if self.config.network_disabled {
            args.push("--network".into());
            args.push("none".into());
        }

        let limits = &self.config.limits;
        if let Some(memory_mb) = limits.memory_mb {
            args.push("--memory".into());
            args.push(format!("{memory_mb}m").into());
        }
        if let Some(cpus) = limits.cpus {
            args.push("--cpus".into());
            args.push(cpus.to_string().into());
        }
        if let Some(pids) = limits.pids_limit {
            args.push("--pids-limit".into());
            args.push(pids.to_string().into());
        }

        args.push(self.config.image.as_str().into());
        args.push(ENTRY_SCRIPT.into());
        args.extend(request.compiler.script_args().into_iter().map(OsString::from));
        Ok(args)
    }

    /// Force-remove the container, then kill the client's process group and
    /// reap it. Removal is always awaited: the workspace is deleted right
    /// after this returns. Slower than `kill_grace` only logs.
    async fn terminate(&self, name: &str, child: &mut Child) {
        let rm_args = ["rm", "--force", name];
        let remove = exec_ignore_errors(&self.config.engine, &rm_args);
        tokio::pin!(remove);
        if tokio::time::timeout(self.config.kill_grace, &mut remove)
            .await
            .is_err()
        {
            warn!(container = %name, "container removal slow, still waiting");
            remove.await;
        }

        kill_client_group(child);
        match tokio::time::timeout(self.config.kill_grace, child.wait()).await {
            Ok(Ok(status)) => debug!(container = %name, %status, "engine client reaped"),
            Ok(Err(e)) => warn!(container = %name, error = %e, "engine client wait failed"),
            Err(_) => warn!(container = %name, "engine client did not exit after SIGKILL"),
        }
    }
}

/// SIGKILL the engine client and everything in its process group. The client
/// is spawned with `process_group(0)`, so the group id is its pid. Nothing to
/// do once it has been reaped.
fn kill_client_group(child: &Child) {
    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        debug!(pid, error = %e, "killpg failed");
    }
}

#[async_trait]
impl Launcher for DockerLauncher {
    fn name(&self) -> &str {
        "docker"
    }

    async fn invoke(&self, request: &LaunchRequest<'_>) -> Result<LaunchOutcome> {
        let name = self.container_name(request.job_id);
        let args = self.run_args(request, &name)?;
        debug!(
            job_id = %request.job_id,
            command = %format_command_display(&self.config.engine, args.as_slice()),
            "launching container"
        );

        let started = Instant::now();
        let mut child = tokio::process::Command::new(&self.config.engine)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SandboxError::Launch(format!(
                    "spawn {}: {e}",
                    self.config.engine.display()
                ))
            })?;

        // The script reports through files; whatever reaches the client's
        // streams is only diagnostic.
        if let Some(stdout) = child.stdout.take() {
            let job_id = request.job_id.clone();
            tokio::spawn(async move {
                let mut lines = tokio::io::BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "container", job_id = %job_id, "{line}");
                }
            });
        }
        let stderr_tail = child.stderr.take().map(|stderr| {
            let job_id = request.job_id.clone();
            tokio::spawn(async move {
                let mut tail = std::collections::VecDeque::with_capacity(STDERR_TAIL_LINES);
                let mut lines = tokio::io::BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "container", job_id = %job_id, "stderr: {line}");
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                Vec::from(tail).join("\n")
            })
        });

        let waited = tokio::time::timeout(request.timeout, child.wait()).await;
        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                self.terminate(&name, &mut child).await;
                return Err(SandboxError::Launch(format!("wait for engine: {e}")));
            }
            Err(_) => {
                warn!(
                    job_id = %request.job_id,
                    timeout_secs = request.timeout.as_secs(),
                    "timeout guard fired, terminating container"
                );
                self.terminate(&name, &mut child).await;
                return Ok(LaunchOutcome {
                    exit_code: None,
                    timed_out: true,
                    elapsed: started.elapsed(),
                });
            }
        };

        let elapsed = started.elapsed();
        let exit_code = status.code();
        if let Some(code) = exit_code
            && ENGINE_FAILURE_EXITS.contains(&code)
        {
            let detail = match stderr_tail {
                Some(task) => task.await.unwrap_or_default(),
                None => String::new(),
            };
            return Err(SandboxError::Launch(format!(
                "engine failed with status {code}: {detail}"
            )));
        }

        info!(
            job_id = %request.job_id,
            exit_code = ?exit_code,
            elapsed_ms = elapsed.as_millis() as u64,
            "container exited"
        );
        Ok(LaunchOutcome {
            exit_code,
            timed_out: false,
            elapsed,
        })
    }
}
