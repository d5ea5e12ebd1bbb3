//! Scripted launcher and fixtures shared by the supervisor and server tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sandbox::{
    CompilerSpec, LaunchOutcome, LaunchRequest, Launcher, OUTPUT_DELIMITER, Result, SandboxError,
};
use sandbox_docker::{WorkspaceConfig, WorkspaceManager};

use crate::supervisor::Supervisor;

/// What the fake container does with the workspace.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Writes `completed` as `<source>|<stdin>` with time 7.
    Echo,
    /// Writes partial output to the log, then waits out the timeout.
    Hang(&'static str),
    /// Exits 0 without writing a completion marker.
    NoMarker,
    /// Fails the way an unreachable engine does.
    EngineDown,
    /// Deletes the workspace before returning.
    Vanish,
}

pub struct FakeLauncher {
    script: Script,
    pub invocations: AtomicUsize,
    active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl FakeLauncher {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            invocations: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    async fn perform(&self, request: &LaunchRequest<'_>) -> Result<LaunchOutcome> {
        let started = Instant::now();
        let ws = request.workspace;
        let outcome = |timed_out: bool| LaunchOutcome {
            exit_code: (!timed_out).then_some(0),
            timed_out,
            elapsed: started.elapsed(),
        };

        match self.script {
            Script::Echo => {
                let source = read(&ws.join(&request.compiler.source_file)).await;
                let stdin = read(&ws.join("inputFile")).await;
                // Long enough for concurrent jobs to overlap.
                tokio::time::sleep(Duration::from_millis(20)).await;
                write(&ws.join("errors"), "").await;
                write(
                    &ws.join("completed"),
                    &format!("{source}|{stdin}{OUTPUT_DELIMITER}7"),
                )
                .await;
                Ok(outcome(false))
            }
            Script::Hang(partial) => {
                write(&ws.join("logfile.txt"), partial).await;
                tokio::time::sleep(request.timeout).await;
                Ok(outcome(true))
            }
            Script::NoMarker => Ok(outcome(false)),
            Script::EngineDown => Err(SandboxError::Launch(
                "Cannot connect to the Docker daemon".into(),
            )),
            Script::Vanish => {
                tokio::fs::remove_dir_all(ws).await.unwrap();
                Ok(outcome(false))
            }
        }
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    fn name(&self) -> &str {
        "fake"
    }

    async fn invoke(&self, request: &LaunchRequest<'_>) -> Result<LaunchOutcome> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let result = self.perform(request).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

async fn read(path: &Path) -> String {
    tokio::fs::read_to_string(path).await.unwrap()
}

async fn write(path: &Path, content: &str) {
    tokio::fs::write(path, content).await.unwrap();
}

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub launcher: Arc<FakeLauncher>,
}

impl Fixture {
    pub fn jobs_root(&self) -> PathBuf {
        self.dir.path().join("jobs")
    }

    pub fn workspace_config(&self) -> WorkspaceConfig {
        WorkspaceConfig {
            jobs_root: self.jobs_root(),
            payload_dir: self.dir.path().join("payload"),
        }
    }

    pub fn supervisor(&self, max_concurrent: usize) -> Supervisor {
        Supervisor::new(
            WorkspaceManager::new(self.workspace_config()),
            self.launcher.clone(),
            max_concurrent,
        )
    }
}

/// Temp dir with a payload template and a fake launcher running `script`.
pub async fn fixture(script: Script) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let payload = dir.path().join("payload");
    tokio::fs::create_dir(&payload).await.unwrap();
    write(&payload.join("script.sh"), "#!/bin/sh\n").await;
    Fixture {
        dir,
        launcher: Arc::new(FakeLauncher::new(script)),
    }
}

pub fn python() -> CompilerSpec {
    CompilerSpec {
        toolchain: "python3".into(),
        source_file: "main.py".into(),
        run_command: String::new(),
        display_name: "Python".into(),
        extra_args: String::new(),
    }
}

/// The jobs root is absent or empty.
pub async fn assert_no_workspaces(jobs_root: &Path) {
    let Ok(mut entries) = tokio::fs::read_dir(jobs_root).await else {
        return;
    };
    let leftover = entries.next_entry().await.unwrap();
    assert!(
        leftover.is_none(),
        "workspace left behind: {:?}",
        leftover.map(|e| e.path())
    );
}
