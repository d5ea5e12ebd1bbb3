use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use sandbox::{
    Collected, CompilerSpec, JobOutput, JobStatus, LaunchRequest, Launcher, SandboxError,
    SandboxJob,
};
use sandbox_docker::{WorkspaceManager, collect};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Drives one job through prepare, launch, collect and cleanup.
///
/// Shared by every request; holds no per-job state.
pub struct Supervisor {
    workspaces: WorkspaceManager,
    launcher: Arc<dyn Launcher>,
    slots: Option<Semaphore>,
}

/// A job in its terminal state plus what the caller gets back.
#[derive(Debug)]
pub struct JobReport {
    pub job: SandboxJob,
    pub result: Result<JobOutput, SandboxError>,
}

impl Supervisor {
    /// `max_concurrent == 0` runs every job immediately.
    pub fn new(
        workspaces: WorkspaceManager,
        launcher: Arc<dyn Launcher>,
        max_concurrent: usize,
    ) -> Self {
        let slots = (max_concurrent > 0).then(|| Semaphore::new(max_concurrent));
        Self {
            workspaces,
            launcher,
            slots,
        }
    }

    pub fn launcher_name(&self) -> &str {
        self.launcher.name()
    }

    /// Run a job to a terminal state.
    ///
    /// Once a workspace was created it is removed exactly once, after the
    /// launcher returned and the outcome was collected, whatever the result.
    pub async fn run(&self, mut job: SandboxJob, compiler: &CompilerSpec) -> JobReport {
        let _permit = match &self.slots {
            Some(slots) => match slots.acquire().await {
                Ok(permit) => Some(permit),
                Err(e) => {
                    return fail(job, SandboxError::Launch(format!("job slots closed: {e}")));
                }
            },
            None => None,
        };

        let started = Instant::now();
        info!(job_id = %job.id, language = %job.language, "job started");

        job.status = JobStatus::Preparing;
        let workspace = match self.workspaces.prepare(&job, compiler).await {
            Ok(ws) => ws,
            Err(e) => return fail(job, e),
        };

        job.status = JobStatus::Running;
        let result = self
            .launch_and_collect(&job, compiler, workspace.path())
            .await;

        // Launcher has returned: the container is gone, nothing writes here any more.
        if let Err(e) = self.workspaces.cleanup(workspace).await {
            error!(job_id = %job.id, error = %e, "workspace cleanup failed");
        }

        let collected = match result {
            Ok(c) => c,
            Err(e) => return fail(job, e),
        };

        job.status = if collected.timed_out {
            JobStatus::TimedOut
        } else {
            JobStatus::Completed
        };
        job.stdout = Some(collected.output.clone());
        job.stderr = Some(collected.errors.clone());
        job.exec_time.clone_from(&collected.exec_time);

        info!(
            job_id = %job.id,
            status = %job.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "job finished"
        );
        JobReport {
            job,
            result: Ok(collected.into()),
        }
    }

    async fn launch_and_collect(
        &self,
        job: &SandboxJob,
        compiler: &CompilerSpec,
        workspace: &Path,
    ) -> Result<Collected, SandboxError> {
        let outcome = self
            .launcher
            .invoke(&LaunchRequest {
                job_id: &job.id,
                workspace,
                compiler,
                timeout: job.timeout,
            })
            .await?;
        debug!(
            job_id = %job.id,
            exit_code = ?outcome.exit_code,
            timed_out = outcome.timed_out,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "launcher returned"
        );

        let collected = collect(workspace).await?;
        if collected.timed_out && !outcome.timed_out {
            warn!(
                job_id = %job.id,
                exit_code = ?outcome.exit_code,
                "run exited without completion marker, reporting as timed out"
            );
        }
        Ok(collected)
    }
}

fn fail(mut job: SandboxJob, e: SandboxError) -> JobReport {
    match &e {
        SandboxError::Protocol(_) => {
            error!(job_id = %job.id, error = %e, "workspace unreadable after launch");
        }
        _ => error!(job_id = %job.id, error = %e, "job failed"),
    }
    job.status = JobStatus::Failed;
    JobReport {
        job,
        result: Err(e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use sandbox::TIMEOUT_NOTICE;
    use sandbox_docker::WorkspaceConfig;

    use super::*;
    use crate::testing::{FakeLauncher, Script, assert_no_workspaces, fixture, python};

    fn job(source: &str, stdin: &str) -> SandboxJob {
        SandboxJob::new(
            "python".into(),
            source.into(),
            stdin.into(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn completed_job() {
        let fx = fixture(Script::Echo).await;
        let supervisor = fx.supervisor(0);

        let report = supervisor.run(job("print(1+1)", "in"), &python()).await;

        let out = report.result.unwrap();
        assert_eq!(out.output, "print(1+1)|in");
        assert_eq!(out.time.as_deref(), Some("7"));
        assert_eq!(out.errors, "");
        assert!(!out.timed_out);
        assert_eq!(report.job.status, JobStatus::Completed);
        assert_eq!(report.job.stdout.as_deref(), Some("print(1+1)|in"));
        assert_eq!(report.job.exec_time.as_deref(), Some("7"));
        assert_eq!(fx.launcher.invocations.load(Ordering::SeqCst), 1);
        assert_no_workspaces(&fx.jobs_root()).await;
    }

    #[tokio::test]
    async fn timed_out_job_keeps_partial_output() {
        let fx = fixture(Script::Hang("tick\n")).await;
        let supervisor = fx.supervisor(0);
        let mut job = job("while True: pass", "");
        job.timeout = Duration::from_millis(50);

        let report = supervisor.run(job, &python()).await;

        let out = report.result.unwrap();
        assert_eq!(out.output, format!("tick\n{TIMEOUT_NOTICE}"));
        assert!(out.output.ends_with("Execution Timed Out"));
        assert_eq!(out.time, None);
        assert!(out.timed_out);
        assert_eq!(report.job.status, JobStatus::TimedOut);
        assert_no_workspaces(&fx.jobs_root()).await;
    }

    #[tokio::test]
    async fn missing_marker_after_exit_is_timed_out() {
        let fx = fixture(Script::NoMarker).await;
        let supervisor = fx.supervisor(0);

        let report = supervisor.run(job("x", ""), &python()).await;

        assert_eq!(report.job.status, JobStatus::TimedOut);
        assert_eq!(report.result.unwrap().output, TIMEOUT_NOTICE);
        assert_no_workspaces(&fx.jobs_root()).await;
    }

    #[tokio::test]
    async fn launch_failure_fails_job() {
        let fx = fixture(Script::EngineDown).await;
        let supervisor = fx.supervisor(0);

        let report = supervisor.run(job("x", ""), &python()).await;

        assert_eq!(report.job.status, JobStatus::Failed);
        assert!(matches!(report.result, Err(SandboxError::Launch(_))));
        assert_no_workspaces(&fx.jobs_root()).await;
    }

    #[tokio::test]
    async fn vanished_workspace_is_protocol_error() {
        let fx = fixture(Script::Vanish).await;
        let supervisor = fx.supervisor(0);

        let report = supervisor.run(job("x", ""), &python()).await;

        assert_eq!(report.job.status, JobStatus::Failed);
        assert!(matches!(report.result, Err(SandboxError::Protocol(_))));
        assert_no_workspaces(&fx.jobs_root()).await;
    }

    #[tokio::test]
    async fn prepare_failure_skips_launch() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(FakeLauncher::new(Script::Echo));
        let workspaces = WorkspaceManager::new(WorkspaceConfig {
            jobs_root: dir.path().join("jobs"),
            payload_dir: dir.path().join("missing"),
        });
        let supervisor = Supervisor::new(workspaces, launcher.clone(), 0);

        let report = supervisor.run(job("x", ""), &python()).await;

        assert_eq!(report.job.status, JobStatus::Failed);
        assert!(matches!(report.result, Err(SandboxError::Workspace(_))));
        assert_eq!(launcher.invocations.load(Ordering::SeqCst), 0);
        assert_no_workspaces(&dir.path().join("jobs")).await;
    }

    #[tokio::test]
    async fn concurrent_jobs_are_isolated() {
        let fx = fixture(Script::Echo).await;
        let supervisor = fx.supervisor(0);

        let py = python();
        let (a, b) = tokio::join!(
            supervisor.run(job("A", "1"), &py),
            supervisor.run(job("B", "2"), &py),
        );

        assert_ne!(a.job.id, b.job.id);
        assert_eq!(a.result.unwrap().output, "A|1");
        assert_eq!(b.result.unwrap().output, "B|2");
        assert!(fx.launcher.peak.load(Ordering::SeqCst) >= 1);
        assert_no_workspaces(&fx.jobs_root()).await;
    }

    #[tokio::test]
    async fn job_slots_bound_concurrency() {
        let fx = fixture(Script::Echo).await;
        let supervisor = fx.supervisor(1);

        let py = python();
        let (a, b, c) = tokio::join!(
            supervisor.run(job("A", ""), &py),
            supervisor.run(job("B", ""), &py),
            supervisor.run(job("C", ""), &py),
        );

        for report in [a, b, c] {
            assert_eq!(report.job.status, JobStatus::Completed);
        }
        assert_eq!(fx.launcher.invocations.load(Ordering::SeqCst), 3);
        assert_eq!(fx.launcher.peak.load(Ordering::SeqCst), 1);
        assert_no_workspaces(&fx.jobs_root()).await;
    }
}
