use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::Args;
use sandbox::{JobStatus, SandboxJob};
use tracing::info;

use super::{ConfigArgs, build_supervisor};
use crate::config;
use crate::error::{RunnerError, RunnerResult};
use crate::registry::LanguageRegistry;

/// Exit status when the program ran past its time budget, as with timeout(1).
const TIMED_OUT_EXIT: u8 = 124;

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Language id (see `compilebox languages`)
    #[arg(long, short)]
    language: String,

    /// Source file to run
    file: std::path::PathBuf,

    /// File whose contents are fed to the program's stdin
    #[arg(long)]
    stdin: Option<std::path::PathBuf>,

    /// Time budget in seconds (defaults to jobs.timeout_secs)
    #[arg(long, short)]
    timeout: Option<u64>,
}

pub async fn run_job(args: RunArgs) -> RunnerResult<ExitCode> {
    let mut config = config::load_or_default(args.config.path()).await?;
    let registry = LanguageRegistry::with_overrides(std::mem::take(&mut config.languages))?;
    let compiler = registry.get(&args.language)?;

    let timeout = args
        .timeout
        .map_or_else(|| config.job_timeout(), Duration::from_secs);
    if timeout.is_zero() {
        return Err(RunnerError::Config("timeout must be > 0".into()));
    }

    let source = read_input(&args.file).await?;
    let stdin = match &args.stdin {
        Some(path) => read_input(path).await?,
        None => String::new(),
    };

    let supervisor = build_supervisor(&config);
    let job = SandboxJob::new(args.language, source, stdin, timeout);
    let report = supervisor.run(job, compiler).await;
    let output = report.result?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.output.as_bytes())?;
    stdout.flush()?;
    if !output.errors.is_empty() {
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(output.errors.as_bytes())?;
        stderr.flush()?;
    }

    info!(
        job_id = %report.job.id,
        status = %report.job.status,
        time_ms = output.time.as_deref().unwrap_or("-"),
        "run finished"
    );

    Ok(match report.job.status {
        JobStatus::TimedOut => ExitCode::from(TIMED_OUT_EXIT),
        _ => ExitCode::SUCCESS,
    })
}

async fn read_input(path: &Path) -> RunnerResult<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        RunnerError::Io(std::io::Error::new(
            e.kind(),
            format!("read {}: {e}", path.display()),
        ))
    })
}
