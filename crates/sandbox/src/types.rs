use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SandboxError};

/// Separates program output from the timing value in the `completed` file.
pub const OUTPUT_DELIMITER: &str = "*-COMPILEBOX::ENDOFOUTPUT-*";

/// Appended to partial output when the run never wrote its completion marker.
pub const TIMEOUT_NOTICE: &str = "\nExecution Timed Out";

// ---------------------------------------------------------------------------
// Registry entry
// ---------------------------------------------------------------------------

/// Invocation parameters for one language, passed verbatim to the
/// in-container script as its four positional arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerSpec {
    pub toolchain: String,
    pub source_file: String,
    #[serde(default)]
    pub run_command: String,
    pub display_name: String,
    #[serde(default)]
    pub extra_args: String,
}

impl CompilerSpec {
    /// `run_command` and `extra_args` may be blank; everything else may not.
    /// `source_file` must be a bare file name so it cannot escape the workspace.
    pub fn validate(&self) -> Result<()> {
        if self.toolchain.trim().is_empty() {
            return Err(SandboxError::InvalidConfig("toolchain is empty".into()));
        }
        if self.display_name.trim().is_empty() {
            return Err(SandboxError::InvalidConfig("display_name is empty".into()));
        }
        let name = self.source_file.as_str();
        let bare = Path::new(name).file_name().is_some_and(|f| f == name);
        if name.is_empty() || !bare || name.contains('\\') {
            return Err(SandboxError::InvalidConfig(format!(
                "source_file must be a plain file name: {name:?}"
            )));
        }
        Ok(())
    }

    /// Script arguments in contract order: toolchain, source file, run
    /// command, extra arguments. Blank values stay as empty arguments.
    pub fn script_args(&self) -> [&str; 4] {
        [
            self.toolchain.as_str(),
            self.source_file.as_str(),
            self.run_command.as_str(),
            self.extra_args.as_str(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Random job identifier, also used as workspace and container name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    /// 122 bits from the OS CSPRNG, rendered as 32 lowercase hex characters.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Preparing,
    Running,
    Completed,
    TimedOut,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Preparing => "preparing",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One request-scoped unit of work.
#[derive(Debug)]
pub struct SandboxJob {
    pub id: JobId,
    pub language: String,
    pub source: String,
    pub stdin: String,
    pub timeout: Duration,
    pub status: JobStatus,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exec_time: Option<String>,
}

impl SandboxJob {
    pub fn new(language: String, source: String, stdin: String, timeout: Duration) -> Self {
        Self {
            id: JobId::generate(),
            language,
            source,
            stdin,
            timeout,
            status: JobStatus::Preparing,
            stdout: None,
            stderr: None,
            exec_time: None,
        }
    }
}

/// What the caller gets back for a job that ran (to completion or timeout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutput {
    pub output: String,
    pub errors: String,
    pub time: Option<String>,
    pub timed_out: bool,
}

// ---------------------------------------------------------------------------
// Launch / collect
// ---------------------------------------------------------------------------

pub struct LaunchRequest<'a> {
    pub job_id: &'a JobId,
    pub workspace: &'a Path,
    pub compiler: &'a CompilerSpec,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    /// Exit status of the engine client, `None` if it was killed.
    pub exit_code: Option<i32>,
    /// The timeout guard fired and the run was forcibly terminated.
    pub timed_out: bool,
    pub elapsed: Duration,
}

/// Parsed contents of a finished workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collected {
    pub output: String,
    pub exec_time: Option<String>,
    pub errors: String,
    /// The completion marker was missing and `output` is partial.
    pub timed_out: bool,
}

impl From<Collected> for JobOutput {
    fn from(c: Collected) -> Self {
        Self {
            output: c.output,
            errors: c.errors,
            time: c.exec_time,
            timed_out: c.timed_out,
        }
    }
}
