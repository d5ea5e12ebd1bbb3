mod config;
mod error;
mod launcher;
mod types;

pub use config::ResourceLimits;
pub use error::{Result, SandboxError};
pub use launcher::Launcher;
pub use types::{
    Collected, CompilerSpec, JobId, JobOutput, JobStatus, LaunchOutcome, LaunchRequest,
    OUTPUT_DELIMITER, SandboxJob, TIMEOUT_NOTICE,
};
