use async_trait::async_trait;

use crate::error::Result;
use crate::types::{LaunchOutcome, LaunchRequest};

/// Runs the in-container script against a prepared workspace.
///
/// `invoke` must not return before the run has either exited or been
/// forcibly terminated: once it returns, nothing may write into the
/// workspace any more, so the caller is free to read and delete it.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Human-readable name for this launcher (e.g. "docker").
    fn name(&self) -> &str;
    /// Run the job to completion or until `request.timeout` elapses.
    async fn invoke(&self, request: &LaunchRequest<'_>) -> Result<LaunchOutcome>;
}
