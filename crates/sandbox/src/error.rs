/// Failures of the orchestration machinery itself.
///
/// Anything the sandboxed program does (compile errors, crashes, non-zero
/// exits, running out of time) is reported through [`crate::JobOutput`],
/// never through this type.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("backend not available: {0}")]
    BackendNotAvailable(String),

    /// Workspace directory or file could not be created or written.
    #[error("workspace error: {0}")]
    Workspace(String),

    /// The container engine could not be started or failed on its own.
    #[error("launch error: {0}")]
    Launch(String),

    /// The workspace was unreadable after the run. Indicates an ordering
    /// bug in the orchestrator, not sandboxed-program misbehaviour.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
