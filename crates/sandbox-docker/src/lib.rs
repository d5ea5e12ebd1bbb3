mod command;
mod config;
mod launcher;
mod paths;
mod prerequisites;
mod protocol;
mod workspace;

pub use config::{DockerConfig, WorkspaceConfig};
pub use launcher::DockerLauncher;
pub use paths::{CONTAINER_MOUNT, ENTRY_SCRIPT, JobsRoot, WorkspacePaths};
pub use prerequisites::check_prerequisites;
pub use protocol::{collect, split_output};
pub use workspace::{Workspace, WorkspaceManager, remove_workspace};
