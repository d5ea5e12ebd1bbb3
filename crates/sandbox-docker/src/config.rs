use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use sandbox::ResourceLimits;

pub const DEFAULT_ENGINE: &str = "docker";
pub const DEFAULT_IMAGE: &str = "virtual_machine";
pub const DEFAULT_NAME_PREFIX: &str = "compilebox-";
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Engine client binary (name on `PATH` or absolute path).
    pub engine: PathBuf,
    /// Image providing the toolchains.
    pub image: String,
    /// Prepended to the job id to form the container name.
    pub name_prefix: String,
    /// `--user` for the container process, engine default when unset.
    pub user: Option<String>,
    pub env: BTreeMap<String, String>,
    /// Run with `--network none`.
    pub network_disabled: bool,
    pub limits: ResourceLimits,
    /// Upper bound on force-removal and reaping after the timeout guard fires.
    pub kill_grace: Duration,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            engine: PathBuf::from(DEFAULT_ENGINE),
            image: DEFAULT_IMAGE.to_string(),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            user: None,
            env: BTreeMap::new(),
            network_disabled: true,
            limits: ResourceLimits::default(),
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Parent of all job workspaces. Must be absolute (it is bind-mounted).
    pub jobs_root: PathBuf,
    /// Template whose regular files are copied into every workspace.
    pub payload_dir: PathBuf,
}
