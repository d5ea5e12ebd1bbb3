use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sandbox::{CompilerSpec, ResourceLimits};
use sandbox_docker::{DockerConfig, WorkspaceConfig};
use serde::{Deserialize, Serialize};

use crate::error::{RunnerError, RunnerResult};

pub(crate) const DEFAULT_HOST: &str = "0.0.0.0";
pub(crate) const DEFAULT_PORT: u16 = 8080;
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 20;
pub(crate) const DEFAULT_FREE_REQUESTS: u32 = 50;
pub(crate) const DEFAULT_WINDOW_SECS: u64 = 3600;

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub jobs: JobsConfig,
    pub container: ContainerConfig,
    pub rate_limit: RateLimitConfig,
    /// Merged over the built-in registry; same id replaces the built-in.
    pub languages: BTreeMap<String, CompilerSpec>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub root: PathBuf,
    pub payload_dir: PathBuf,
    pub timeout_secs: u64,
    /// Jobs allowed to run at once; 0 means unbounded.
    pub max_concurrent: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("temp"),
            payload_dir: PathBuf::from("payload"),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_concurrent: 0,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub engine: PathBuf,
    pub image: String,
    pub name_prefix: String,
    pub user: Option<String>,
    pub env: BTreeMap<String, String>,
    pub network_disabled: bool,
    pub memory_mb: Option<u32>,
    pub cpus: Option<f64>,
    pub pids_limit: Option<u32>,
    pub kill_grace_secs: u64,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        let docker = DockerConfig::default();
        Self {
            engine: docker.engine,
            image: docker.image,
            name_prefix: docker.name_prefix,
            user: None,
            env: BTreeMap::new(),
            network_disabled: docker.network_disabled,
            memory_mb: None,
            cpus: None,
            pids_limit: None,
            kill_grace_secs: docker.kill_grace.as_secs(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub free_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            free_requests: DEFAULT_FREE_REQUESTS,
            window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

/// Load and validate a config from a YAML file.
///
/// Relative paths in the config are resolved against the config file's parent directory.
pub async fn load(path: &Path) -> RunnerResult<AppConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RunnerError::Config(format!("read {}: {e}", path.display())))?;
    let mut config: AppConfig = serde_yaml_ng::from_str(&content)
        .map_err(|e| RunnerError::Config(format!("parse {}: {e}", path.display())))?;
    let config_dir = path.parent().unwrap_or(Path::new(""));
    config.resolve_relative_paths(config_dir)?;
    validate(&config).await?;
    Ok(config)
}

/// Load from `path`, or fall back to defaults resolved against the working
/// directory when no file is given.
pub async fn load_or_default(path: Option<&Path>) -> RunnerResult<AppConfig> {
    match path {
        Some(path) => load(path).await,
        None => {
            let mut config = AppConfig::default();
            config.resolve_relative_paths(Path::new(""))?;
            validate(&config).await?;
            Ok(config)
        }
    }
}

async fn check_path_exists(path: &Path, label: &str) -> RunnerResult<()> {
    let exists = tokio::fs::try_exists(path)
        .await
        .map_err(|e| RunnerError::Config(format!("check {label}: {e}")))?;
    if !exists {
        return Err(RunnerError::Config(format!(
            "{label} not found: {}",
            path.display()
        )));
    }
    Ok(())
}

async fn validate(config: &AppConfig) -> RunnerResult<()> {
    if config.jobs.timeout_secs == 0 {
        return Err(RunnerError::Config("jobs.timeout_secs must be > 0".into()));
    }
    if config.rate_limit.enabled && config.rate_limit.window_secs == 0 {
        return Err(RunnerError::Config(
            "rate_limit.window_secs must be > 0".into(),
        ));
    }
    if config.container.kill_grace_secs == 0 {
        return Err(RunnerError::Config(
            "container.kill_grace_secs must be > 0".into(),
        ));
    }
    if let Some(cpus) = config.container.cpus
        && !(cpus.is_finite() && cpus > 0.0)
    {
        return Err(RunnerError::Config(format!(
            "container.cpus must be positive, got {cpus}"
        )));
    }
    check_path_exists(&config.jobs.payload_dir, "payload_dir").await?;
    // jobs.root is created on first use
    Ok(())
}

impl AppConfig {
    /// Resolve relative paths against `config_dir`, then make them absolute.
    /// The jobs root is bind-mounted into containers, which needs an absolute path.
    fn resolve_relative_paths(&mut self, config_dir: &Path) -> RunnerResult<()> {
        let resolve = |p: &mut PathBuf| -> RunnerResult<()> {
            if p.is_relative() {
                let joined = config_dir.join(&*p);
                *p = std::path::absolute(&joined).map_err(|e| {
                    RunnerError::Config(format!("resolve {}: {e}", joined.display()))
                })?;
            }
            Ok(())
        };
        resolve(&mut self.jobs.root)?;
        resolve(&mut self.jobs.payload_dir)?;
        Ok(())
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.jobs.timeout_secs)
    }

    /// Build a `sandbox_docker::DockerConfig` from the container section.
    pub fn docker_config(&self) -> DockerConfig {
        let c = &self.container;
        DockerConfig {
            engine: c.engine.clone(),
            image: c.image.clone(),
            name_prefix: c.name_prefix.clone(),
            user: c.user.clone(),
            env: c.env.clone(),
            network_disabled: c.network_disabled,
            limits: ResourceLimits {
                memory_mb: c.memory_mb,
                cpus: c.cpus,
                pids_limit: c.pids_limit,
            },
            kill_grace: Duration::from_secs(c.kill_grace_secs),
        }
    }

    pub fn workspace_config(&self) -> WorkspaceConfig {
        WorkspaceConfig {
            jobs_root: self.jobs.root.clone(),
            payload_dir: self.jobs.payload_dir.clone(),
        }
    }
}
