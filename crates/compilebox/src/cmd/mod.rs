mod check;
mod languages;
mod run;
mod serve;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use sandbox::Launcher;
use sandbox_docker::{DockerLauncher, WorkspaceManager};

pub use check::{CheckArgs, run_check};
pub use languages::{LanguagesArgs, run_languages};
pub use run::{RunArgs, run_job};
pub use serve::{ServeArgs, run_serve};

use crate::config::AppConfig;
use crate::supervisor::Supervisor;

#[derive(Args)]
pub struct ConfigArgs {
    /// Path to compilebox.yaml (defaults apply when omitted)
    #[arg(long, short, env = "COMPILEBOX_CONFIG")]
    config: Option<PathBuf>,
}

impl ConfigArgs {
    fn path(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

fn build_supervisor(config: &AppConfig) -> Supervisor {
    let launcher: Arc<dyn Launcher> = Arc::new(DockerLauncher::new(config.docker_config()));
    Supervisor::new(
        WorkspaceManager::new(config.workspace_config()),
        launcher,
        config.jobs.max_concurrent,
    )
}
