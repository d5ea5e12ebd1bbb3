use clap::Args;
use sandbox_docker::check_prerequisites;
use tracing::info;

use super::ConfigArgs;
use crate::config;
use crate::error::RunnerResult;
use crate::registry::LanguageRegistry;

#[derive(Args)]
pub struct CheckArgs {
    #[command(flatten)]
    config: ConfigArgs,
}

/// Validate the config and registry, then probe the engine, daemon and image.
pub async fn run_check(args: CheckArgs) -> RunnerResult<()> {
    let mut config = config::load_or_default(args.config.path()).await?;
    LanguageRegistry::with_overrides(std::mem::take(&mut config.languages))?;
    check_prerequisites(&config.docker_config(), &config.workspace_config()).await?;
    info!(image = %config.container.image, "all prerequisites met");
    Ok(())
}
