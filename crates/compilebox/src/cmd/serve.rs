use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use sandbox_docker::check_prerequisites;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::{ConfigArgs, build_supervisor};
use crate::config;
use crate::error::{RunnerError, RunnerResult};
use crate::rate_limit::RateLimiter;
use crate::registry::LanguageRegistry;
use crate::server::{self, AppState};

#[derive(Args)]
pub struct ServeArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Override server.host
    #[arg(long)]
    host: Option<String>,

    /// Override server.port
    #[arg(long, short)]
    port: Option<u16>,
}

pub async fn run_serve(args: ServeArgs) -> RunnerResult<()> {
    let mut config = config::load_or_default(args.config.path()).await?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let registry = LanguageRegistry::with_overrides(std::mem::take(&mut config.languages))?;

    tokio::fs::create_dir_all(&config.jobs.root)
        .await
        .map_err(|e| {
            RunnerError::Config(format!("create {}: {e}", config.jobs.root.display()))
        })?;

    // Requests fail with 500 until the engine is usable; serving anyway keeps
    // /livez and /languages up while docker starts.
    if let Err(e) = check_prerequisites(&config.docker_config(), &config.workspace_config()).await
    {
        warn!(error = %e, "container prerequisites not met");
    }

    let rate_limiter = config.rate_limit.enabled.then(|| {
        Arc::new(RateLimiter::new(
            config.rate_limit.free_requests,
            Duration::from_secs(config.rate_limit.window_secs),
        ))
    });

    let supervisor = build_supervisor(&config);
    info!(
        launcher = supervisor.launcher_name(),
        image = %config.container.image,
        jobs_root = %config.jobs.root.display(),
        timeout_secs = config.jobs.timeout_secs,
        max_concurrent = config.jobs.max_concurrent,
        rate_limited = rate_limiter.is_some(),
        "supervisor ready"
    );

    let state = AppState {
        supervisor: Arc::new(supervisor),
        registry: Arc::new(registry),
        rate_limiter,
        job_timeout: config.job_timeout(),
    };
    let app = server::build_app(state);

    let host = config.server.host.as_str();
    let listener = TcpListener::bind((host, config.server.port))
        .await
        .map_err(|e| RunnerError::Server(format!("bind {host}:{}: {e}", config.server.port)))?;
    let addr = listener.local_addr()?;

    info!(addr = %addr, "listening");
    server::serve(listener, app).await
}
