use std::path::Path;

use sandbox::SandboxError;
use tracing::info;

use crate::command::exec;
use crate::config::{DockerConfig, WorkspaceConfig};

/// Verify that the engine, its daemon, the image and the payload template are
/// usable before serving jobs.
///
/// Collects all failures and returns them in a single `BackendNotAvailable` error.
pub async fn check_prerequisites(
    docker: &DockerConfig,
    workspace: &WorkspaceConfig,
) -> Result<(), SandboxError> {
    let mut errors = Vec::new();

    check_payload(&workspace.payload_dir, &mut errors);
    if check_engine_binary(&docker.engine, &mut errors) {
        check_daemon_and_image(docker, &mut errors).await;
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SandboxError::BackendNotAvailable(errors.join("; ")))
    }
}

fn check_payload(payload_dir: &Path, errors: &mut Vec<String>) {
    let script = payload_dir.join("script.sh");
    if !payload_dir.is_dir() {
        errors.push(format!("payload dir not found: {}", payload_dir.display()));
    } else if !script.is_file() {
        errors.push(format!("entry script not found: {}", script.display()));
    }
}

fn check_engine_binary(engine: &Path, errors: &mut Vec<String>) -> bool {
    match which::which(engine) {
        Ok(path) => {
            info!(engine = %path.display(), "container engine found");
            true
        }
        Err(_) => {
            errors.push(format!("container engine not found: {}", engine.display()));
            false
        }
    }
}

async fn check_daemon_and_image(config: &DockerConfig, errors: &mut Vec<String>) {
    match exec(&config.engine, &["version", "--format", "{{.Server.Version}}"]).await {
        Ok(version) => info!(version = %version, "container engine reachable"),
        Err(e) => {
            errors.push(format!("container engine not reachable: {}", e.detail));
            return;
        }
    }

    if exec(&config.engine, &["image", "inspect", config.image.as_str()])
        .await
        .is_err()
    {
        errors.push(format!("image not found: {}", config.image));
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn missing_payload_reported() {
        let mut errors = Vec::new();
        check_payload(Path::new("/nonexistent/payload"), &mut errors);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("payload dir not found"));
    }

    #[test]
    fn payload_without_script_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut errors = Vec::new();
        check_payload(dir.path(), &mut errors);
        assert!(errors[0].contains("entry script not found"));
    }

    #[tokio::test]
    async fn all_failures_collected() {
        let docker = DockerConfig {
            engine: PathBuf::from("/nonexistent/docker"),
            ..DockerConfig::default()
        };
        let workspace = WorkspaceConfig {
            jobs_root: PathBuf::from("/tmp/jobs"),
            payload_dir: PathBuf::from("/nonexistent/payload"),
        };

        let err = check_prerequisites(&docker, &workspace).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("payload dir not found"), "{msg}");
        assert!(msg.contains("container engine not found"), "{msg}");
    }
}
