use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use sandbox::{CompilerSpec, Result, SandboxError, SandboxJob};
use tracing::{debug, info, warn};

use crate::config::WorkspaceConfig;
use crate::paths::{JobsRoot, WorkspacePaths};

/// Mode for the workspace directory and source file, so the container user
/// (which need not match the host user) can read, execute and write.
const OPEN_MODE: u32 = 0o777;

/// Creates and removes per-job workspaces under a fixed jobs root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: JobsRoot,
    payload_dir: PathBuf,
}

/// A prepared workspace, owned by exactly one job.
///
/// Hand it back to [`WorkspaceManager::cleanup`] when the job ends. If it is
/// dropped instead (task cancelled, panic), the directory is removed
/// synchronously from `Drop`.
#[derive(Debug)]
pub struct Workspace {
    paths: WorkspacePaths,
    released: bool,
}

impl Workspace {
    fn new(paths: WorkspacePaths) -> Self {
        Self {
            paths,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        self.paths.dir()
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(path = %self.paths.dir().display(), "workspace dropped without cleanup, removing");
        if let Err(e) = std::fs::remove_dir_all(self.paths.dir())
            && e.kind() != ErrorKind::NotFound
        {
            warn!(path = %self.paths.dir().display(), error = %e, "workspace removal failed");
        }
    }
}

impl WorkspaceManager {
    pub fn new(config: WorkspaceConfig) -> Self {
        Self {
            root: JobsRoot::new(config.jobs_root),
            payload_dir: config.payload_dir,
        }
    }

    pub fn jobs_root(&self) -> &Path {
        self.root.dir()
    }

    /// Create `<root>/<job.id>`, seed it from the payload template and write
    /// the source and stdin files.
    ///
    /// An existing directory is reported as an error and left untouched. If
    /// seeding fails after the directory was created, it is removed before
    /// the error is returned.
    pub async fn prepare(&self, job: &SandboxJob, compiler: &CompilerSpec) -> Result<Workspace> {
        compiler.validate()?;
        let paths = self.root.workspace(job.id.as_str());

        tokio::fs::create_dir_all(self.root.dir())
            .await
            .map_err(|e| workspace_err("create jobs root", self.root.dir(), e))?;

        match tokio::fs::create_dir(paths.dir()).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(SandboxError::Workspace(format!(
                    "workspace for job {} already exists",
                    job.id
                )));
            }
            Err(e) => return Err(workspace_err("create workspace", paths.dir(), e)),
        }

        let workspace = Workspace::new(paths);
        let populated = self.populate(&workspace, job, compiler).await;
        if let Err(e) = populated {
            if let Err(cleanup_err) = self.cleanup(workspace).await {
                warn!(job_id = %job.id, error = %cleanup_err, "cleanup of partial workspace failed");
            }
            return Err(e);
        }

        debug!(job_id = %job.id, path = %workspace.path().display(), "workspace prepared");
        Ok(workspace)
    }

    async fn populate(
        &self,
        workspace: &Workspace,
        job: &SandboxJob,
        compiler: &CompilerSpec,
    ) -> Result<()> {
        let paths = workspace.paths();
        let copied = copy_payload(&self.payload_dir, paths.dir()).await?;

        set_open_mode(paths.dir()).await?;

        let source = paths.source(&compiler.source_file);
        tokio::fs::write(&source, &job.source)
            .await
            .map_err(|e| workspace_err("write source", &source, e))?;
        set_open_mode(&source).await?;

        let input = paths.input();
        tokio::fs::write(&input, &job.stdin)
            .await
            .map_err(|e| workspace_err("write stdin", &input, e))?;

        debug!(
            job_id = %job.id,
            payload_files = copied,
            source_bytes = job.source.len(),
            stdin_bytes = job.stdin.len(),
            "workspace populated"
        );
        Ok(())
    }

    /// Remove the workspace tree. Consumes the guard so a job can only
    /// release its workspace once.
    pub async fn cleanup(&self, mut workspace: Workspace) -> Result<()> {
        workspace.released = true;
        remove_workspace(workspace.path()).await?;
        info!(path = %workspace.path().display(), "workspace removed");
        Ok(())
    }
}

/// Recursively remove a workspace directory. A missing path is not an error,
/// so calling this twice is harmless.
pub async fn remove_workspace(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(workspace_err("remove workspace", path, e)),
    }
}

/// Copy the regular files of `payload_dir` (not recursive) into `dest`.
async fn copy_payload(payload_dir: &Path, dest: &Path) -> Result<usize> {
    let mut entries = tokio::fs::read_dir(payload_dir)
        .await
        .map_err(|e| workspace_err("read payload", payload_dir, e))?;

    let mut copied = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| workspace_err("read payload", payload_dir, e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| workspace_err("stat payload entry", &entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }
        let target = dest.join(entry.file_name());
        tokio::fs::copy(entry.path(), &target)
            .await
            .map_err(|e| workspace_err("copy payload", &target, e))?;
        copied += 1;
    }
    Ok(copied)
}

async fn set_open_mode(path: &Path) -> Result<()> {
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(OPEN_MODE))
        .await
        .map_err(|e| workspace_err("chmod", path, e))
}

fn workspace_err(action: &str, path: &Path, e: std::io::Error) -> SandboxError {
    SandboxError::Workspace(format!("{action} {}: {e}", path.display()))
}
