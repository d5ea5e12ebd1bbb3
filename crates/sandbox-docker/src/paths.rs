use std::path::{Path, PathBuf};

/// Where the workspace is bind-mounted inside the container.
pub const CONTAINER_MOUNT: &str = "/usercode";

/// Entry script copied from the payload template, as seen inside the container.
pub const ENTRY_SCRIPT: &str = "/usercode/script.sh";

/// Parent directory of all job workspaces.
#[derive(Debug, Clone)]
pub struct JobsRoot {
    root: PathBuf,
}

impl JobsRoot {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn dir(&self) -> &Path {
        &self.root
    }

    /// Workspace directory: `<root>/<job_id>/`.
    pub fn workspace(&self, job_id: &str) -> WorkspacePaths {
        WorkspacePaths::new(self.root.join(job_id))
    }
}

/// File layout of one workspace, shared with the in-container script.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    dir: PathBuf,
}

impl WorkspacePaths {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Program stdin.
    pub fn input(&self) -> PathBuf {
        self.dir.join("inputFile")
    }

    /// Completion marker: `<stdout><DELIM><time>`, written last.
    pub fn completed(&self) -> PathBuf {
        self.dir.join("completed")
    }

    /// Toolchain diagnostics and program stderr.
    pub fn errors(&self) -> PathBuf {
        self.dir.join("errors")
    }

    /// Output captured so far while the program runs.
    pub fn partial_log(&self) -> PathBuf {
        self.dir.join("logfile.txt")
    }
}
