use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::error::DriverError;

const WORKSPACE_PREFIX: &str = "calcc";

/// Temporary directory holding the intermediate artifacts of one build.
///
/// The directory and everything in it is removed when the workspace is
/// dropped, whichever way the build ends.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    runtime_object: PathBuf,
    expr_object: PathBuf,
    expr_ir: PathBuf,
}

impl Workspace {
    /// Creates the workspace under the system temporary directory.
    pub fn create() -> Result<Self, DriverError> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir()
            .map_err(DriverError::WorkspaceCreate)?;
        Ok(Self::from_dir(dir))
    }

    /// Creates the workspace under `root`, which must already exist.
    pub fn create_in(root: impl AsRef<Path>) -> Result<Self, DriverError> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(root)
            .map_err(DriverError::WorkspaceCreate)?;
        Ok(Self::from_dir(dir))
    }

    fn from_dir(dir: TempDir) -> Self {
        debug!(path = %dir.path().display(), "created workspace");
        let root = dir.path();
        Self {
            runtime_object: root.join("runtime.o"),
            expr_object: root.join("expr.o"),
            expr_ir: root.join("expr.ll"),
            dir,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn runtime_object(&self) -> &Path {
        &self.runtime_object
    }

    pub fn expr_object(&self) -> &Path {
        &self.expr_object
    }

    pub fn expr_ir(&self) -> &Path {
        &self.expr_ir
    }

    /// Removes the workspace now, reporting any error that dropping it
    /// would have swallowed.
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}
