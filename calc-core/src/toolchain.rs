//! Locating the external tools the pipeline drives.
//!
//! Resolution works on an explicit [`SearchPath`] value instead of editing
//! the process `PATH`, so it has no side effects and can be pointed at any
//! set of directories in tests.

use std::env;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::DriverError;

/// Directories of a vendored LLVM checkout, relative to the repository root.
const VENDORED_TOOL_DIRS: &[&str] = &["external/llvm-project/clang", "external/llvm-project/llvm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Frontend,
    CCompiler,
    Backend,
}

impl Tool {
    pub const ALL: [Tool; 3] = [Tool::Frontend, Tool::CCompiler, Tool::Backend];

    pub fn binary_name(self) -> &'static str {
        match self {
            Tool::Frontend => "calcc",
            Tool::CCompiler => "clang",
            Tool::Backend => "llc",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            Tool::Frontend => "front-end compiler",
            Tool::CCompiler => "C compiler",
            Tool::Backend => "LLVM static compiler",
        };
        f.write_str(description)
    }
}

/// Ordered list of directories searched for tools.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// Extra directories first, followed by the entries of `base`
    /// (a `PATH`-style list).
    pub fn new(extra: impl IntoIterator<Item = PathBuf>, base: Option<&OsStr>) -> Self {
        let mut dirs: Vec<PathBuf> = extra.into_iter().collect();
        if let Some(base) = base {
            dirs.extend(env::split_paths(base).filter(|dir| !dir.as_os_str().is_empty()));
        }
        Self { dirs }
    }

    /// `extra` prepended to the caller's `PATH`.
    pub fn from_env(extra: impl IntoIterator<Item = PathBuf>) -> Self {
        let base = env::var_os("PATH");
        Self::new(extra, base.as_deref())
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// First executable called `name` in search order.
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        self.dirs.iter().find_map(|dir| {
            candidates(dir, name)
                .into_iter()
                .find(|candidate| is_executable(candidate))
        })
    }
}

/// Directory containing the running driver executable.
pub fn driver_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Directories searched ahead of `PATH` when the user gives none: the
/// vendored toolchain next to the repository, then the driver's own directory.
pub fn default_tool_dirs() -> Vec<PathBuf> {
    let Some(driver_dir) = driver_dir() else {
        return Vec::new();
    };
    let repo_root = driver_dir.join("..").join("..");
    let mut dirs: Vec<PathBuf> = VENDORED_TOOL_DIRS
        .iter()
        .map(|relative| repo_root.join(relative))
        .collect();
    dirs.push(driver_dir);
    dirs
}

/// Absolute paths of the three tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub frontend: PathBuf,
    pub cc: PathBuf,
    pub backend: PathBuf,
}

impl Toolchain {
    pub fn resolve(search: &SearchPath) -> Result<Self, DriverError> {
        let lookup = |tool: Tool| -> Result<PathBuf, DriverError> {
            let found = search
                .find(tool.binary_name())
                .ok_or(DriverError::ToolNotFound { tool })?;
            let path = std::path::absolute(&found).unwrap_or(found);
            debug!(tool = tool.binary_name(), path = %path.display(), "resolved tool");
            Ok(path)
        };
        Ok(Self {
            frontend: lookup(Tool::Frontend)?,
            cc: lookup(Tool::CCompiler)?,
            backend: lookup(Tool::Backend)?,
        })
    }

    pub fn path(&self, tool: Tool) -> &Path {
        match tool {
            Tool::Frontend => &self.frontend,
            Tool::CCompiler => &self.cc,
            Tool::Backend => &self.backend,
        }
    }
}

fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    let mut found = vec![dir.join(name)];
    if cfg!(windows) {
        found.push(dir.join(format!("{name}.exe")));
    }
    found
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
