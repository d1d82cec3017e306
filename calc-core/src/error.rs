use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

use crate::stage::Stage;
use crate::toolchain::Tool;

/// Status used for every failure that has no exit status of its own.
pub const GENERAL_FAILURE: i32 = 1;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("could not find `{}` ({tool}) on the search path", .tool.binary_name())]
    ToolNotFound { tool: Tool },
    #[error("runtime source was not found at {0}")]
    MissingRuntime(PathBuf),
    #[error("failed to create temporary workspace: {0}")]
    WorkspaceCreate(#[source] std::io::Error),
    #[error("failed to read source file {path}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} stage: failed to start {program}")]
    Spawn {
        stage: Stage,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} stage: failed while waiting for {program}")]
    Wait {
        stage: Stage,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} stage failed ({status}): {command}")]
    StageFailed {
        stage: Stage,
        command: String,
        status: ExitStatus,
    },
    #[error("{stage} stage timed out after {}s", .timeout.as_secs_f64())]
    StageTimedOut { stage: Stage, timeout: Duration },
    #[error("{stage} stage interrupted by signal {signal}")]
    Interrupted { stage: Stage, signal: i32 },
    #[error("{stage} stage: expected artifact {path} is missing")]
    MissingArtifact { stage: Stage, path: PathBuf },
    #[error("failed to write output {path}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[cfg(unix)]
    #[error("failed to install signal handlers: {0}")]
    SignalSetup(#[source] nix::errno::Errno),
}

impl DriverError {
    /// Process exit status to report for this error.
    ///
    /// A failing tool's own status is passed through; a tool killed by a
    /// signal, or a driver interrupted by one, maps to `128 + signal`.
    pub fn exit_code(&self) -> i32 {
        match self {
            DriverError::StageFailed { status, .. } => status_code(status),
            DriverError::Interrupted { signal, .. } => 128 + signal,
            _ => GENERAL_FAILURE,
        }
    }
}

fn status_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        // a zero here would report success for a failed build
        return if code == 0 { GENERAL_FAILURE } else { code };
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    GENERAL_FAILURE
}
