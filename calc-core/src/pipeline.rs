use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempPath;
use tracing::{debug, info, info_span, warn};

use crate::error::DriverError;
use crate::interrupt::CancelFlag;
use crate::request::BuildRequest;
use crate::stage::{Stage, StageCommand, plan};
use crate::toolchain::{Toolchain, driver_dir};
use crate::workspace::Workspace;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const STAGING_PREFIX: &str = ".calc-out-";

/// Runtime locations relative to the driver's directory, in lookup order.
const RUNTIME_NEXT_TO_DRIVER: &[&str] = &["runtime/runtime.c", "../runtime/runtime.c"];

/// The runtime shipped next to the driver, or the one in the source tree
/// when the driver runs from its build directory.
pub fn default_runtime_source() -> PathBuf {
    locate_runtime(driver_dir().as_deref())
}

fn locate_runtime(driver_dir: Option<&Path>) -> PathBuf {
    driver_dir
        .into_iter()
        .flat_map(|dir| RUNTIME_NEXT_TO_DRIVER.iter().map(move |relative| dir.join(relative)))
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../runtime/runtime.c"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub runtime_source: PathBuf,
    /// Directory the workspace is created in; the system temp dir if unset.
    pub temp_root: Option<PathBuf>,
    pub stage_timeout: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            runtime_source: default_runtime_source(),
            temp_root: None,
            stage_timeout: None,
        }
    }
}

/// A stage that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub stage: Stage,
    pub command: String,
    pub status: ExitStatus,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub output: PathBuf,
    pub stages: Vec<StageResult>,
}

pub struct Pipeline<'a> {
    toolchain: &'a Toolchain,
    options: PipelineOptions,
    cancel: Option<&'a CancelFlag>,
}

impl<'a> Pipeline<'a> {
    pub fn new(toolchain: &'a Toolchain, options: PipelineOptions) -> Self {
        Self {
            toolchain,
            options,
            cancel: None,
        }
    }

    /// Aborts the running stage once `flag` is raised.
    pub fn with_cancel(mut self, flag: &'a CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Runs all four stages and moves the linked executable into place.
    ///
    /// Nothing is written at the output path unless every stage succeeds, and
    /// the workspace is gone when this returns.
    pub fn build(&self, request: &BuildRequest) -> Result<BuildOutcome, DriverError> {
        let runtime_source = &self.options.runtime_source;
        if !runtime_source.is_file() {
            return Err(DriverError::MissingRuntime(runtime_source.clone()));
        }

        let workspace = match &self.options.temp_root {
            Some(root) => Workspace::create_in(root)?,
            None => Workspace::create()?,
        };
        let output = request.output_path().to_path_buf();

        let commands = plan(
            self.toolchain,
            &workspace,
            runtime_source,
            &request.source_text,
            &output,
        );
        let mut stages = Vec::with_capacity(commands.len());
        let mut staging = None;
        for command in commands {
            // nothing is created next to the output until the linker is about to run
            let command = if command.stage == Stage::Link {
                let reserved = reserve_output(&output)?;
                let command = command.redirect_output(&reserved);
                staging = Some(reserved);
                command
            } else {
                command
            };
            stages.push(self.run_stage(&command)?);
        }

        let staging = staging.ok_or_else(|| DriverError::MissingArtifact {
            stage: Stage::Link,
            path: output.clone(),
        })?;
        staging
            .persist(&output)
            .map_err(|err| DriverError::Output {
                path: output.clone(),
                source: err.error,
            })?;
        if let Err(err) = workspace.close() {
            warn!(error = %err, "failed to remove workspace");
        }
        info!(output = %output.display(), "build finished");

        Ok(BuildOutcome { output, stages })
    }

    /// Runs one stage. Its inputs must already exist.
    pub fn run_stage(&self, command: &StageCommand) -> Result<StageResult, DriverError> {
        let stage = command.stage;
        let _span = info_span!("stage", stage = %stage).entered();

        if let Some(signal) = self.cancel.and_then(CancelFlag::raised) {
            return Err(DriverError::Interrupted { stage, signal });
        }
        if let Some(missing) = command.inputs.iter().find(|input| !input.exists()) {
            return Err(DriverError::MissingArtifact {
                stage,
                path: missing.clone(),
            });
        }

        let command_line = command.command_line();
        debug!(command = %command_line, "running stage");
        let started = Instant::now();
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| DriverError::Spawn {
                stage,
                program: command.program.clone(),
                source,
            })?;
        let status = self.wait(command, &mut child)?;
        let elapsed = started.elapsed();

        if !status.success() {
            return Err(DriverError::StageFailed {
                stage,
                command: command_line,
                status,
            });
        }
        if !command.output.exists() {
            return Err(DriverError::MissingArtifact {
                stage,
                path: command.output.clone(),
            });
        }
        debug!(elapsed_ms = elapsed.as_millis() as u64, "stage finished");

        Ok(StageResult {
            stage,
            command: command_line,
            status,
            elapsed,
        })
    }

    fn wait(&self, command: &StageCommand, child: &mut Child) -> Result<ExitStatus, DriverError> {
        let stage = command.stage;
        let wait_error = |source| DriverError::Wait {
            stage,
            program: command.program.clone(),
            source,
        };

        let timeout = self.options.stage_timeout;
        if timeout.is_none() && self.cancel.is_none() {
            return child.wait().map_err(wait_error);
        }

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(wait_error)? {
                return Ok(status);
            }
            if let Some(signal) = self.cancel.and_then(CancelFlag::raised) {
                terminate(child);
                return Err(DriverError::Interrupted { stage, signal });
            }
            if let Some(timeout) = timeout.filter(|limit| started.elapsed() >= *limit) {
                terminate(child);
                return Err(DriverError::StageTimedOut { stage, timeout });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn terminate(child: &mut Child) {
    if let Err(err) = child.kill() {
        warn!(error = %err, "failed to kill stage process");
    }
    if let Err(err) = child.wait() {
        warn!(error = %err, "failed to reap stage process");
    }
}

/// Reserves a unique name next to `output` for the linker to write to.
fn reserve_output(output: &Path) -> Result<TempPath, DriverError> {
    let output_error = |source| DriverError::Output {
        path: output.to_path_buf(),
        source,
    };
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(output_error)?;
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(dir)
        .map_err(output_error)?
        .into_temp_path();
    // only the name is kept; the linker creates the file with its own mode
    fs::remove_file(&staging).map_err(output_error)?;
    Ok(staging)
}
