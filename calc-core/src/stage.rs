//! The fixed four-stage build plan.
//!
//! Each stage is a descriptor naming the program to run, its arguments, the
//! artifacts it needs from earlier stages and the artifact it produces. The
//! executor in [`crate::pipeline`] runs them in order.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::toolchain::{Tool, Toolchain};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    RuntimeCompile,
    FrontendCompile,
    Lower,
    Link,
}

impl Stage {
    pub const ORDER: [Stage; 4] = [
        Stage::RuntimeCompile,
        Stage::FrontendCompile,
        Stage::Lower,
        Stage::Link,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::RuntimeCompile => "runtime-compile",
            Stage::FrontendCompile => "frontend-compile",
            Stage::Lower => "lower",
            Stage::Link => "link",
        }
    }

    pub fn tool(self) -> Tool {
        match self {
            Stage::RuntimeCompile | Stage::Link => Tool::CCompiler,
            Stage::FrontendCompile => Tool::Frontend,
            Stage::Lower => Tool::Backend,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub stage: Stage,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

impl StageCommand {
    fn new(stage: Stage, toolchain: &Toolchain) -> Self {
        Self {
            stage,
            program: toolchain.path(stage.tool()).to_path_buf(),
            args: Vec::new(),
            inputs: Vec::new(),
            output: PathBuf::new(),
        }
    }

    fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn input(mut self, path: &Path) -> Self {
        self.inputs.push(path.to_path_buf());
        self.arg(path)
    }

    fn output(mut self, path: &Path) -> Self {
        self.output = path.to_path_buf();
        self.arg("-o").arg(path)
    }

    /// Points the trailing `-o` at `path` instead.
    pub fn redirect_output(mut self, path: &Path) -> Self {
        if let Some(last) = self.args.last_mut() {
            *last = path.as_os_str().to_os_string();
        }
        self.output = path.to_path_buf();
        self
    }

    /// Shell-like rendering used in logs and error messages.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push('\'');
                line.push_str(&arg.replace('\'', r"'\''"));
                line.push('\'');
            } else {
                line.push_str(&arg);
            }
        }
        line
    }
}

/// Stage descriptors in execution order.
///
/// `source_text` is handed to the front end verbatim; `link_output` is where
/// the linker writes the executable.
pub fn plan(
    toolchain: &Toolchain,
    workspace: &Workspace,
    runtime_source: &Path,
    source_text: &str,
    link_output: &Path,
) -> Vec<StageCommand> {
    vec![
        StageCommand::new(Stage::RuntimeCompile, toolchain)
            .arg("-w")
            .arg("-c")
            .input(runtime_source)
            .output(workspace.runtime_object()),
        StageCommand::new(Stage::FrontendCompile, toolchain)
            .arg(source_text)
            .output(workspace.expr_ir()),
        StageCommand::new(Stage::Lower, toolchain)
            .arg("--filetype=obj")
            .input(workspace.expr_ir())
            .output(workspace.expr_object()),
        StageCommand::new(Stage::Link, toolchain)
            .input(workspace.expr_object())
            .input(workspace.runtime_object())
            .arg("-lc")
            .arg("-lm")
            .output(link_output),
    ]
}
