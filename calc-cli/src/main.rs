use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use calc_core::error::GENERAL_FAILURE;
use calc_core::interrupt;
use calc_core::pipeline::default_runtime_source;
use calc_core::toolchain::default_tool_dirs;
use calc_core::{BuildRequest, DriverError, Pipeline, PipelineOptions, SearchPath, Tool, Toolchain};
use clap::Parser;
use tracing::info;

mod logging;

/// Compile a calc source file into a native executable.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source file to compile
    file: PathBuf,

    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Path of the produced executable (defaults to a.out)"
    )]
    output: Option<PathBuf>,

    #[arg(long, help = "Print the resolved toolchain paths")]
    verbose: bool,

    #[arg(
        long = "tool-dir",
        value_name = "DIR",
        help = "Directory searched for calcc, clang and llc before the defaults (repeatable)"
    )]
    tool_dirs: Vec<PathBuf>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Runtime C source linked into every executable (defaults to the bundled runtime)"
    )]
    runtime: Option<PathBuf>,

    #[arg(
        long,
        value_name = "SECONDS",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Kill a stage that runs longer than this"
    )]
    timeout: Option<u64>,

    #[arg(
        long = "temp-dir",
        value_name = "DIR",
        help = "Directory the build workspace is created in (defaults to the system temp dir)"
    )]
    temp_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

fn execute(cli: Cli) -> Result<()> {
    let cancel = interrupt::install_handlers()?;

    let mut tool_dirs = cli.tool_dirs;
    tool_dirs.extend(default_tool_dirs());
    let search = SearchPath::from_env(tool_dirs);
    let toolchain = Toolchain::resolve(&search).context("failed to resolve toolchain")?;

    if cli.verbose {
        for tool in Tool::ALL {
            eprintln!(
                "using {}: {}",
                tool.binary_name(),
                toolchain.path(tool).display()
            );
        }
    }

    let request = BuildRequest::from_file(&cli.file, cli.output)?;
    let options = PipelineOptions {
        runtime_source: cli.runtime.unwrap_or_else(default_runtime_source),
        temp_root: cli.temp_dir,
        stage_timeout: cli.timeout.map(Duration::from_secs),
    };
    let outcome = Pipeline::new(&toolchain, options)
        .with_cancel(cancel)
        .build(&request)
        .with_context(|| format!("failed to build {}", cli.file.display()))?;

    info!(output = %outcome.output.display(), "wrote executable");
    Ok(())
}

fn exit_status(err: &anyhow::Error) -> u8 {
    let code = err
        .downcast_ref::<DriverError>()
        .map_or(GENERAL_FAILURE, DriverError::exit_code);
    match u8::try_from(code) {
        Ok(0) | Err(_) => GENERAL_FAILURE as u8,
        Ok(code) => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::{TempDir, tempdir};

    const FAKE_CALCC: &str = r#"#!/bin/sh
case "$1" in
  *fail*) echo "calcc: syntax error" >&2; exit 3 ;;
  *hang*) exec sleep 30 ;;
esac
printf 'ir %s\n' "$1" > "$3"
"#;

    const FAKE_LLC: &str = r#"#!/bin/sh
{ printf 'obj\n'; cat "$2"; } > "$4"
"#;

    const FAKE_CLANG: &str = r#"#!/bin/sh
out=""
inputs=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -w|-c|-l*) shift ;;
    *) inputs="$inputs $1"; shift ;;
  esac
done
cat $inputs > "$out"
"#;

    #[cfg(unix)]
    fn fake_tools(names: &[&str]) -> TempDir {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().expect("tempdir");
        for name in names {
            let script = match *name {
                "calcc" => FAKE_CALCC,
                "llc" => FAKE_LLC,
                _ => FAKE_CLANG,
            };
            let path = dir.path().join(name);
            fs::write(&path, script).expect("write fake tool");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        }
        dir
    }

    fn write_input(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("input.calc");
        fs::write(&path, contents).expect("write input");
        path
    }

    fn is_empty_dir(dir: &Path) -> bool {
        fs::read_dir(dir).expect("read dir").next().is_none()
    }

    #[cfg(unix)]
    #[test]
    fn builds_executable() {
        let tools = fake_tools(&["calcc", "clang", "llc"]);
        let dir = tempdir().expect("tempdir");
        let scratch = tempdir().expect("tempdir");
        let input_path = write_input(dir.path(), "  1 + 2\n");
        let output_path = dir.path().join("bin").join("calc");

        Command::cargo_bin("calc-cli")
            .expect("binary exists")
            .arg(&input_path)
            .arg("--output")
            .arg(&output_path)
            .arg("--tool-dir")
            .arg(tools.path())
            .arg("--temp-dir")
            .arg(scratch.path())
            .assert()
            .success();

        let produced = fs::read_to_string(&output_path).expect("read output");
        assert!(produced.starts_with("obj\nir 1 + 2\n"));
        assert!(is_empty_dir(scratch.path()), "workspace was not removed");
    }

    #[cfg(unix)]
    #[test]
    fn defaults_output_to_a_out() {
        let tools = fake_tools(&["calcc", "clang", "llc"]);
        let dir = tempdir().expect("tempdir");
        let input_path = write_input(dir.path(), "7");

        Command::cargo_bin("calc-cli")
            .expect("binary exists")
            .current_dir(dir.path())
            .arg(&input_path)
            .arg("--tool-dir")
            .arg(tools.path())
            .assert()
            .success();

        assert!(dir.path().join("a.out").exists(), "a.out was not created");
    }

    #[cfg(unix)]
    #[test]
    fn verbose_reports_toolchain() {
        let tools = fake_tools(&["calcc", "clang", "llc"]);
        let dir = tempdir().expect("tempdir");
        let input_path = write_input(dir.path(), "1");
        let tool_dir = tools.path().display().to_string();

        Command::cargo_bin("calc-cli")
            .expect("binary exists")
            .arg(&input_path)
            .arg("-o")
            .arg(dir.path().join("calc"))
            .arg("--tool-dir")
            .arg(tools.path())
            .arg("--verbose")
            .assert()
            .success()
            .stderr(predicate::str::contains(format!("using calcc: {tool_dir}/calcc")))
            .stderr(predicate::str::contains(format!("using clang: {tool_dir}/clang")))
            .stderr(predicate::str::contains(format!("using llc: {tool_dir}/llc")));
    }

    #[cfg(unix)]
    #[test]
    fn propagates_frontend_exit_status() {
        let tools = fake_tools(&["calcc", "clang", "llc"]);
        let dir = tempdir().expect("tempdir");
        let scratch = tempdir().expect("tempdir");
        let input_path = write_input(dir.path(), "fail (");
        let output_path = dir.path().join("calc");

        Command::cargo_bin("calc-cli")
            .expect("binary exists")
            .arg(&input_path)
            .arg("-o")
            .arg(&output_path)
            .arg("--tool-dir")
            .arg(tools.path())
            .arg("--temp-dir")
            .arg(scratch.path())
            .assert()
            .code(3)
            .stderr(predicate::str::contains("calcc: syntax error"))
            .stderr(predicate::str::contains("frontend-compile stage failed"));

        assert!(!output_path.exists(), "output must not exist after a failure");
        assert!(is_empty_dir(scratch.path()), "workspace was not removed");
    }

    #[cfg(unix)]
    #[test]
    fn missing_tool_fails_before_workspace() {
        let tools = fake_tools(&["calcc", "llc"]);
        let empty_path = tempdir().expect("tempdir");
        let dir = tempdir().expect("tempdir");
        let scratch = tempdir().expect("tempdir");
        let input_path = write_input(dir.path(), "1");

        Command::cargo_bin("calc-cli")
            .expect("binary exists")
            .env("PATH", empty_path.path())
            .arg(&input_path)
            .arg("-o")
            .arg(dir.path().join("calc"))
            .arg("--tool-dir")
            .arg(tools.path())
            .arg("--temp-dir")
            .arg(scratch.path())
            .assert()
            .code(1)
            .stderr(predicate::str::contains("could not find `clang`"));

        assert!(is_empty_dir(scratch.path()), "no workspace should be created");
        assert!(!dir.path().join("calc").exists());
    }

    #[cfg(unix)]
    #[test]
    fn sigterm_removes_workspace() {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;
        use std::process::Stdio;
        use std::time::Instant;

        let tools = fake_tools(&["calcc", "clang", "llc"]);
        let dir = tempdir().expect("tempdir");
        let scratch = tempdir().expect("tempdir");
        let input_path = write_input(dir.path(), "hang");
        let output_path = dir.path().join("calc");

        let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("calc-cli"))
            .arg(&input_path)
            .arg("-o")
            .arg(&output_path)
            .arg("--tool-dir")
            .arg(tools.path())
            .arg("--temp-dir")
            .arg(scratch.path())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn driver");

        let started = Instant::now();
        while is_empty_dir(scratch.path()) {
            assert!(
                started.elapsed() < Duration::from_secs(10),
                "workspace never appeared"
            );
            std::thread::sleep(Duration::from_millis(20));
        }
        std::thread::sleep(Duration::from_millis(200));
        kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).expect("send SIGTERM");

        let status = child.wait().expect("wait for driver");
        assert_eq!(status.code(), Some(143));
        assert!(is_empty_dir(scratch.path()), "workspace was not removed");
        assert!(!output_path.exists(), "output must not exist after a signal");
    }

    #[cfg(unix)]
    #[test]
    fn reports_unreadable_input() {
        let tools = fake_tools(&["calcc", "clang", "llc"]);
        let dir = tempdir().expect("tempdir");

        Command::cargo_bin("calc-cli")
            .expect("binary exists")
            .arg(dir.path().join("missing.calc"))
            .arg("--tool-dir")
            .arg(tools.path())
            .assert()
            .code(1)
            .stderr(predicate::str::contains("failed to read source file"));
    }

    #[test]
    fn requires_source_file() {
        Command::cargo_bin("calc-cli")
            .expect("binary exists")
            .assert()
            .failure()
            .stderr(predicate::str::contains("<FILE>"));
    }

    #[test]
    fn exit_status_uses_driver_error() {
        let err = anyhow::Error::new(DriverError::Interrupted {
            stage: calc_core::Stage::Link,
            signal: 15,
        })
        .context("failed to build input.calc");
        assert_eq!(exit_status(&err), 143);

        let err = anyhow::anyhow!("something else");
        assert_eq!(exit_status(&err), 1);
    }
}
