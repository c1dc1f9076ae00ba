//! Hands generated IR to an external compiler driver.
//!
//! The action is chosen from the output extension: `.ll` files receive
//! the IR as is, `.o` files are assembled with `-c`, and anything else
//! is linked into an executable. In the last two cases the IR is first
//! written next to the output as `<output>.ll`.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::CoreError;
use crate::target::Target;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const STDERR_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainConfig {
    /// Compiler driver executable, looked up on `PATH`.
    pub driver: String,
    /// Kill the driver if it runs longer than this.
    pub timeout: Option<Duration>,
    /// Appended after the generated arguments.
    pub extra_args: Vec<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        ToolchainConfig {
            driver: "clang".to_string(),
            timeout: None,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    LlvmIr,
    Object,
    Executable,
}

impl OutputKind {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("ll") => OutputKind::LlvmIr,
            Some("o") => OutputKind::Object,
            _ => OutputKind::Executable,
        }
    }
}

/// Path of the IR file handed to the driver for `output`.
pub fn intermediate_path(output: &Path) -> PathBuf {
    let mut path = output.as_os_str().to_owned();
    path.push(".ll");
    PathBuf::from(path)
}

/// Produces `output` from `ir` according to its extension.
pub fn emit_output(
    ir: &str,
    output: &Path,
    target: &Target,
    config: &ToolchainConfig,
) -> Result<(), CoreError> {
    let kind = OutputKind::from_path(output);
    debug!(output = %output.display(), ?kind, "emitting output");
    if kind == OutputKind::LlvmIr {
        return write_file(output, ir);
    }

    let ir_path = intermediate_path(output);
    write_file(&ir_path, ir)?;

    let mut command = Command::new(&config.driver);
    if kind == OutputKind::Object {
        command.arg("-c");
    }
    command
        .arg(&ir_path)
        .arg("-o")
        .arg(output)
        .arg("-target")
        .arg(target.triple())
        .args(&config.extra_args);
    run(command, &config.driver, config.timeout)
}

fn write_file(path: &Path, contents: &str) -> Result<(), CoreError> {
    fs::write(path, contents).map_err(|source| CoreError::WriteOutput {
        path: path.to_path_buf(),
        source,
    })
}

fn run(mut command: Command, program: &str, timeout: Option<Duration>) -> Result<(), CoreError> {
    // The driver leads its own process group so that a timeout also takes
    // down the assembler and linker it spawned.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    debug!(?command, "running toolchain");
    let mut child = command
        .stdin(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| CoreError::ToolchainLaunch {
            program: program.to_string(),
            source,
        })?;

    // Drained on its own thread so a chatty driver cannot fill the pipe
    // while we wait on it.
    let stderr = child.stderr.take();
    let (sender, stderr_text) = mpsc::channel();
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_string(&mut text);
        }
        let _ = sender.send(text);
    });

    let status = wait(&mut child, program, timeout)?;
    // A helper that outlives the driver keeps the pipe open.
    let stderr = stderr_text.recv_timeout(STDERR_GRACE).unwrap_or_default();

    if !status.success() {
        return Err(CoreError::ToolchainFailed {
            program: program.to_string(),
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(())
}

fn wait(child: &mut Child, program: &str, timeout: Option<Duration>) -> Result<ExitStatus, CoreError> {
    let launch_error = |source: std::io::Error| CoreError::ToolchainLaunch {
        program: program.to_string(),
        source,
    };
    let Some(timeout) = timeout else {
        return child.wait().map_err(launch_error);
    };

    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(launch_error)? {
            return Ok(status);
        }
        if started.elapsed() >= timeout {
            warn!(program, ?timeout, "toolchain timed out, killing it");
            kill_process_group(child);
            let _ = child.wait();
            return Err(CoreError::ToolchainTimeout {
                program: program.to_string(),
                timeout,
            });
        }
        thread::sleep(POLL_INTERVAL.min(timeout));
    }
}

fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let killed = Command::new("kill")
            .args(["-KILL", "--", group.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if !killed.is_ok_and(|status| status.success()) {
            warn!(group = %group, "could not kill toolchain process group");
        }
    }
    let _ = child.kill();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn host() -> Target {
        Target::parse("x86_64-pc-linux-gnu").expect("target")
    }

    fn driver(name: &str) -> ToolchainConfig {
        ToolchainConfig {
            driver: name.to_string(),
            ..ToolchainConfig::default()
        }
    }

    #[test]
    fn dispatches_on_extension() {
        assert_eq!(OutputKind::from_path(Path::new("out.ll")), OutputKind::LlvmIr);
        assert_eq!(OutputKind::from_path(Path::new("out.o")), OutputKind::Object);
        assert_eq!(OutputKind::from_path(Path::new("out.elf")), OutputKind::Executable);
        assert_eq!(OutputKind::from_path(Path::new("out")), OutputKind::Executable);
        assert_eq!(intermediate_path(Path::new("dir/a.o")), PathBuf::from("dir/a.o.ll"));
    }

    #[test]
    fn ll_output_is_written_verbatim() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("out.ll");
        emit_output("; module\n", &output, &host(), &driver("no-such-driver"))
            .expect("emit");
        assert_eq!(fs::read_to_string(&output).unwrap(), "; module\n");
        assert!(!intermediate_path(&output).exists());
    }

    #[test]
    fn missing_driver_is_a_toolchain_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("out.o");
        let err = emit_output("; module\n", &output, &host(), &driver("firestorm-missing-cc"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Toolchain);
        assert!(matches!(err, CoreError::ToolchainLaunch { .. }));
        assert_eq!(
            fs::read_to_string(intermediate_path(&output)).unwrap(),
            "; module\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_a_toolchain_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = emit_output("", &dir.path().join("out"), &host(), &driver("false"))
            .unwrap_err();
        assert!(matches!(err, CoreError::ToolchainFailed { .. }), "{err}");
    }

    // With `sh` as the driver the intermediate file is executed as a
    // script, which makes the argument order observable.
    #[cfg(unix)]
    #[test]
    fn executable_output_passes_ir_then_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("prog.elf");
        let script = "test \"$1\" = -o && test \"$3\" = -target && cp \"$0\" \"$2\"\n";
        emit_output(script, &output, &host(), &driver("sh")).expect("emit");
        assert_eq!(fs::read_to_string(&output).unwrap(), script);
    }

    #[cfg(unix)]
    #[test]
    fn slow_driver_is_killed_after_timeout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ToolchainConfig {
            timeout: Some(Duration::from_millis(200)),
            ..driver("sh")
        };
        let started = Instant::now();
        let err = emit_output("exec sleep 10\n", &dir.path().join("out"), &host(), &config)
            .unwrap_err();
        assert!(matches!(err, CoreError::ToolchainTimeout { .. }), "{err}");
        assert!(err.to_string().contains("200ms"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    // Without `exec` the shell forks `sleep`, which inherits the stderr
    // pipe and would otherwise keep the build waiting.
    #[cfg(unix)]
    #[test]
    fn timeout_does_not_wait_for_driver_helpers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ToolchainConfig {
            timeout: Some(Duration::from_millis(200)),
            ..driver("sh")
        };
        let started = Instant::now();
        let err = emit_output("sleep 6\n", &dir.path().join("out"), &host(), &config)
            .unwrap_err();
        assert!(matches!(err, CoreError::ToolchainTimeout { .. }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_background_helpers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("out");
        let config = ToolchainConfig {
            timeout: Some(Duration::from_millis(200)),
            ..driver("sh")
        };
        let script = "(sleep 1 && touch \"$2\") &\nsleep 6\n";
        let err = emit_output(script, &output, &host(), &config).unwrap_err();
        assert!(matches!(err, CoreError::ToolchainTimeout { .. }), "{err}");
        thread::sleep(Duration::from_millis(1500));
        assert!(!output.exists());
    }
}
