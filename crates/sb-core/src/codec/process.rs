//! Subprocess execution for codec tools with a wall-clock budget.

use std::ffi::OsString;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::CodecError;
use crate::collect::GpuSampler;

/// Bytes of stderr kept for error reports.
const STDERR_TAIL_BYTES: usize = 2048;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A fully built tool command line.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    pub binary: String,
    pub args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn label(&self) -> String {
        let mut label = self.binary.clone();
        for arg in &self.args {
            label.push(' ');
            label.push_str(&arg.to_string_lossy());
        }
        label
    }
}

/// Result of a tool that exited zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolRun {
    pub duration: Duration,
    pub peak_gpu_memory_mib: Option<u64>,
}

/// Run a tool to completion, killing it once `budget` is exceeded.
///
/// stdout is discarded; stderr is drained on a helper thread so a chatty
/// tool cannot block on a full pipe, and its tail is kept for the error.
pub fn run_tool(
    command: &ToolCommand,
    budget: Option<Duration>,
    gpu: Option<&GpuSampler>,
) -> Result<ToolRun, CodecError> {
    debug!(command = %command.label(), "invoking codec tool");
    let started = Instant::now();
    let mut cmd = Command::new(&command.binary);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group so a timeout reaches wrapper-spawned children.
        cmd.process_group(0);
    }
    let mut child = cmd
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => CodecError::NotFound {
                tool: command.binary.clone(),
            },
            _ => CodecError::Io(e),
        })?;

    let stderr_reader = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    });

    let pid = child.id();
    let mut peak_gpu: Option<u64> = None;
    let mut last_sample: Option<Instant> = None;

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if let Some(budget) = budget {
                    if started.elapsed() > budget {
                        kill_tree(&mut child);
                        let _ = child.wait();
                        // The reader is detached: an escaped descendant may
                        // still hold the pipe open.
                        drop(stderr_reader);
                        warn!(
                            tool = %command.binary,
                            budget_ms = budget.as_millis() as u64,
                            "codec tool exceeded budget, killed"
                        );
                        return Err(CodecError::Timeout {
                            tool: command.binary.clone(),
                            budget,
                        });
                    }
                }
                if let Some(sampler) = gpu {
                    let due = last_sample.map_or(true, |t| t.elapsed() >= sampler.interval);
                    if due {
                        if let Some(mib) = sampler.sample(pid) {
                            peak_gpu = Some(peak_gpu.map_or(mib, |p| p.max(mib)));
                        }
                        last_sample = Some(Instant::now());
                    }
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                kill_tree(&mut child);
                let _ = child.wait();
                return Err(CodecError::Io(e));
            }
        }
    };
    let duration = started.elapsed();

    let stderr = stderr_reader
        .and_then(|handle| handle.join().ok())
        .map(|buf| stderr_tail(&buf))
        .unwrap_or_default();

    if !status.success() {
        return Err(CodecError::Invocation {
            tool: command.binary.clone(),
            exit_code: status.code(),
            stderr,
        });
    }

    debug!(
        tool = %command.binary,
        duration_ms = duration.as_millis() as u64,
        peak_gpu_memory_mib = ?peak_gpu,
        "codec tool finished"
    );
    Ok(ToolRun {
        duration,
        peak_gpu_memory_mib: peak_gpu,
    })
}

/// Kill the tool and everything in its process group.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: the group was created at spawn with the child as leader.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Last [`STDERR_TAIL_BYTES`] of a tool's stderr, trimmed.
fn stderr_tail(buf: &[u8]) -> String {
    let start = buf.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&buf[start..]).trim().to_string()
}

/// Whether `binary` names an executable file, either directly or via `PATH`.
pub fn binary_available(binary: &str) -> bool {
    if binary.is_empty() {
        return false;
    }
    let direct = Path::new(binary);
    if direct.components().count() > 1 {
        return is_executable(direct);
    }
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(binary))
                .any(|candidate: PathBuf| is_executable(&candidate))
        })
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn successful_command_reports_duration() {
        let cmd = ToolCommand::new("sh").args(["-c", "exit 0"]);
        let run = run_tool(&cmd, Some(Duration::from_secs(10)), None).expect("run");
        assert!(run.duration > Duration::ZERO);
        assert_eq!(run.peak_gpu_memory_mib, None);
    }

    #[test]
    fn nonzero_exit_carries_code_and_stderr() {
        let cmd = ToolCommand::new("sh").args(["-c", "echo bad header >&2; exit 3"]);
        match run_tool(&cmd, None, None) {
            Err(CodecError::Invocation {
                exit_code, stderr, ..
            }) => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr, "bad header");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn budget_kills_slow_tool() {
        let cmd = ToolCommand::new("sleep").arg("5");
        let started = Instant::now();
        let err = run_tool(&cmd, Some(Duration::from_millis(100)), None).unwrap_err();
        assert!(matches!(err, CodecError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn budget_kills_wrapper_children() {
        // The shell forks `sleep` and waits on it; both must die on timeout.
        let cmd = ToolCommand::new("sh").args(["-c", "sleep 4; true"]);
        let started = Instant::now();
        let err = run_tool(&cmd, Some(Duration::from_millis(200)), None).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));
        match err {
            CodecError::Timeout { budget, .. } => {
                assert_eq!(budget, Duration::from_millis(200));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn timeout_message_keeps_subsecond_budget() {
        let err = CodecError::Timeout {
            tool: "sh".to_string(),
            budget: Duration::from_millis(200),
        };
        assert_eq!(err.to_string(), "codec tool 'sh' exceeded 200ms budget");
    }

    #[test]
    fn missing_binary_is_not_found() {
        let cmd = ToolCommand::new("/nonexistent/codec-tool");
        let err = run_tool(&cmd, None, None).unwrap_err();
        assert!(matches!(err, CodecError::NotFound { .. }));
    }

    #[test]
    fn stderr_tail_keeps_the_end() {
        let long = vec![b'x'; STDERR_TAIL_BYTES + 100];
        assert_eq!(stderr_tail(&long).len(), STDERR_TAIL_BYTES);
        assert_eq!(stderr_tail(b"  oops \n"), "oops");
    }

    #[test]
    fn binary_lookup() {
        assert!(binary_available("sh"));
        assert!(!binary_available("definitely-not-a-real-codec-binary"));
        assert!(!binary_available(""));
        assert!(binary_available("/bin/sh"));
    }
}
