//! External process execution with timeout and guaranteed child kill.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;

/// Default timeout for shelled OS commands (launchctl, pgrep, lsof, etc.).
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Generic command execution with timeout and guaranteed process kill.
///
/// All OS shelling goes through this trait so the components built on top
/// (service registry, process probe, port probe) can be exercised with
/// canned results instead of real processes.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a command with the default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;

    /// Run a command with a custom timeout (overrides default).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
}

/// Production `CommandRunner` — uses tokio for async process execution
/// with guaranteed timeout and kill.
#[derive(Clone, Copy)]
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_CMD_TIMEOUT)
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        // Read stdout/stderr CONCURRENTLY with wait(): a child writing more
        // than the OS pipe buffer would otherwise block forever on write.
        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stdout_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stderr_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                );
                Ok(Output {
                    status: status.with_context(|| format!("waiting for {program}"))?,
                    stdout,
                    stderr,
                })
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
            }
        }
    }
}

/// Summarize a command's output for error messages: first non-empty stderr
/// line, falling back to stdout.
#[must_use]
pub fn summarize_output(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    stderr
        .lines()
        .chain(stdout.lines())
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no output")
        .to_string()
}

/// Shared test doubles — available to all modules via
/// `crate::command_runner::test_helpers`.
#[cfg(test)]
pub mod test_helpers {
    use std::cell::RefCell;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};
    use std::time::Duration;

    use anyhow::Result;

    use super::CommandRunner;

    enum StubResponse {
        Succeed(String),
        Fail,
        Unavailable,
    }

    /// Canned-output runner; records every invocation for assertions.
    pub struct StubRunner {
        response: StubResponse,
        calls: RefCell<Vec<String>>,
    }

    impl StubRunner {
        /// Every command exits 0 with the given stdout.
        pub fn succeeding(stdout: &str) -> Self {
            Self {
                response: StubResponse::Succeed(stdout.to_string()),
                calls: RefCell::new(Vec::new()),
            }
        }

        /// Every command exits nonzero with empty output.
        pub fn failing() -> Self {
            Self {
                response: StubResponse::Fail,
                calls: RefCell::new(Vec::new()),
            }
        }

        /// Every command fails to spawn, as if the tool were not installed.
        pub fn unavailable() -> Self {
            Self {
                response: StubResponse::Unavailable,
                calls: RefCell::new(Vec::new()),
            }
        }

        /// Commands recorded so far, as `"program arg1 arg2"` strings.
        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl CommandRunner for StubRunner {
        async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
            self.calls
                .borrow_mut()
                .push(format!("{program} {}", args.join(" ")).trim().to_string());
            match &self.response {
                StubResponse::Succeed(stdout) => Ok(Output {
                    status: ExitStatus::from_raw(0),
                    stdout: stdout.clone().into_bytes(),
                    stderr: Vec::new(),
                }),
                StubResponse::Fail => Ok(Output {
                    status: ExitStatus::from_raw(1 << 8),
                    stdout: Vec::new(),
                    stderr: b"stub failure".to_vec(),
                }),
                StubResponse::Unavailable => anyhow::bail!("failed to spawn {program}"),
            }
        }

        async fn run_with_timeout(
            &self,
            program: &str,
            args: &[&str],
            _timeout: Duration,
        ) -> Result<Output> {
            self.run(program, args).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_captures_stdout() {
        let runner = TokioCommandRunner::default();
        let output = runner.run("echo", &["hello"]).await.expect("echo runs");
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn run_fails_to_spawn_missing_program() {
        let runner = TokioCommandRunner::default();
        let result = runner.run("definitely-not-a-real-binary-xyz", &[]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn run_with_timeout_kills_slow_child() {
        let runner = TokioCommandRunner::default();
        let result = runner
            .run_with_timeout("sleep", &["10"], Duration::from_millis(100))
            .await;
        assert!(result.is_err(), "timed-out command must return Err");
    }

    #[cfg(unix)]
    #[test]
    fn summarize_output_prefers_stderr() {
        use std::os::unix::process::ExitStatusExt;
        let output = Output {
            status: std::process::ExitStatus::from_raw(0),
            stdout: b"stdout line\n".to_vec(),
            stderr: b"\nstderr line\n".to_vec(),
        };
        assert_eq!(summarize_output(&output), "stderr line");
    }
}
