//! Running-process discovery and best-effort termination.

use crate::command_runner::CommandRunner;

/// One matching process from the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessMatch {
    /// Process ID.
    pub pid: u32,
    /// Full command line as reported by the process table.
    pub command: String,
}

/// Process-table probe, abstracted for test doubles.
#[allow(async_fn_in_trait)]
pub trait ProcessProbe {
    /// Find running processes whose command line contains `pattern`.
    ///
    /// Returns an empty list (never an error) when nothing matches or the
    /// process-table tool is unavailable.
    async fn find_running(&self, pattern: &str) -> Vec<ProcessMatch>;

    /// Signal all processes matching `pattern`. Best-effort: termination is
    /// not verified; callers must re-probe if they need confirmation.
    async fn terminate(&self, pattern: &str);
}

/// Production probe — shells to `pgrep`/`pkill`.
pub struct PgrepProcessProbe<R> {
    runner: R,
}

impl<R> PgrepProcessProbe<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> ProcessProbe for PgrepProcessProbe<R> {
    async fn find_running(&self, pattern: &str) -> Vec<ProcessMatch> {
        let Ok(output) = self.runner.run("pgrep", &["-fl", pattern]).await else {
            return Vec::new();
        };
        if !output.status.success() {
            return Vec::new();
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(parse_pgrep_line)
            .collect()
    }

    async fn terminate(&self, pattern: &str) {
        let _ = self.runner.run("pkill", &["-f", pattern]).await;
    }
}

/// Parse one `pgrep -fl` output line (`<pid> <command line>`).
fn parse_pgrep_line(line: &str) -> Option<ProcessMatch> {
    let line = line.trim();
    let (pid, command) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    Some(ProcessMatch {
        pid: pid.parse().ok()?,
        command: command.trim().to_string(),
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_runner::test_helpers::StubRunner;

    #[tokio::test]
    async fn find_running_parses_pid_and_command() {
        let probe = PgrepProcessProbe::new(StubRunner::succeeding(
            "412 /usr/local/bin/gRPCServerCLI /models\n987 gRPCServerCLI --port 7860\n",
        ));
        let matches = probe.find_running("gRPCServer").await;
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].pid, 412);
        assert_eq!(matches[0].command, "/usr/local/bin/gRPCServerCLI /models");
        assert_eq!(matches[1].pid, 987);
    }

    #[tokio::test]
    async fn find_running_empty_when_no_match() {
        // pgrep exits 1 when nothing matches
        let probe = PgrepProcessProbe::new(StubRunner::failing());
        assert!(probe.find_running("gRPCServer").await.is_empty());
    }

    #[tokio::test]
    async fn find_running_empty_when_tool_unavailable() {
        let probe = PgrepProcessProbe::new(StubRunner::unavailable());
        assert!(probe.find_running("gRPCServer").await.is_empty());
    }

    #[tokio::test]
    async fn find_running_skips_garbage_lines() {
        let probe = PgrepProcessProbe::new(StubRunner::succeeding("notapid something\n55 ok\n"));
        let matches = probe.find_running("x").await;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pid, 55);
    }

    #[tokio::test]
    async fn terminate_swallows_tool_failure() {
        let probe = PgrepProcessProbe::new(StubRunner::unavailable());
        probe.terminate("gRPCServer").await;
    }
}
