//! TCP port occupancy checks.

use std::net::TcpStream;
use std::time::Duration;

use crate::command_runner::CommandRunner;

/// Timeout for the probe connect; bounds worst-case latency of a check.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Port occupancy probe, abstracted for test doubles.
#[allow(async_fn_in_trait)]
pub trait PortProbe {
    /// Check whether `localhost:port` has no listener.
    ///
    /// Deliberately optimistic: any connect failure (refused, timeout,
    /// resolution error) reads as "free".
    async fn is_free(&self, port: u16) -> bool;

    /// Best-effort description of the process owning the port. `None` when
    /// the inspection tool is unavailable or reports nothing.
    async fn describe_owner(&self, port: u16) -> Option<String>;
}

/// Production probe — direct TCP connect plus `lsof` for owner details.
pub struct NetPortProbe<R> {
    runner: R,
}

impl<R> NetPortProbe<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> PortProbe for NetPortProbe<R> {
    async fn is_free(&self, port: u16) -> bool {
        let result = tokio::task::spawn_blocking(move || {
            let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
            TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok()
        })
        .await;
        match result {
            Ok(occupied) => !occupied,
            Err(_) => true,
        }
    }

    async fn describe_owner(&self, port: u16) -> Option<String> {
        let output = self
            .runner
            .run("lsof", &["-i", &format!(":{port}")])
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let listing = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!listing.is_empty()).then_some(listing)
    }
}

/// Fixed-answer probe double for tests.
#[cfg(test)]
pub mod test_helpers {
    use super::PortProbe;

    /// Probe that always reports the same occupancy and owner.
    pub struct StaticPortProbe {
        /// Answer for `is_free`.
        pub free: bool,
        /// Answer for `describe_owner`.
        pub owner: Option<String>,
    }

    impl PortProbe for StaticPortProbe {
        async fn is_free(&self, _port: u16) -> bool {
            self.free
        }

        async fn describe_owner(&self, _port: u16) -> Option<String> {
            self.owner.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_runner::test_helpers::StubRunner;

    #[tokio::test]
    async fn is_free_false_for_bound_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let probe = NetPortProbe::new(StubRunner::failing());
        assert!(!probe.is_free(port).await, "bound port must read occupied");
    }

    #[tokio::test]
    async fn is_free_true_for_unbound_port() {
        // Bind to get an OS-assigned free port, then release it.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let probe = NetPortProbe::new(StubRunner::failing());
        assert!(probe.is_free(port).await);
    }

    #[tokio::test]
    async fn describe_owner_none_when_tool_fails() {
        let probe = NetPortProbe::new(StubRunner::failing());
        assert!(probe.describe_owner(7859).await.is_none());
    }

    #[tokio::test]
    async fn describe_owner_returns_listing() {
        let probe = NetPortProbe::new(StubRunner::succeeding(
            "COMMAND  PID USER\ngRPCServe 42 me (LISTEN)",
        ));
        let owner = probe.describe_owner(7859).await.expect("owner info");
        assert!(owner.contains("gRPCServe"));
    }

    #[tokio::test]
    async fn describe_owner_none_for_empty_listing() {
        let probe = NetPortProbe::new(StubRunner::succeeding(""));
        assert!(probe.describe_owner(7859).await.is_none());
    }
}
