//! Lifecycle orchestration — install, uninstall, restart, status.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::app::Prompt;
use crate::config::{BINARY_NAME, DEFAULT_PORT, PROCESS_PATTERN, ServerConfig};
use crate::conflict::{self, Resolution};
use crate::error::LifecycleError;
use crate::fetch::BinaryFetcher;
use crate::install_dir::InstallationResolver;
use crate::output::{OutputContext, progress};
use crate::probe::{PortProbe, ProcessProbe};
use crate::service::{SERVICE_LABEL, ServiceDescriptor, ServiceRegistry};

/// Settle delay after stopping services or processes.
const SETTLE_AFTER_STOP: Duration = Duration::from_secs(1);
/// Settle delay after activating the service, before verification.
const SETTLE_AFTER_START: Duration = Duration::from_secs(2);
/// lsof truncates command names to nine characters.
const LSOF_COMMAND_TAG: &str = "gRPCServe";

/// Result of a lifecycle operation. Fatal failures are reported as errors
/// (`LifecycleError`), not outcomes.
#[derive(Debug)]
pub enum Outcome {
    /// The service was installed and activated. `verified` is `false` when
    /// post-install verification could not confirm a listener; the service
    /// may still be starting, so this is not a failure.
    Installed {
        /// Descriptor handed to the service manager.
        descriptor: ServiceDescriptor,
        /// Path of the written service definition.
        service_path: PathBuf,
        /// Whether the server was confirmed listening.
        verified: bool,
    },
    /// Status confirmed a running, listening server.
    AlreadyRunning,
    /// Uninstall swept everything it could reach.
    Uninstalled,
    /// The service was deactivated and reactivated.
    Restarted,
    /// The user declined a confirmation gate.
    Aborted(String),
}

/// Top-level lifecycle state machine. Composes the probes, the registry,
/// and the injected fetch and confirm collaborators; owns no state beyond
/// the settle delays.
pub struct Orchestrator<'a, S, P, Po, F, C> {
    registry: &'a S,
    processes: &'a P,
    ports: &'a Po,
    fetcher: &'a F,
    prompt: &'a C,
    output: &'a OutputContext,
    /// Delay after stop-style operations; shortened in tests.
    pub settle_after_stop: Duration,
    /// Delay after activation, before verification; shortened in tests.
    pub settle_after_start: Duration,
}

impl<'a, S, P, Po, F, C> Orchestrator<'a, S, P, Po, F, C>
where
    S: ServiceRegistry,
    P: ProcessProbe,
    Po: PortProbe,
    F: BinaryFetcher,
    C: Prompt,
{
    /// Build an orchestrator with production settle delays.
    pub fn new(
        registry: &'a S,
        processes: &'a P,
        ports: &'a Po,
        fetcher: &'a F,
        prompt: &'a C,
        output: &'a OutputContext,
    ) -> Self {
        Self {
            registry,
            processes,
            ports,
            fetcher,
            prompt,
            output,
            settle_after_stop: SETTLE_AFTER_STOP,
            settle_after_start: SETTLE_AFTER_START,
        }
    }

    /// Install the server binary and activate it as a supervised service.
    ///
    /// # Errors
    ///
    /// Returns `PortOccupied` before any mutation when the target port has a
    /// listener, `Download` on fetch failure, `ServiceWrite`/`Activation`
    /// when the service cannot be registered or started.
    pub async fn install(
        &self,
        config: &ServerConfig,
        resolver: &InstallationResolver,
    ) -> Result<Outcome> {
        config.validate()?;

        if !self.ports.is_free(config.port).await {
            self.output
                .error(&format!("Port {} is already in use!", config.port));
            if let Some(owner) = self.ports.describe_owner(config.port).await {
                self.output.error(&format!("Process using the port:\n{owner}"));
            }
            return Err(LifecycleError::PortOccupied(config.port).into());
        }

        let report = conflict::detect(self.registry, self.processes, self.ports).await;
        match conflict::resolve(&report, self.prompt, self.output)? {
            Resolution::Proceed => {}
            Resolution::UninstallFirst => {
                self.uninstall(resolver).await?;
                self.output.info("Continuing with fresh installation...");
            }
            Resolution::Abort => {
                return Ok(Outcome::Aborted("existing installation left in place".into()));
            }
        }

        let scratch = tempfile::tempdir().context("creating scratch directory")?;
        let staged = scratch.path().join(BINARY_NAME);
        let spinner = self
            .output
            .show_progress()
            .then(|| progress::spinner("Downloading gRPCServerCLI..."));
        let fetched = self.fetcher.fetch(&staged).await;
        match (&spinner, &fetched) {
            (Some(pb), Ok(())) => progress::finish_ok(pb, "Downloaded gRPCServerCLI"),
            (Some(pb), Err(_)) => pb.finish_and_clear(),
            (None, _) => {}
        }
        fetched?;

        let target = resolver.resolve(self.prompt, self.output)?;
        let dest = target.directory.join(BINARY_NAME);
        if dest.exists() {
            self.output
                .warn(&format!("Found existing {BINARY_NAME} at {}", dest.display()));
            if !self.prompt.confirm("Overwrite it?", true)? {
                return Ok(Outcome::Aborted("kept existing binary".into()));
            }
            self.stop_existing().await;
        }
        install_binary(&staged, &dest)?;

        let descriptor = ServiceDescriptor::for_server(config, &dest);
        let service_path = self.registry.write(&descriptor)?;
        self.registry.activate(&service_path).await?;
        self.output.success(&format!(
            "Service installed and started at {}",
            service_path.display()
        ));

        let summary = config.non_default_summary();
        if !summary.is_empty() {
            self.output.header("Server configuration:");
            for (key, value) in &summary {
                self.output.kv(key, value);
            }
        }

        self.output.info("Waiting for service to start...");
        tokio::time::sleep(self.settle_after_start).await;
        let verified = self.verify_running(config.port).await;
        if verified {
            self.output.success("Installation completed successfully!");
            self.output
                .kv("models", &config.model_path.display().to_string());
            self.output.kv("binary", &dest.display().to_string());
            self.output.info(
                "The gRPCServerCLI service is running and will start automatically on login.",
            );
            self.output.info(&format!(
                "Manage it with:\n    launchctl unload ~/Library/LaunchAgents/{SERVICE_LABEL}.plist\n    launchctl load ~/Library/LaunchAgents/{SERVICE_LABEL}.plist"
            ));
        } else {
            self.output
                .warn("Installation completed but the server may not be running correctly.");
            self.output.info(&format!(
                "Troubleshooting steps:\n1. Check the system log for errors:\n    log show --predicate 'process == \"{BINARY_NAME}\"' --last 5m\n2. Restart the service:\n    launchctl unload ~/Library/LaunchAgents/{SERVICE_LABEL}.plist\n    launchctl load ~/Library/LaunchAgents/{SERVICE_LABEL}.plist\n3. Check that the models directory is accessible:\n    ls {}",
                config.model_path.display()
            ));
        }

        Ok(Outcome::Installed {
            descriptor,
            service_path,
            verified,
        })
    }

    /// Remove the service, matching processes, and installed binaries.
    ///
    /// Always reports `Uninstalled`; every sub-step is best-effort so one
    /// failure never blocks the rest of the cleanup.
    ///
    /// # Errors
    ///
    /// Practically infallible; kept fallible for signature symmetry with
    /// the other operations.
    pub async fn uninstall(&self, resolver: &InstallationResolver) -> Result<Outcome> {
        self.output.header("Uninstalling gRPCServerCLI...");

        let mut service_files = self.registry.find_variants();
        if let Some(current) = self.registry.find()
            && !service_files.contains(&current)
        {
            service_files.push(current);
        }
        for path in service_files {
            self.output
                .info(&format!("Stopping and removing service {}", path.display()));
            if let Err(e) = self.registry.deactivate(&path).await {
                self.output.warn(&format!("Failed to stop service: {e}"));
            }
            let label = path
                .file_stem()
                .map_or_else(|| SERVICE_LABEL.to_string(), |s| s.to_string_lossy().into_owned());
            self.registry.forget(&label).await;
            if let Err(e) = self.registry.remove(&path) {
                self.output
                    .warn(&format!("Failed to remove service file: {e}"));
            }
        }

        self.processes.terminate(PROCESS_PATTERN).await;
        tokio::time::sleep(self.settle_after_stop).await;

        for dir in resolver.known_directories() {
            let binary = dir.join(BINARY_NAME);
            if binary.exists() {
                self.output
                    .info(&format!("Removing binary from {}", binary.display()));
                if let Err(e) = std::fs::remove_file(&binary) {
                    self.output.warn(&format!(
                        "Failed to remove binary at {}: {e}",
                        binary.display()
                    ));
                }
            }
        }

        if !self.ports.is_free(DEFAULT_PORT).await {
            self.output.warn(&format!(
                "Port {DEFAULT_PORT} is still in use! Another service may be holding it."
            ));
        }

        self.output.success("Uninstall complete!");
        self.output.info("Note: the model directory was not removed.");
        Ok(Outcome::Uninstalled)
    }

    /// Deactivate and reactivate the installed service.
    ///
    /// # Errors
    ///
    /// Returns `NotInstalled` when no service file exists; restart never
    /// silently installs. Any service-manager failure at either step is
    /// fatal: the user expects a running service afterward.
    pub async fn restart(&self) -> Result<Outcome> {
        let Some(path) = self.registry.find() else {
            return Err(LifecycleError::NotInstalled.into());
        };
        self.output.info("Restarting gRPCServerCLI service...");
        self.registry
            .deactivate(&path)
            .await
            .map_err(|e| LifecycleError::Activation(format!("stopping service: {e}")))?;
        tokio::time::sleep(self.settle_after_stop).await;
        self.registry.activate(&path).await?;
        self.output.success("Service restarted successfully");
        Ok(Outcome::Restarted)
    }

    /// Check that the server process exists and is accepting connections.
    ///
    /// # Errors
    ///
    /// Returns `NotInstalled` when no server process exists, or a generic
    /// error when the process exists but nothing is listening on `port`.
    pub async fn status(&self, port: u16) -> Result<Outcome> {
        let matches = self.processes.find_running(BINARY_NAME).await;
        let Some(first) = matches.first() else {
            self.output.error(&format!("{BINARY_NAME} process not found"));
            return Err(LifecycleError::NotInstalled.into());
        };
        self.output
            .success(&format!("Found {BINARY_NAME} process (PID: {})", first.pid));

        tokio::time::sleep(self.settle_after_stop).await;
        if self.listening(port).await {
            self.output
                .success(&format!("Server is listening on port {port}"));
            Ok(Outcome::AlreadyRunning)
        } else {
            anyhow::bail!("server is not accepting connections on port {port}")
        }
    }

    /// Post-install verification: process existence plus a listener check.
    /// Never reports true based on process existence alone.
    async fn verify_running(&self, port: u16) -> bool {
        let matches = self.processes.find_running(BINARY_NAME).await;
        if matches.is_empty() {
            return false;
        }
        // Give the process a moment to start listening.
        tokio::time::sleep(self.settle_after_stop).await;
        self.listening(port).await
    }

    /// Listener check: prefer the port table, fall back to a direct connect.
    async fn listening(&self, port: u16) -> bool {
        if let Some(owner) = self.ports.describe_owner(port).await
            && owner.contains("LISTEN")
            && owner.contains(LSOF_COMMAND_TAG)
        {
            return true;
        }
        !self.ports.is_free(port).await
    }

    /// Stop the installed service and any matching processes before the
    /// binary is replaced. Best-effort.
    async fn stop_existing(&self) {
        if let Some(path) = self.registry.find() {
            self.output
                .info("Stopping existing service before updating binary...");
            if let Err(e) = self.registry.deactivate(&path).await {
                self.output.warn(&format!("Failed to stop service: {e}"));
            }
            self.registry.forget(SERVICE_LABEL).await;
        }
        self.processes.terminate(PROCESS_PATTERN).await;
        tokio::time::sleep(self.settle_after_stop).await;
    }
}

/// Move the staged binary into place and mark it executable.
fn install_binary(staged: &Path, dest: &Path) -> Result<()> {
    // Copy rather than rename: the scratch directory is usually on a
    // different filesystem than the install directory.
    std::fs::copy(staged, dest)
        .with_context(|| format!("installing binary to {}", dest.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dest, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("setting permissions on {}", dest.display()))?;
    }
    Ok(())
}
