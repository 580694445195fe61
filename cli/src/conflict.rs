//! Pre-install conflict detection and resolution.

use std::path::PathBuf;

use anyhow::Result;

use crate::app::Prompt;
use crate::config::{DEFAULT_PORT, PROCESS_PATTERN};
use crate::output::OutputContext;
use crate::probe::{PortProbe, ProcessMatch, ProcessProbe};
use crate::service::ServiceRegistry;

/// Everything that points at a pre-existing installation. Ephemeral,
/// produced once per run.
#[derive(Debug, Default)]
pub struct ConflictReport {
    /// Service definition files matching any known label pattern.
    pub service_files: Vec<PathBuf>,
    /// Running server processes.
    pub running_processes: Vec<ProcessMatch>,
    /// Whether the default port already has a listener.
    pub port_in_use: bool,
    /// Best-effort description of the process owning the port.
    pub port_owner: Option<String>,
}

impl ConflictReport {
    /// `true` when nothing points at an existing installation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.service_files.is_empty() && self.running_processes.is_empty() && !self.port_in_use
    }
}

/// What the user (or quiet-mode policy) decided to do about a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// No conflict, or the user chose to proceed anyway.
    Proceed,
    /// Uninstall the existing installation, then proceed.
    UninstallFirst,
    /// Leave everything as it is.
    Abort,
}

/// Aggregate service files, running processes, and default-port occupancy.
pub async fn detect(
    registry: &impl ServiceRegistry,
    processes: &impl ProcessProbe,
    ports: &impl PortProbe,
) -> ConflictReport {
    let service_files = registry.find_variants();
    let running_processes = processes.find_running(PROCESS_PATTERN).await;
    let port_in_use = !ports.is_free(DEFAULT_PORT).await;
    let port_owner = if port_in_use {
        ports.describe_owner(DEFAULT_PORT).await
    } else {
        None
    };
    ConflictReport {
        service_files,
        running_processes,
        port_in_use,
        port_owner,
    }
}

/// Decide what to do about a conflict report.
///
/// An empty report proceeds immediately without prompting. Otherwise the
/// first prompt defaults to "yes, uninstall" (so quiet mode uninstalls and
/// proceeds); declining leads to a second prompt defaulting to "no". An
/// accidental Enter press must not leave two service instances racing for
/// the same port.
///
/// # Errors
///
/// Returns an error if a terminal prompt fails.
pub fn resolve(
    report: &ConflictReport,
    prompt: &impl Prompt,
    output: &OutputContext,
) -> Result<Resolution> {
    if report.is_empty() {
        return Ok(Resolution::Proceed);
    }

    output.warn("Found an existing Draw Things gRPC installation:");
    for file in &report.service_files {
        output.kv("service", &file.display().to_string());
    }
    for process in &report.running_processes {
        output.kv("process", &format!("{} {}", process.pid, process.command));
    }
    if report.port_in_use {
        output.kv("port", &format!("{DEFAULT_PORT} is already in use"));
        if let Some(owner) = &report.port_owner {
            output.kv("owner", owner);
        }
    }

    output.info("It's recommended to uninstall before proceeding.");
    if prompt.confirm("Uninstall the existing installation now?", true)? {
        return Ok(Resolution::UninstallFirst);
    }
    if prompt.confirm(
        "Proceed without uninstalling? This might cause issues.",
        false,
    )? {
        return Ok(Resolution::Proceed);
    }
    Ok(Resolution::Abort)
}
