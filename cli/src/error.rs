//! Fatal error kinds surfaced by lifecycle operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a lifecycle operation.
///
/// Best-effort sub-steps (stopping stale processes, removing legacy files,
/// PATH edits) never produce these; they print a warning and continue.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Malformed server configuration or `--join` JSON.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// The requested port already has a listener.
    #[error("port {0} is already in use")]
    PortOccupied(u16),

    /// The binary could not be downloaded.
    #[error("download failed: {0}")]
    Download(String),

    /// The service definition file could not be written.
    #[error("cannot write service file {}: {source}", path.display())]
    ServiceWrite {
        /// Path that failed to be created or written.
        path: PathBuf,
        /// Underlying filesystem error.
        source: std::io::Error,
    },

    /// The OS service manager refused to load the service.
    #[error("failed to start service: {0}")]
    Activation(String),

    /// Restart or status was requested but no service is installed.
    #[error("service not installed")]
    NotInstalled,
}
