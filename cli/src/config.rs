//! Server configuration — defaults, validation, and the service argument vector.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::command_runner::CommandRunner;
use crate::error::LifecycleError;

/// Default port the server listens on.
pub const DEFAULT_PORT: u16 = 7859;
/// Default bind address.
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";
/// Default GPU index.
pub const DEFAULT_GPU: u32 = 0;
/// Name of the managed server binary.
pub const BINARY_NAME: &str = "gRPCServerCLI";
/// Substring pattern matching running server processes (current and
/// historical binary names all contain it).
pub const PROCESS_PATTERN: &str = "gRPCServer";

/// Proxy topology handed to the server via `--join`. Validated here,
/// interpreted only by the server itself.
#[derive(Debug, Deserialize)]
pub struct JoinConfig {
    /// Proxy server hostname.
    pub host: String,
    /// Proxy server port.
    pub port: i64,
    /// Optional list of GPU servers behind the proxy.
    pub servers: Option<Vec<JoinServer>>,
}

/// One GPU server entry in a join configuration.
#[derive(Debug, Deserialize)]
pub struct JoinServer {
    /// Server hostname.
    pub address: String,
    /// Server port.
    pub port: i64,
    /// Server priority (1=high, 2=low).
    pub priority: Option<i64>,
}

/// Parse and validate a `--join` configuration string.
///
/// # Errors
///
/// Returns `LifecycleError::Validation` when the string is not valid JSON,
/// not an object, missing `host`/`port`, or any field fails its constraint.
pub fn parse_join_config(raw: &str) -> Result<JoinConfig, LifecycleError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|_| LifecycleError::Validation("--join value must be valid JSON".into()))?;
    if !value.is_object() {
        return Err(LifecycleError::Validation(
            "join configuration must be a JSON object".into(),
        ));
    }
    let config: JoinConfig = serde_json::from_value(value).map_err(|e| {
        LifecycleError::Validation(format!("join configuration must include 'host' and 'port': {e}"))
    })?;
    if config.host.is_empty() {
        return Err(LifecycleError::Validation(
            "join host must be a non-empty string".into(),
        ));
    }
    if config.port < 1 {
        return Err(LifecycleError::Validation(
            "join port must be a positive integer".into(),
        ));
    }
    for server in config.servers.iter().flatten() {
        if server.address.is_empty() {
            return Err(LifecycleError::Validation(
                "join server address must be a non-empty string".into(),
            ));
        }
        if server.port < 1 {
            return Err(LifecycleError::Validation(
                "join server port must be a positive integer".into(),
            ));
        }
    }
    Ok(config)
}

/// Immutable server configuration, constructed once per invocation from
/// merged defaults and user input.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server name in the local network; `None` means the machine name.
    pub name: Option<String>,
    /// Port the server listens on.
    pub port: u16,
    /// Address the server binds to.
    pub address: String,
    /// GPU index the server uses.
    pub gpu: u32,
    /// Models directory handed to the server as its positional argument.
    pub model_path: PathBuf,
    /// Datadog API key for the logging backend.
    pub datadog_api_key: Option<String>,
    /// Shared secret for server security.
    pub shared_secret: Option<String>,
    /// Disable TLS for connections.
    pub no_tls: bool,
    /// Disable response compression.
    pub no_response_compression: bool,
    /// Enable model browsing.
    pub model_browser: bool,
    /// Disable Flash Attention.
    pub no_flash_attention: bool,
    /// Enable verbose model inference logging.
    pub debug: bool,
    /// Raw `--join` JSON, validated at construction and passed through verbatim.
    pub join: Option<String>,
}

impl ServerConfig {
    /// Validate the configuration. Runs before any mutation of the system.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::Validation` for a zero port or a malformed
    /// join configuration.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.port == 0 {
            return Err(LifecycleError::Validation(
                "port must be a positive integer".into(),
            ));
        }
        if let Some(raw) = &self.join {
            parse_join_config(raw)?;
        }
        Ok(())
    }

    /// Build the service program-argument vector: the binary, the models
    /// directory, then only the options whose values differ from the
    /// documented defaults.
    #[must_use]
    pub fn service_arguments(&self, binary: &Path) -> Vec<String> {
        let mut args = vec![
            binary.display().to_string(),
            self.model_path.display().to_string(),
        ];
        if let Some(name) = &self.name {
            args.push("--name".into());
            args.push(name.clone());
        }
        if self.port != DEFAULT_PORT {
            args.push("--port".into());
            args.push(self.port.to_string());
        }
        if self.address != DEFAULT_ADDRESS {
            args.push("--address".into());
            args.push(self.address.clone());
        }
        if self.gpu != DEFAULT_GPU {
            args.push("--gpu".into());
            args.push(self.gpu.to_string());
        }
        if let Some(key) = &self.datadog_api_key {
            args.push("--datadog-api-key".into());
            args.push(key.clone());
        }
        if let Some(secret) = &self.shared_secret {
            args.push("--shared-secret".into());
            args.push(secret.clone());
        }
        if self.no_tls {
            args.push("--no-tls".into());
        }
        if self.no_response_compression {
            args.push("--no-response-compression".into());
        }
        if self.model_browser {
            args.push("--model-browser".into());
        }
        if self.no_flash_attention {
            args.push("--no-flash-attention".into());
        }
        if self.debug {
            args.push("--debug".into());
        }
        if let Some(join) = &self.join {
            args.push("--join".into());
            args.push(join.clone());
        }
        args
    }

    /// Non-default settings as key/value pairs, for display after install.
    #[must_use]
    pub fn non_default_summary(&self) -> Vec<(&'static str, String)> {
        let mut summary = Vec::new();
        if let Some(name) = &self.name {
            summary.push(("name", name.clone()));
        }
        if self.port != DEFAULT_PORT {
            summary.push(("port", self.port.to_string()));
        }
        if self.address != DEFAULT_ADDRESS {
            summary.push(("address", self.address.clone()));
        }
        if self.gpu != DEFAULT_GPU {
            summary.push(("gpu", self.gpu.to_string()));
        }
        if self.datadog_api_key.is_some() {
            summary.push(("datadog-api-key", "set".into()));
        }
        if self.shared_secret.is_some() {
            summary.push(("shared-secret", "set".into()));
        }
        if self.no_tls {
            summary.push(("no-tls", "true".into()));
        }
        if self.no_response_compression {
            summary.push(("no-response-compression", "true".into()));
        }
        if self.model_browser {
            summary.push(("model-browser", "true".into()));
        }
        if self.no_flash_attention {
            summary.push(("no-flash-attention", "true".into()));
        }
        if self.debug {
            summary.push(("debug", "true".into()));
        }
        if let Some(join) = &self.join {
            summary.push(("join", join.clone()));
        }
        summary
    }
}

/// Machine name with a trailing `.local` stripped; `"draw-things"` when the
/// hostname cannot be determined.
pub async fn default_server_name(runner: &impl CommandRunner) -> String {
    let hostname = match runner.run("hostname", &[]).await {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        _ => String::new(),
    };
    let hostname = hostname
        .strip_suffix(".local")
        .unwrap_or(&hostname)
        .to_string();
    if hostname.is_empty() {
        "draw-things".to_string()
    } else {
        hostname
    }
}

/// The Draw Things app's models directory, if a home directory exists.
#[must_use]
pub fn default_model_path() -> Option<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join("Library/Containers/com.liuliu.draw-things/Data/Documents/Models"))
}
