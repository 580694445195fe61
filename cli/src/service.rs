//! Persistent service definitions — launchd LaunchAgent files and launchctl.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;

use crate::command_runner::{CommandRunner, summarize_output};
use crate::config::ServerConfig;
use crate::error::LifecycleError;

/// Stable identity of the managed service.
pub const SERVICE_LABEL: &str = "com.drawthings.grpcserver";

/// Filename patterns for every label the service has carried across
/// versions. Upgrades and uninstalls must check all of them so stale
/// registrations from renamed releases are caught.
const LEGACY_LABEL_PATTERNS: &[&str] = &[
    "com.drawthings.grpcserver*.plist",
    "com.draw-things.grpcserver*.plist",
    "*drawthings*grpc*.plist",
    "*draw-things*grpc*.plist",
];

/// How the OS service manager should launch and supervise the server.
/// One descriptor exists per managed service, keyed by `label`.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    /// Stable identity key.
    pub label: String,
    /// Executable path followed by the ordered argument vector.
    pub program_arguments: Vec<String>,
    /// Start the service at login.
    pub run_at_load: bool,
    /// Restart the service whenever it exits.
    pub keep_alive: bool,
}

impl ServiceDescriptor {
    /// Build the descriptor for the managed server from its configuration
    /// and installed binary path.
    #[must_use]
    pub fn for_server(config: &ServerConfig, binary: &Path) -> Self {
        Self {
            label: SERVICE_LABEL.to_string(),
            program_arguments: config.service_arguments(binary),
            run_at_load: true,
            keep_alive: true,
        }
    }

    /// Render the descriptor as a launchd property list.
    #[must_use]
    pub fn to_plist(&self) -> String {
        let args_xml = self
            .program_arguments
            .iter()
            .map(|arg| format!("    <string>{}</string>", xml_escape(arg)))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>
<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">
<plist version=\"1.0\">
<dict>
  <key>Label</key>
  <string>{label}</string>
  <key>ProgramArguments</key>
  <array>
{args_xml}
  </array>
  <key>RunAtLoad</key>
  <{run_at_load}/>
  <key>KeepAlive</key>
  <{keep_alive}/>
</dict>
</plist>
",
            label = xml_escape(&self.label),
            run_at_load = self.run_at_load,
            keep_alive = self.keep_alive,
        )
    }
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Locates, writes, and removes the persistent service definition, and
/// drives the OS service manager. Abstracted for test doubles.
#[allow(async_fn_in_trait)]
pub trait ServiceRegistry {
    /// Path of the current service definition, if installed.
    fn find(&self) -> Option<PathBuf>;

    /// All service files matching current or historical label patterns.
    fn find_variants(&self) -> Vec<PathBuf>;

    /// Serialize `descriptor` and return the written path.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::ServiceWrite` when the agents directory
    /// cannot be created or the file cannot be written.
    fn write(&self, descriptor: &ServiceDescriptor) -> Result<PathBuf>;

    /// Delete a service file. An already-absent file is success.
    ///
    /// # Errors
    ///
    /// Returns an error only when an existing file cannot be removed.
    fn remove(&self, path: &Path) -> Result<()>;

    /// Load the service into the OS service manager.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::Activation` on any manager failure;
    /// activation failures leave the system ambiguous and must surface.
    async fn activate(&self, path: &Path) -> Result<()>;

    /// Unload the service from the OS service manager.
    ///
    /// # Errors
    ///
    /// Returns the manager error; callers decide whether it is fatal
    /// (restart) or a warning (uninstall, where "already not loaded" is a
    /// common benign case).
    async fn deactivate(&self, path: &Path) -> Result<()>;

    /// Drop a label from the OS service manager. Best-effort.
    async fn forget(&self, label: &str);
}

/// Production registry — LaunchAgent files under `~/Library/LaunchAgents`,
/// driven through `launchctl`.
pub struct LaunchdRegistry<R> {
    agents_dir: PathBuf,
    runner: R,
}

impl<R> LaunchdRegistry<R> {
    /// Registry over the user's LaunchAgents directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new(runner: R) -> Result<Self> {
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(Self::with_dir(home.join("Library/LaunchAgents"), runner))
    }

    /// Registry over an explicit directory (used in tests).
    #[must_use]
    pub fn with_dir(agents_dir: PathBuf, runner: R) -> Self {
        Self { agents_dir, runner }
    }

    fn service_path(&self) -> PathBuf {
        self.agents_dir.join(format!("{SERVICE_LABEL}.plist"))
    }
}

impl<R: CommandRunner> ServiceRegistry for LaunchdRegistry<R> {
    fn find(&self) -> Option<PathBuf> {
        let path = self.service_path();
        path.exists().then_some(path)
    }

    fn find_variants(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.agents_dir) else {
            return Vec::new();
        };
        let mut matches: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(matches_any_label_pattern)
            })
            .collect();
        matches.sort();
        matches
    }

    fn write(&self, descriptor: &ServiceDescriptor) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.agents_dir).map_err(|source| {
            LifecycleError::ServiceWrite {
                path: self.agents_dir.clone(),
                source,
            }
        })?;
        let path = self.agents_dir.join(format!("{}.plist", descriptor.label));
        std::fs::write(&path, descriptor.to_plist()).map_err(|source| {
            LifecycleError::ServiceWrite {
                path: path.clone(),
                source,
            }
        })?;
        Ok(path)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("removing service file {}", path.display()))?;
        }
        Ok(())
    }

    async fn activate(&self, path: &Path) -> Result<()> {
        let output = self
            .runner
            .run("launchctl", &["load", &path.to_string_lossy()])
            .await
            .map_err(|e| LifecycleError::Activation(e.to_string()))?;
        if !output.status.success() {
            return Err(LifecycleError::Activation(summarize_output(&output)).into());
        }
        Ok(())
    }

    async fn deactivate(&self, path: &Path) -> Result<()> {
        let output = self
            .runner
            .run("launchctl", &["unload", &path.to_string_lossy()])
            .await
            .context("running launchctl unload")?;
        if !output.status.success() {
            anyhow::bail!("launchctl unload failed: {}", summarize_output(&output));
        }
        Ok(())
    }

    async fn forget(&self, label: &str) {
        let _ = self.runner.run("launchctl", &["remove", label]).await;
    }
}

/// Match a filename against one `*`-wildcard pattern.
fn matches_any_label_pattern(name: &str) -> bool {
    LEGACY_LABEL_PATTERNS
        .iter()
        .any(|pattern| wildcard_regex(pattern).is_match(name))
}

#[allow(clippy::expect_used)] // patterns are compile-time constants
fn wildcard_regex(pattern: &str) -> Regex {
    let escaped = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{escaped}$")).expect("valid wildcard pattern")
}
