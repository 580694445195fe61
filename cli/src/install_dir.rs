//! Install-directory resolution under write-permission constraints.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::app::Prompt;
use crate::output::OutputContext;

/// Where the binary will be installed. Computed fresh each run, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
    /// Directory the binary goes into.
    pub directory: PathBuf,
    /// Whether the preferred directory was rejected and the fallback chosen.
    pub fell_back: bool,
}

/// Chooses a writable install directory from an ordered preference list.
pub struct InstallationResolver {
    preferred: PathBuf,
    fallback: PathBuf,
}

impl InstallationResolver {
    /// Resolver over the standard locations: `/usr/local/bin`, falling back
    /// to `~/.local/bin`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(Self::with_dirs(
            PathBuf::from("/usr/local/bin"),
            home.join(".local/bin"),
        ))
    }

    /// Resolver over explicit directories (used in tests).
    #[must_use]
    pub fn with_dirs(preferred: PathBuf, fallback: PathBuf) -> Self {
        Self {
            preferred,
            fallback,
        }
    }

    /// Every directory the binary may have been installed into, preferred
    /// first. Uninstall sweeps all of them.
    #[must_use]
    pub fn known_directories(&self) -> [&Path; 2] {
        [&self.preferred, &self.fallback]
    }

    /// Pick the install directory: the preferred directory if it passes a
    /// write probe, otherwise the fallback (created if necessary).
    ///
    /// When falling back to a directory missing from `PATH`, offers to
    /// append an export line to the user's shell rc file; the edit's outcome
    /// is reported but never aborts the resolution.
    ///
    /// # Errors
    ///
    /// Returns an error only when the fallback directory cannot be created;
    /// there is then nowhere left to install.
    pub fn resolve(&self, prompt: &impl Prompt, output: &OutputContext) -> Result<InstallTarget> {
        if dir_writable(&self.preferred) {
            return Ok(InstallTarget {
                directory: self.preferred.clone(),
                fell_back: false,
            });
        }

        output.info(&format!(
            "Cannot write to {}, using {} instead",
            self.preferred.display(),
            self.fallback.display()
        ));
        std::fs::create_dir_all(&self.fallback)
            .with_context(|| format!("creating directory {}", self.fallback.display()))?;

        let path_var = std::env::var("PATH").unwrap_or_default();
        if !path_contains(&path_var, &self.fallback) {
            self.offer_path_export(prompt, output);
        }

        Ok(InstallTarget {
            directory: self.fallback.clone(),
            fell_back: true,
        })
    }

    fn offer_path_export(&self, prompt: &impl Prompt, output: &OutputContext) {
        let manual_line = format!("export PATH=\"{}:$PATH\"", self.fallback.display());
        let question = format!(
            "{} is not in your PATH. Add it to your shell configuration?",
            self.fallback.display()
        );
        match prompt.confirm(&question, false) {
            Ok(true) => {
                let Some(rc_file) = shell_rc_file() else {
                    output.warn(&format!(
                        "Cannot determine shell configuration file. Add this line manually:\n    {manual_line}"
                    ));
                    return;
                };
                match append_path_export(&rc_file, &self.fallback) {
                    Ok(()) => {
                        output.success(&format!(
                            "Added {} to PATH in {}",
                            self.fallback.display(),
                            rc_file.display()
                        ));
                        output.info(&format!(
                            "Restart your terminal or run: source {}",
                            rc_file.display()
                        ));
                    }
                    Err(e) => {
                        output.warn(&format!("Failed to modify {}: {e}", rc_file.display()));
                        output.info(&format!("Add this line manually:\n    {manual_line}"));
                    }
                }
            }
            Ok(false) => {
                output.info(&format!(
                    "To add it manually later, add this line to your shell configuration:\n    {manual_line}"
                ));
            }
            Err(e) => output.warn(&format!("Prompt failed: {e}")),
        }
    }
}

/// Write probe: create the directory if absent, then create and delete a
/// sentinel file. Any permission or OS error reads as "not writable".
fn dir_writable(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let sentinel = dir.join(".write_test");
    match std::fs::File::create(&sentinel) {
        Ok(_) => {
            let _ = std::fs::remove_file(&sentinel);
            true
        }
        Err(_) => false,
    }
}

/// Check whether `dir` appears in a `PATH`-style variable.
fn path_contains(path_var: &str, dir: &Path) -> bool {
    std::env::split_paths(path_var).any(|entry| entry == dir)
}

/// The rc file for the user's login shell: `.zshrc` for zsh, `.bash_profile`
/// otherwise.
fn shell_rc_file() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(rc_file_for_shell(
        &std::env::var("SHELL").unwrap_or_default(),
        &home,
    ))
}

fn rc_file_for_shell(shell: &str, home: &Path) -> PathBuf {
    if shell.contains("zsh") {
        home.join(".zshrc")
    } else {
        home.join(".bash_profile")
    }
}

fn append_path_export(rc_file: &Path, dir: &Path) -> Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(rc_file)
        .with_context(|| format!("opening {}", rc_file.display()))?;
    writeln!(
        file,
        "\nexport PATH=\"{}:$PATH\"  # Added by Draw Things installer",
        dir.display()
    )
    .with_context(|| format!("writing {}", rc_file.display()))?;
    Ok(())
}
