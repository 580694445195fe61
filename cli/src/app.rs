//! Application context — unified state passed to every command handler.

use std::path::PathBuf;

use anyhow::Result;

use crate::output::OutputContext;

/// Interactive prompting capability.
///
/// All user confirmation gates (conflict resolution, overwrite checks, the
/// PATH edit offer) go through this trait so the flows can be driven by
/// scripted answers in tests. Quiet mode answers every prompt with its
/// default.
pub trait Prompt {
    /// Ask the user a yes/no question.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;

    /// Ask the user for a filesystem path. Returns `None` when prompting is
    /// not possible (quiet mode).
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails.
    fn input_path(&self, prompt: &str) -> Result<Option<PathBuf>>;
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// When `true`, skip interactive prompts and use defaults.
    ///
    /// Set by `--quiet` / `-q`, or when the `CI` or `DTS_UTIL_YES`
    /// environment variables are present.
    pub non_interactive: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    #[must_use]
    pub fn new(no_color: bool, quiet: bool) -> Self {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("DTS_UTIL_YES").is_ok();
        Self {
            output: OutputContext::new(no_color, quiet),
            non_interactive: quiet || ci_env,
        }
    }
}

impl Prompt for AppContext {
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }

    fn input_path(&self, prompt: &str) -> Result<Option<PathBuf>> {
        if self.non_interactive {
            return Ok(None);
        }
        let raw: String = dialoguer::Input::new().with_prompt(prompt).interact_text()?;
        Ok(Some(PathBuf::from(raw.trim())))
    }
}
