//! `dts-util install` — download the server and set it up as a login service.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::app::{AppContext, Prompt};
use crate::command_runner::TokioCommandRunner;
use crate::config::{self, DEFAULT_ADDRESS, DEFAULT_GPU, DEFAULT_PORT, ServerConfig};
use crate::error::LifecycleError;
use crate::fetch::GithubFetcher;
use crate::install_dir::InstallationResolver;
use crate::orchestrator::{Orchestrator, Outcome};
use crate::probe::{NetPortProbe, PgrepProcessProbe};
use crate::service::LaunchdRegistry;

/// Arguments for the install command.
#[derive(Args)]
pub struct InstallArgs {
    /// Custom path to store models (default: Draw Things app models directory)
    #[arg(short = 'm', long, env = "DRAW_THINGS_MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Server name in local network (default: machine name)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Port to run the server on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind to
    #[arg(short, long, default_value = DEFAULT_ADDRESS)]
    pub address: String,

    /// GPU index to use
    #[arg(short, long, default_value_t = DEFAULT_GPU)]
    pub gpu: u32,

    /// Datadog API key for the logging backend
    #[arg(short, long)]
    pub datadog_api_key: Option<String>,

    /// Shared secret for server security
    #[arg(short, long)]
    pub shared_secret: Option<String>,

    /// Disable TLS for connections (not recommended)
    #[arg(long)]
    pub no_tls: bool,

    /// Disable response compression
    #[arg(long)]
    pub no_response_compression: bool,

    /// Enable model browsing
    #[arg(long)]
    pub model_browser: bool,

    /// Disable Flash Attention
    #[arg(long)]
    pub no_flash_attention: bool,

    /// Enable verbose model inference logging
    #[arg(long)]
    pub debug: bool,

    /// JSON configuration for proxy setup, e.g.
    /// '{"host":"proxy.local","port":7859}'
    #[arg(long)]
    pub join: Option<String>,
}

/// Run `dts-util install`.
///
/// # Errors
///
/// Returns an error for invalid configuration, an occupied port, download or
/// activation failure. A user-declined prompt is not an error.
pub async fn run(args: &InstallArgs, app: &AppContext) -> Result<()> {
    let runner = TokioCommandRunner::default();

    // Validate the join configuration before touching anything.
    if let Some(join) = &args.join {
        config::parse_join_config(join)?;
    }

    if args.no_tls && !app.non_interactive {
        app.output
            .warn("--no-tls disables encryption. Use only in trusted networks!");
        if !app.confirm("Are you sure you want to continue?", false)? {
            app.output.info("Installation cancelled.");
            return Ok(());
        }
    }

    let model_path = resolve_model_path(args.model_path.clone(), app)?;
    let default_name = config::default_server_name(&runner).await;
    let config = ServerConfig {
        name: args.name.clone().filter(|name| *name != default_name),
        port: args.port,
        address: args.address.clone(),
        gpu: args.gpu,
        model_path,
        datadog_api_key: args.datadog_api_key.clone(),
        shared_secret: args.shared_secret.clone(),
        no_tls: args.no_tls,
        no_response_compression: args.no_response_compression,
        model_browser: args.model_browser,
        no_flash_attention: args.no_flash_attention,
        debug: args.debug,
        join: args.join.clone(),
    };
    config.validate()?;

    let registry = LaunchdRegistry::new(runner)?;
    let ports = NetPortProbe::new(runner);
    let processes = PgrepProcessProbe::new(runner);
    let fetcher = GithubFetcher;
    let resolver = InstallationResolver::new()?;
    let orchestrator =
        Orchestrator::new(&registry, &processes, &ports, &fetcher, app, &app.output);

    if let Outcome::Aborted(reason) = orchestrator.install(&config, &resolver).await? {
        app.output.info(&format!("Installation cancelled ({reason})."));
    }
    Ok(())
}

/// The models directory: explicit flag, else the Draw Things app directory
/// when it exists, else an interactive prompt (fatal in quiet mode).
fn resolve_model_path(explicit: Option<PathBuf>, app: &AppContext) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let default = config::default_model_path();
    if let Some(path) = &default
        && path.exists()
    {
        return Ok(path.clone());
    }
    if let Some(path) = &default {
        app.output
            .warn(&format!("Default model path not found: {}", path.display()));
        app.output
            .info("You can specify a custom model path with: dts-util install -m /path/to/models");
    }
    loop {
        let Some(path) = app.input_path("Path for models")? else {
            return Err(LifecycleError::Validation(
                "model path required; pass --model-path".into(),
            )
            .into());
        };
        if path.exists() {
            return Ok(path);
        }
        app.output.error("Path does not exist. Please try again.");
    }
}
