//! `dts-util status` — verify the server is running and listening.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::command_runner::TokioCommandRunner;
use crate::config::DEFAULT_PORT;
use crate::fetch::GithubFetcher;
use crate::orchestrator::Orchestrator;
use crate::probe::{NetPortProbe, PgrepProcessProbe};
use crate::service::LaunchdRegistry;

/// Arguments for the status command.
#[derive(Args)]
pub struct StatusArgs {
    /// Port to check
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

/// Run `dts-util status`.
///
/// # Errors
///
/// Returns an error when no server process exists or nothing is listening on
/// the port; a running process alone never counts as healthy.
pub async fn run(args: &StatusArgs, app: &AppContext) -> Result<()> {
    let runner = TokioCommandRunner::default();
    let registry = LaunchdRegistry::new(runner)?;
    let ports = NetPortProbe::new(runner);
    let processes = PgrepProcessProbe::new(runner);
    let fetcher = GithubFetcher;
    let orchestrator =
        Orchestrator::new(&registry, &processes, &ports, &fetcher, app, &app.output);
    orchestrator.status(args.port).await?;
    app.output.success("Server is running and responding!");
    Ok(())
}
