//! `dts-util restart` — deactivate and reactivate the installed service.

use anyhow::Result;

use crate::app::AppContext;
use crate::command_runner::TokioCommandRunner;
use crate::fetch::GithubFetcher;
use crate::orchestrator::Orchestrator;
use crate::probe::{NetPortProbe, PgrepProcessProbe};
use crate::service::LaunchdRegistry;

/// Run `dts-util restart`.
///
/// # Errors
///
/// Returns `NotInstalled` when no service file exists, or an activation
/// error when the service manager fails at either step.
pub async fn run(app: &AppContext) -> Result<()> {
    let runner = TokioCommandRunner::default();
    let registry = LaunchdRegistry::new(runner)?;
    let ports = NetPortProbe::new(runner);
    let processes = PgrepProcessProbe::new(runner);
    let fetcher = GithubFetcher;
    let orchestrator =
        Orchestrator::new(&registry, &processes, &ports, &fetcher, app, &app.output);
    orchestrator.restart().await?;
    Ok(())
}
