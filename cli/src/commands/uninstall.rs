//! `dts-util uninstall` — remove the service, processes, and binaries.

use anyhow::Result;

use crate::app::AppContext;
use crate::command_runner::TokioCommandRunner;
use crate::fetch::GithubFetcher;
use crate::install_dir::InstallationResolver;
use crate::orchestrator::Orchestrator;
use crate::probe::{NetPortProbe, PgrepProcessProbe};
use crate::service::LaunchdRegistry;

/// Run `dts-util uninstall`.
///
/// Every sub-step is best-effort; the command reports success even under
/// partial failure so cleanup is maximally effective.
///
/// # Errors
///
/// Returns an error only when the environment is unusable (no home directory).
pub async fn run(app: &AppContext) -> Result<()> {
    let runner = TokioCommandRunner::default();
    let registry = LaunchdRegistry::new(runner)?;
    let ports = NetPortProbe::new(runner);
    let processes = PgrepProcessProbe::new(runner);
    let fetcher = GithubFetcher;
    let resolver = InstallationResolver::new()?;
    let orchestrator =
        Orchestrator::new(&registry, &processes, &ports, &fetcher, app, &app.output);
    orchestrator.uninstall(&resolver).await?;
    Ok(())
}
