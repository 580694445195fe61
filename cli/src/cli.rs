//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::AppContext;
use crate::commands;

/// Draw Things gRPC server installer
#[derive(Parser)]
#[command(
    name = "dts-util",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Minimize output and assume default answers to prompts
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Download gRPCServerCLI and set it up as a login service
    Install(commands::install::InstallArgs),

    /// Stop the service and remove all installed files
    Uninstall,

    /// Restart the gRPCServerCLI service
    Restart,

    /// Check that the server is running and listening
    Status(commands::status::StatusArgs),
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            quiet,
            no_color,
            command,
        } = self;
        let app = AppContext::new(no_color, quiet);
        match command {
            Command::Install(args) => commands::install::run(&args, &app).await,
            Command::Uninstall => commands::uninstall::run(&app).await,
            Command::Restart => commands::restart::run(&app).await,
            Command::Status(args) => commands::status::run(&args, &app).await,
        }
    }
}
