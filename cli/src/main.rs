//! dts-util - Draw Things gRPC server installer

use clap::Parser;

use dts_util::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = cli.run().await {
        eprintln!("Error: {e:#}");
        eprintln!("For usage information, run: dts-util --help");
        std::process::exit(1);
    }
}
