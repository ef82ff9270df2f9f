//! habs - Sentinel-2 and meteo ingestion plus water-quality forecasts for reservoirs.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "habs",
    version,
    about = "Reservoir water-quality data toolkit"
)]
struct Cli {
    /// JSON configuration file; defaults apply to anything it leaves out
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: habs_cmd::Command,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = habs_cmd::Config::load(cli.config.as_deref())?;
    log::debug!("Using database {}", config.database.display());
    habs_cmd::run(cli.command, &config).await
}
