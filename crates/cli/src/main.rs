use clap::Parser;
use std::path::PathBuf;

mod commands;

use commands::Commands;

#[derive(Parser)]
#[command(name = "shmcache")]
#[command(about = "Inspect and manage shared cache lock tables", long_about = None)]
#[command(version)]
struct Cli {
    /// Lock table file (overrides SHMCACHE_TABLE_PATH and the config file)
    #[arg(long, global = true)]
    path: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    shmcache_utils::tracing::init()
        .map_err(|e| eyre::eyre!("failed to initialize tracing: {e}"))?;

    let cli = Cli::parse();
    let config = commands::resolve_config(cli.config.as_deref(), cli.path)?;
    cli.command.execute(config)
}
