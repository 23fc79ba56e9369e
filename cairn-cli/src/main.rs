use clap::Parser;

use cairn_cli::cli::Cli;
use cairn_cli::error::CliError;
use cairn_core::config::{CairnConfig, GeneralConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = CairnConfig::load(&cli.config).await.map_err(CliError::from);

    let mut general = config
        .as_ref()
        .map(|c| c.general.clone())
        .unwrap_or_else(|_| GeneralConfig::default());
    if let Some(level) = &cli.log_level {
        general.log_level = level.clone();
    }
    if let Err(e) = cairn_cli::logging::init_tracing(&general) {
        eprintln!("warning: {e:#}");
    }

    tracing::debug!(config = %cli.config.display(), "cairn starting");

    if let Err(e) = cairn_cli::run(cli, config).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}
