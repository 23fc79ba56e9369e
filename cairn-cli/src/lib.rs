//! Cairn CLI library.
//!
//! The binary in `main.rs` is a thin wrapper: parse arguments, load configuration,
//! initialise logging and dispatch to [`commands`]. Everything else lives here so
//! it can be exercised from integration tests.
//!
//! - [`cli`]: clap argument definitions
//! - [`commands`]: one handler per subcommand
//! - [`topology`]: provisions configured composites into an in-memory runtime
//! - [`output`]: text / JSON rendering
//! - [`logging`]: tracing subscriber setup
//! - [`error`]: CLI errors and exit codes

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
pub mod topology;

use cairn_core::config::CairnConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

/// Dispatch a parsed command line.
///
/// `config` is only consulted by commands that build a topology; the `config`
/// subcommand reloads the file itself so it can report load failures.
pub async fn run(cli: Cli, config: Result<CairnConfig, CliError>) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
        Commands::Tree(args) => commands::tree::execute(args, &config?, &writer),
        Commands::Policy(args) => commands::policy::execute(args, &config?, &writer),
        Commands::Simulate(args) => commands::simulate::execute(args, &config?, &writer),
    }
}
