//! CLI argument parsing using clap derive API
//!
//! Purely declarative; no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Cairn -- nested, policy-scoped module composites.
///
/// Use `cairn <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "cairn", version, about, long_about = None)]
pub struct Cli {
    /// Path to the cairn.toml configuration file.
    #[arg(short, long, default_value = "cairn.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage configuration.
    Config(ConfigArgs),

    /// Install the configured composites and print the sharing-policy tree.
    Tree(TreeArgs),

    /// Show the sharing policy of one composite and optionally test a package against it.
    Policy(PolicyArgs),

    /// Install the configured composites, then uninstall one and report the cascade.
    Simulate(SimulateArgs),
}

// ---- config ----

/// Manage cairn configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, composite).
        #[arg(long)]
        section: Option<String>,
    },
}

// ---- tree ----

/// Print the sharing-policy tree.
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Start every composite after installing it.
    #[arg(long)]
    pub start: bool,

    /// Include constituent modules under each composite.
    #[arg(short, long)]
    pub verbose: bool,
}

// ---- policy ----

/// Inspect one composite's sharing policy.
#[derive(Args, Debug)]
pub struct PolicyArgs {
    /// Symbolic name of the composite.
    pub name: String,

    /// Package to test against the import and export policies.
    #[arg(long)]
    pub package: Option<String>,

    /// Package version used for the test.
    #[arg(long, default_value = "0.0.0")]
    pub version: String,
}

// ---- simulate ----

/// Uninstall a composite and report the cascade.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Symbolic name of the composite to uninstall.
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_config_validate() {
        let cli = Cli::try_parse_from(["cairn", "config", "validate"]).expect("parse succeeded");
        match cli.command {
            Commands::Config(args) => assert!(matches!(args.action, ConfigAction::Validate)),
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_config_show_section() {
        let cli = Cli::try_parse_from(["cairn", "config", "show", "--section", "composite"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Config(args) => match args.action {
                ConfigAction::Show { section } => {
                    assert_eq!(section, Some("composite".to_owned()));
                }
                _ => panic!("expected Show action"),
            },
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_tree_flags() {
        let cli = Cli::try_parse_from(["cairn", "tree", "--start", "-v"]).expect("parse succeeded");
        match cli.command {
            Commands::Tree(args) => {
                assert!(args.start);
                assert!(args.verbose);
            }
            _ => panic!("expected Tree command"),
        }
    }

    #[test]
    fn test_cli_parse_policy_defaults() {
        let cli = Cli::try_parse_from(["cairn", "policy", "com.acme.platform"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Policy(args) => {
                assert_eq!(args.name, "com.acme.platform");
                assert!(args.package.is_none());
                assert_eq!(args.version, "0.0.0");
            }
            _ => panic!("expected Policy command"),
        }
    }

    #[test]
    fn test_cli_parse_policy_with_package() {
        let cli = Cli::try_parse_from([
            "cairn",
            "policy",
            "com.acme.platform",
            "--package",
            "com.acme.util",
            "--version",
            "1.2",
        ])
        .expect("parse succeeded");
        match cli.command {
            Commands::Policy(args) => {
                assert_eq!(args.package.as_deref(), Some("com.acme.util"));
                assert_eq!(args.version, "1.2");
            }
            _ => panic!("expected Policy command"),
        }
    }

    #[test]
    fn test_cli_parse_simulate() {
        let cli = Cli::try_parse_from(["cairn", "simulate", "com.acme.tenant"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Simulate(args) => assert_eq!(args.name, "com.acme.tenant"),
            _ => panic!("expected Simulate command"),
        }
    }

    #[test]
    fn test_cli_parse_simulate_requires_name() {
        assert!(Cli::try_parse_from(["cairn", "simulate"]).is_err());
    }

    #[test]
    fn test_cli_parse_global_flags() {
        let cli = Cli::try_parse_from([
            "cairn",
            "-c",
            "/etc/cairn/cairn.toml",
            "tree",
            "--log-level",
            "debug",
            "--output",
            "json",
        ])
        .expect("parse succeeded");
        assert_eq!(cli.config, PathBuf::from("/etc/cairn/cairn.toml"));
        assert_eq!(cli.log_level, Some("debug".to_owned()));
        assert!(matches!(cli.output, OutputFormat::Json));
    }

    #[test]
    fn test_cli_parse_missing_command_fails() {
        assert!(Cli::try_parse_from(["cairn"]).is_err());
    }

    #[test]
    fn test_cli_verify_command_structure() {
        let cmd = Cli::command();
        assert_eq!(cmd.get_name(), "cairn");
        let subcommands: Vec<_> = cmd.get_subcommands().map(|s| s.get_name()).collect();
        for expected in ["config", "tree", "policy", "simulate"] {
            assert!(
                subcommands.contains(&expected),
                "should have '{expected}' subcommand"
            );
        }
    }
}
