//! Integration tests for `cairn config` and topology commands.
//!
//! Tests load real TOML files from a temp dir and drive the command handlers.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use cairn_cli::cli::{Cli, OutputFormat};
use cairn_cli::commands::{config, policy, simulate, tree};
use cairn_cli::error::CliError;
use cairn_cli::output::OutputWriter;
use cairn_cli::topology::provision;
use cairn_core::config::CairnConfig;
use clap::Parser;

const EXAMPLE: &str = include_str!("../../cairn.toml.example");

fn write_config(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).expect("should write config");
    path
}

#[tokio::test]
async fn test_config_validate_example_file() {
    // Given: the shipped example configuration
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_config(&temp_dir, "cairn.toml", EXAMPLE);

    // When: loading it
    let result = CairnConfig::load(&path).await;

    // Then: it is valid and defines two composites
    let config = result.expect("example config should load");
    assert_eq!(config.composite.definitions.len(), 2);
    let report = config::validation_report(&path, Ok(config));
    assert!(report.valid);
    assert_eq!(report.composites, 2);
}

#[tokio::test]
async fn test_config_validate_malformed_toml() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_config(&temp_dir, "bad.toml", "[general\nlog_level = \"info\"\n");

    let report = config::validation_report(&path, CairnConfig::load(&path).await);

    assert!(!report.valid, "malformed TOML should be invalid");
    assert_eq!(report.errors.len(), 1);
}

#[tokio::test]
async fn test_config_validate_missing_file() {
    let path = Path::new("/nonexistent/cairn.toml");
    let err = CairnConfig::load(path).await.expect_err("missing file");
    let err = CliError::from(err);
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_config_validate_empty_file_uses_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_config(&temp_dir, "empty.toml", "");

    let config = CairnConfig::load(&path).await.expect("empty config is valid");
    assert_eq!(config.general.log_level, "info");
    assert!(config.composite.link_to_parent);
    assert!(config.composite.definitions.is_empty());
}

#[tokio::test]
async fn test_config_validate_parent_defined_later_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_config(
        &temp_dir,
        "order.toml",
        r#"
[[composite.definitions]]
name = "child"
parent = "parent"

[[composite.definitions]]
name = "parent"
"#,
    );

    let report = config::validation_report(&path, CairnConfig::load(&path).await);
    assert!(!report.valid);
    assert!(report.errors[0].contains("parent"));
}

#[tokio::test]
async fn test_config_command_validate_returns_config_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_config(&temp_dir, "bad.toml", "[general]\nlog_level = \"loud\"\n");
    let cli = Cli::try_parse_from([
        "cairn",
        "-c",
        path.to_str().expect("utf8 path"),
        "config",
        "validate",
    ])
    .expect("parse");

    let result = cairn_cli::run(cli, Err(CliError::Config("unused".to_owned()))).await;
    let err = result.expect_err("invalid log level");
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_run_topology_command_propagates_config_error() {
    let cli = Cli::try_parse_from(["cairn", "tree"]).expect("parse");
    let result = cairn_cli::run(cli, Err(CliError::Config("broken".to_owned()))).await;
    assert!(matches!(result, Err(CliError::Config(_))));
}

#[test]
fn test_example_topology_tree() {
    let config = CairnConfig::parse(EXAMPLE).expect("example parses");
    let topology = provision(&config, true).expect("provisioned");

    let report = tree::tree_report(&topology, true);
    let names: Vec<_> = report.nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, ["<root>", "com.acme.platform", "com.acme.tenant"]);
    assert_eq!(report.nodes[1].constituent_count, 2);
    assert_eq!(report.nodes[2].constituent_count, 1);
    assert!(report.nodes[1..]
        .iter()
        .all(|n| n.state.as_deref() == Some("active")));

    let writer = OutputWriter::new(OutputFormat::Json);
    let mut buf = Vec::new();
    writer.render_to(&report, &mut buf).expect("json render");
    let json: serde_json::Value = serde_json::from_slice(&buf).expect("valid json");
    assert_eq!(json["nodes"].as_array().map(Vec::len), Some(3));
}

#[test]
fn test_example_topology_policy() {
    let config = CairnConfig::parse(EXAMPLE).expect("example parses");
    let topology = provision(&config, false).expect("provisioned");

    let report = policy::policy_report(&topology, "com.acme.tenant", Some("com.acme.api"), "1.0")
        .expect("policy report");
    let check = report.check.expect("package check");
    assert!(check.imported);
    assert!(!check.exported);
    assert!(report.export_service.is_some());
}

#[test]
fn test_example_topology_simulate_platform() {
    let config = CairnConfig::parse(EXAMPLE).expect("example parses");
    let mut topology = provision(&config, true).expect("provisioned");

    let report = simulate::simulate_uninstall(&mut topology, "com.acme.platform")
        .expect("simulated");

    assert_eq!(
        report.removed_composites,
        ["com.acme.platform", "com.acme.tenant"]
    );
    assert_eq!(report.uninstalled.len(), 2, "api and impl uninstall cleanly");
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].module, "com.acme.tenant.web");
    assert_eq!(report.remaining_composites, 0);
    assert!(topology.host.tree().walk().len() == 1, "only the root node remains");
}
