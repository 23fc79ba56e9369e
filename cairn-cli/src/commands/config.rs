//! `cairn config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use cairn_core::config::CairnConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Load and validate the configuration file, reporting any errors.
///
/// # Errors
///
/// Returns `CliError::Config` if validation fails (parse errors, invalid values,
/// unknown parents, duplicate composite names).
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = validation_report(config_path, CairnConfig::load(config_path).await);
    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

/// Build a validation report from a load result.
pub fn validation_report(
    config_path: &Path,
    result: Result<CairnConfig, cairn_core::error::CairnError>,
) -> ConfigValidationReport {
    let source = config_path.display().to_string();
    match result {
        Ok(config) => ConfigValidationReport {
            source,
            valid: true,
            composites: config.composite.definitions.len(),
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source,
            valid: false,
            composites: 0,
            errors: vec![e.to_string()],
        },
    }
}

/// Display the effective configuration (file + env overrides + defaults).
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let config = CairnConfig::load(config_path).await?;
    let report = config_report(&config, config_path, section.as_deref())?;
    writer.render(&report)?;
    Ok(())
}

/// Serialise the whole configuration or one section of it.
pub fn config_report(
    config: &CairnConfig,
    config_path: &Path,
    section: Option<&str>,
) -> Result<ConfigReport, CliError> {
    let config_toml = match section {
        None => toml::to_string_pretty(config),
        Some("general") => toml::to_string_pretty(&config.general),
        Some("composite") => toml::to_string_pretty(&config.composite),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: general, composite)"
            )));
        }
    }
    .unwrap_or_else(|e| format!("(serialization error: {e})"));

    Ok(ConfigReport {
        source: config_path.display().to_string(),
        section: section.map(str::to_owned),
        config_toml,
    })
}

/// Configuration display report.
///
/// The `config_toml` field is skipped during JSON serialization (only used for text rendering).
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Serialized TOML configuration
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{section}]");
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;
        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    /// Configuration file path
    pub source: String,
    /// Whether the configuration is valid
    pub valid: bool,
    /// Number of composite definitions (0 when invalid)
    pub composites: usize,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
            writeln!(w, "  Composites: {}", self.composites)?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::error::{CairnError, ConfigError};

    #[test]
    fn test_validation_report_valid() {
        let config = CairnConfig::default();
        let report = validation_report(Path::new("cairn.toml"), Ok(config));
        assert!(report.valid);
        assert!(report.errors.is_empty());
        assert_eq!(report.composites, 0);
    }

    #[test]
    fn test_validation_report_invalid() {
        let err = CairnError::Config(ConfigError::ParseFailed {
            reason: "bad toml".to_owned(),
        });
        let report = validation_report(Path::new("cairn.toml"), Err(err));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("bad toml"));
    }

    #[test]
    fn test_config_report_sections() {
        let config = CairnConfig::default();
        let general = config_report(&config, Path::new("cairn.toml"), Some("general"))
            .expect("general section");
        assert!(general.config_toml.contains("log_level"));
        assert_eq!(general.section.as_deref(), Some("general"));

        let composite = config_report(&config, Path::new("cairn.toml"), Some("composite"))
            .expect("composite section");
        assert!(composite.config_toml.contains("link_to_parent"));
    }

    #[test]
    fn test_config_report_unknown_section() {
        let config = CairnConfig::default();
        let result = config_report(&config, Path::new("cairn.toml"), Some("ebpf"));
        assert!(matches!(result, Err(CliError::Command(_))));
    }

    #[test]
    fn test_config_report_json_skips_toml_body() {
        let report = ConfigReport {
            source: "cairn.toml".to_owned(),
            section: None,
            config_toml: "[general]".to_owned(),
        };
        let json = serde_json::to_value(&report).expect("serialize");
        assert!(json.get("config_toml").is_none());
        assert!(json.get("section").is_none());
    }

    #[test]
    fn test_validation_report_text_render() {
        colored::control::set_override(false);
        let report = ConfigValidationReport {
            source: "cairn.toml".to_owned(),
            valid: false,
            composites: 0,
            errors: vec!["invalid config value".to_owned()],
        };
        let mut buf = Vec::new();
        report.render_text(&mut buf).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("INVALID"));
        assert!(text.contains("Error: invalid config value"));
    }
}
