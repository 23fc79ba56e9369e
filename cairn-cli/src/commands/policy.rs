//! `cairn policy` command handler

use std::io::Write;

use serde::Serialize;

use cairn_core::config::CairnConfig;
use cairn_core::error::CairnError;
use cairn_core::header::Version;
use cairn_core::types::ModuleId;

use crate::cli::PolicyArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};
use crate::topology::{Topology, provision};

/// Execute the `policy` command.
pub fn execute(
    args: PolicyArgs,
    config: &CairnConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let topology = provision(config, false)?;
    let report = policy_report(&topology, &args.name, args.package.as_deref(), &args.version)?;
    writer.render(&report)?;
    Ok(())
}

/// Describe one composite's policy and optionally test a package against it.
pub fn policy_report(
    topology: &Topology,
    name: &str,
    package: Option<&str>,
    version: &str,
) -> Result<PolicyReport, CliError> {
    let id = topology.lookup(name)?;
    let policy = topology
        .host
        .policy(id)
        .ok_or_else(|| CliError::Command(format!("composite {name} has no policy node")))?;

    let check = match package {
        Some(package) => {
            let version = Version::parse(version).map_err(CairnError::from)?;
            Some(PackageCheck {
                package: package.to_owned(),
                version: version.to_string(),
                imported: policy.imports_package(package, &version),
                exported: policy.exports_package(package, &version),
            })
        }
        None => None,
    };

    Ok(PolicyReport {
        name: name.to_owned(),
        composite_id: id,
        import_packages: policy.import_packages.iter().map(|s| s.name.clone()).collect(),
        export_packages: policy.export_packages.iter().map(|s| s.name.clone()).collect(),
        require_composites: policy
            .require_composites
            .iter()
            .map(|s| s.symbolic_name.clone())
            .collect(),
        import_service: policy.import_service.as_ref().map(|f| f.to_string()),
        export_service: policy.export_service.as_ref().map(|f| f.to_string()),
        check,
    })
}

/// Sharing policy report.
#[derive(Serialize)]
pub struct PolicyReport {
    pub name: String,
    pub composite_id: ModuleId,
    pub import_packages: Vec<String>,
    pub export_packages: Vec<String>,
    pub require_composites: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<PackageCheck>,
}

/// Result of testing one package against the policy.
#[derive(Serialize)]
pub struct PackageCheck {
    pub package: String,
    pub version: String,
    pub imported: bool,
    pub exported: bool,
}

fn verdict(allowed: bool) -> colored::ColoredString {
    use colored::Colorize;
    if allowed {
        "allowed".green()
    } else {
        "denied".red()
    }
}

impl Render for PolicyReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let list = |items: &[String]| {
            if items.is_empty() {
                "-".to_owned()
            } else {
                items.join(", ")
            }
        };

        writeln!(w, "Policy: {} (id={})", self.name.bold(), self.composite_id)?;
        writeln!(w, "  Import packages:    {}", list(&self.import_packages))?;
        writeln!(w, "  Export packages:    {}", list(&self.export_packages))?;
        writeln!(w, "  Require composites: {}", list(&self.require_composites))?;
        writeln!(
            w,
            "  Import service:     {}",
            self.import_service.as_deref().unwrap_or("-")
        )?;
        writeln!(
            w,
            "  Export service:     {}",
            self.export_service.as_deref().unwrap_or("-")
        )?;

        if let Some(check) = &self.check {
            writeln!(w)?;
            writeln!(w, "  {} {}", check.package.bold(), check.version)?;
            writeln!(w, "    import: {}", verdict(check.imported))?;
            writeln!(w, "    export: {}", verdict(check.exported))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[[composite.definitions]]
name = "com.acme.platform"
import_package_policy = "com.acme.*"
export_package_policy = "com.acme.api;version=\"[1.0,2.0)\""
import_service_policy = "(objectClass=com.acme.Log)"
"#;

    fn topology() -> Topology {
        let config = CairnConfig::parse(CONFIG).expect("valid config");
        provision(&config, false).expect("provisioned")
    }

    #[test]
    fn test_policy_report_lists_policy() {
        let report = policy_report(&topology(), "com.acme.platform", None, "0.0.0")
            .expect("report");
        assert_eq!(report.import_packages, ["com.acme.*"]);
        assert_eq!(report.export_packages, ["com.acme.api"]);
        assert!(report.require_composites.is_empty());
        assert!(report.import_service.is_some());
        assert!(report.export_service.is_none());
        assert!(report.check.is_none());
    }

    #[test]
    fn test_policy_report_checks_package_version() {
        let topology = topology();
        let inside = policy_report(&topology, "com.acme.platform", Some("com.acme.api"), "1.5")
            .expect("report");
        let check = inside.check.expect("check");
        assert!(check.imported);
        assert!(check.exported);

        let outside = policy_report(&topology, "com.acme.platform", Some("com.acme.api"), "2.0")
            .expect("report");
        let check = outside.check.expect("check");
        assert!(check.imported, "wildcard import has no version range");
        assert!(!check.exported, "2.0 is outside [1.0,2.0)");
    }

    #[test]
    fn test_policy_report_foreign_package_denied() {
        let report = policy_report(&topology(), "com.acme.platform", Some("org.other"), "1.0")
            .expect("report");
        let check = report.check.expect("check");
        assert!(!check.imported);
        assert!(!check.exported);
    }

    #[test]
    fn test_policy_report_invalid_version() {
        let result = policy_report(&topology(), "com.acme.platform", Some("com.acme.api"), "x.y");
        assert!(matches!(result, Err(CliError::Core(_))));
    }

    #[test]
    fn test_policy_report_unknown_composite() {
        let result = policy_report(&topology(), "com.acme.missing", None, "0.0.0");
        assert!(matches!(result, Err(CliError::UnknownComposite(_))));
    }
}
