//! `cairn simulate` command handler

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;
use tracing::{info, warn};

use cairn_core::config::CairnConfig;
use cairn_core::types::ModuleId;

use crate::cli::SimulateArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};
use crate::topology::{Topology, provision};

/// Execute the `simulate` command.
///
/// The report is rendered even when constituents fail; the failure count
/// is then surfaced through the exit code.
pub fn execute(
    args: SimulateArgs,
    config: &CairnConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let mut topology = provision(config, true)?;
    let report = simulate_uninstall(&mut topology, &args.name)?;
    writer.render(&report)?;

    if !report.failed.is_empty() {
        warn!(failed = report.failed.len(), "cascade finished with failures");
        return Err(CliError::CascadeFailures(report.failed.len()));
    }
    Ok(())
}

/// Uninstall a composite (and every nested composite) and collect the outcome.
pub fn simulate_uninstall(
    topology: &mut Topology,
    name: &str,
) -> Result<SimulationReport, CliError> {
    let id = topology.lookup(name)?;

    let module_names: BTreeMap<ModuleId, String> = topology
        .host
        .composites()
        .flat_map(|c| c.constituents().snapshot())
        .map(|d| (d.module_id, d.symbolic_name.clone()))
        .collect();
    let composite_names: BTreeMap<ModuleId, String> = topology
        .names
        .iter()
        .map(|(name, id)| (*id, name.clone()))
        .collect();
    let label = |id: ModuleId, names: &BTreeMap<ModuleId, String>| {
        names.get(&id).cloned().unwrap_or_else(|| id.to_string())
    };

    let cascade = topology.host.uninstall(id)?;

    let removed_composites: Vec<String> = composite_names
        .iter()
        .filter(|(id, _)| topology.host.composite(**id).is_none())
        .map(|(_, name)| name.clone())
        .collect();
    for removed in &removed_composites {
        topology.names.remove(removed);
    }

    let failed = topology
        .runtime
        .errors()
        .into_iter()
        .map(|event| FailedModule {
            module: label(event.cause.module, &module_names),
            module_id: event.cause.module,
            composite: label(event.cause.composite, &composite_names),
            reason: event.cause.reason,
        })
        .collect();

    info!(composite = %name, composite_id = %id, "uninstall simulated");
    Ok(SimulationReport {
        target: name.to_owned(),
        removed_composites,
        uninstalled: cascade
            .uninstalled
            .iter()
            .map(|id| label(*id, &module_names))
            .collect(),
        failed,
        remaining_composites: topology.host.len(),
    })
}

/// Uninstall simulation report.
#[derive(Serialize)]
pub struct SimulationReport {
    /// Composite that was uninstalled
    pub target: String,
    /// Every composite removed, including nested ones
    pub removed_composites: Vec<String>,
    /// Constituents uninstalled by the cascade
    pub uninstalled: Vec<String>,
    /// Constituents that failed to uninstall
    pub failed: Vec<FailedModule>,
    /// Composites still installed afterwards
    pub remaining_composites: usize,
}

/// A constituent whose uninstall failed, as published to the root runtime.
#[derive(Serialize)]
pub struct FailedModule {
    pub module: String,
    pub module_id: ModuleId,
    pub composite: String,
    pub reason: String,
}

impl Render for SimulationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Uninstall simulation: {}", self.target.bold())?;
        writeln!(w, "  Removed composites: {}", self.removed_composites.join(", "))?;
        writeln!(w, "  Uninstalled constituents: {}", self.uninstalled.len())?;
        for name in &self.uninstalled {
            writeln!(w, "    {} {name}", "-".green())?;
        }
        if self.failed.is_empty() {
            writeln!(w, "  Result: {}", "CLEAN".green().bold())?;
        } else {
            writeln!(w, "  Failed constituents: {}", self.failed.len())?;
            for failure in &self.failed {
                writeln!(
                    w,
                    "    {} {} in {}: {}",
                    "x".red(),
                    failure.module,
                    failure.composite,
                    failure.reason.red()
                )?;
            }
            writeln!(w, "  Result: {}", "PARTIAL".yellow().bold())?;
        }
        writeln!(w, "  Remaining composites: {}", self.remaining_composites)?;
        Ok(())
    }
}
