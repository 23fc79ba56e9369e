//! `cairn tree` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use cairn_core::config::CairnConfig;
use cairn_core::types::ModuleId;

use crate::cli::TreeArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};
use crate::topology::{Topology, provision};

/// Execute the `tree` command.
pub fn execute(args: TreeArgs, config: &CairnConfig, writer: &OutputWriter) -> Result<(), CliError> {
    let topology = provision(config, args.start)?;
    let report = tree_report(&topology, args.verbose);
    info!(nodes = report.nodes.len(), "policy tree built");
    writer.render(&report)?;
    Ok(())
}

/// Walk the policy tree from the root and describe every linked node.
pub fn tree_report(topology: &Topology, verbose: bool) -> TreeReport {
    let host = &topology.host;
    let walk = host.tree().walk();
    let linked: Vec<ModuleId> = walk.iter().map(|(_, node)| node.owner()).collect();
    let nodes = walk
        .into_iter()
        .map(|(depth, node)| {
            let owner = node.owner();
            let composite = host.composite(owner);
            let constituents = composite
                .map(|c| c.constituents().snapshot())
                .unwrap_or_default();
            TreeNode {
                depth,
                node: node.id().get(),
                composite_id: owner,
                name: composite
                    .map(|c| c.symbolic_name().to_owned())
                    .unwrap_or_else(|| "<root>".to_owned()),
                state: composite.map(|c| c.state().to_string()),
                policy: (!node.policy().is_empty()).then(|| node.policy().to_string()),
                constituent_count: constituents.len(),
                constituents: if verbose {
                    constituents.iter().map(|d| d.to_string()).collect()
                } else {
                    Vec::new()
                },
            }
        })
        .collect();

    let detached = host
        .composites()
        .filter(|c| !linked.contains(&c.id()))
        .map(|c| c.symbolic_name().to_owned())
        .collect();

    TreeReport { nodes, detached }
}

/// Policy tree report.
#[derive(Serialize)]
pub struct TreeReport {
    /// Nodes in depth-first order starting at the root
    pub nodes: Vec<TreeNode>,
    /// Composites whose policy node is not linked under the root
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub detached: Vec<String>,
}

/// One node of the policy tree.
#[derive(Serialize)]
pub struct TreeNode {
    pub depth: usize,
    pub node: u64,
    pub composite_id: ModuleId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    pub constituent_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constituents: Vec<String>,
}

impl Render for TreeReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for node in &self.nodes {
            let indent = "  ".repeat(node.depth);
            match &node.state {
                Some(state) => writeln!(
                    w,
                    "{indent}{} [{}] id={} constituents={}",
                    node.name.bold(),
                    state.cyan(),
                    node.composite_id,
                    node.constituent_count
                )?,
                None => writeln!(w, "{indent}{}", node.name.bold())?,
            }
            if let Some(policy) = &node.policy {
                writeln!(w, "{indent}  policy: {policy}")?;
            }
            for constituent in &node.constituents {
                writeln!(w, "{indent}  - {constituent}")?;
            }
        }
        if !self.detached.is_empty() {
            writeln!(w)?;
            writeln!(w, "{}", "Detached composites:".yellow())?;
            for name in &self.detached {
                writeln!(w, "  {name}")?;
            }
        }
        Ok(())
    }
}
