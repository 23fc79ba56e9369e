//! Provision the configured composite topology into an in-memory runtime.
//!
//! Composites are installed in definition order, so a parent is always present
//! before its children. Constituents are installed through each composite's
//! anchor execution context, exactly as a hosted module would install them.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use cairn_composite::{
    CompositeConfiguration, CompositeHost, CompositeServices, InMemoryRuntime,
    RecordingStartLevels,
};
use cairn_core::config::CairnConfig;
use cairn_core::runtime::InstallRequest;
use cairn_core::types::ModuleId;

use crate::error::CliError;

/// A provisioned topology: the runtime, the host and a name index.
#[derive(Debug)]
pub struct Topology {
    /// Root runtime backing every composite.
    pub runtime: Arc<InMemoryRuntime>,
    /// Start level controllers, one per composite.
    pub start_levels: Arc<RecordingStartLevels>,
    /// Composite host owning the policy tree.
    pub host: CompositeHost,
    /// Composite symbolic name -> composite id.
    pub names: BTreeMap<String, ModuleId>,
}

impl Topology {
    /// Resolve a composite name to its id.
    pub fn lookup(&self, name: &str) -> Result<ModuleId, CliError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| CliError::UnknownComposite(name.to_owned()))
    }

    /// Reverse lookup of a composite name. Falls back to the numeric id.
    pub fn name_of(&self, id: ModuleId) -> String {
        self.host
            .composite(id)
            .map(|c| c.symbolic_name().to_owned())
            .unwrap_or_else(|| id.to_string())
    }
}

/// Install every configured composite and its constituents.
///
/// When `start` is set each composite is started after its constituents are installed.
pub fn provision(config: &CairnConfig, start: bool) -> Result<Topology, CliError> {
    let runtime = Arc::new(InMemoryRuntime::new());
    let start_levels = Arc::new(RecordingStartLevels::new());
    let services = CompositeServices::new(
        runtime.clone(),
        runtime.clone(),
        start_levels.factory(),
    );
    let mut host = CompositeHost::new(services, config.composite.link_to_parent);
    let mut names = BTreeMap::new();

    for def in &config.composite.definitions {
        let parent = match &def.parent {
            Some(parent) => names
                .get(parent)
                .copied()
                .ok_or_else(|| CliError::UnknownComposite(parent.clone()))?,
            None => ModuleId::ROOT,
        };

        let configuration = CompositeConfiguration::from(def.configuration.clone());
        let id = host.install_composite(parent, &def.manifest(), &configuration)?;
        info!(composite = %def.name, composite_id = %id, parent_id = %parent, "composite provisioned");

        for constituent in &def.constituents {
            let request =
                InstallRequest::new(format!("config:{}", constituent.name), constituent.manifest());
            let handle = host.install_constituent(id, request)?;
            if constituent.fail_uninstall {
                runtime.fail_on_uninstall(handle.id());
            }
            debug!(
                composite_id = %id,
                module_id = %handle.id(),
                name = %constituent.name,
                "constituent installed"
            );
        }

        if start {
            host.start(id)?;
        }
        names.insert(def.name.clone(), id);
    }

    Ok(Topology {
        runtime,
        start_levels,
        host,
        names,
    })
}
