//! 컴포지트 호스트 -- 정책 트리와 모든 컴포지트를 소유하는 프레임워크 측 진입점
//!
//! 트리 변경은 `&mut self`를 통해서만 일어나므로 호스트를 소유한 쪽이 모든 변경을 직렬화합니다.
//! 컴포지트 식별자는 루트 런타임에서 발급받습니다.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use cairn_core::error::CairnError;
use cairn_core::runtime::{InstallRequest, ModuleHandle};
use cairn_core::types::{Manifest, ModuleId};

use crate::error::CompositeError;
use crate::lifecycle::{CascadeReport, CompositeModule, CompositeServices};
use crate::manifest::CompositeConfiguration;
use crate::policy::{PolicyTree, SharingPolicy};

/// 컴포지트 호스트
#[derive(Debug)]
pub struct CompositeHost {
    services: CompositeServices,
    link_to_parent: bool,
    tree: PolicyTree,
    composites: BTreeMap<ModuleId, CompositeModule>,
}

impl CompositeHost {
    /// 새 호스트를 생성합니다.
    ///
    /// `link_to_parent`이면 새 컴포지트의 정책 노드를 부모 아래에 연결합니다.
    pub fn new(services: CompositeServices, link_to_parent: bool) -> Self {
        Self {
            services,
            link_to_parent,
            tree: PolicyTree::new(),
            composites: BTreeMap::new(),
        }
    }

    /// 정책 트리
    pub fn tree(&self) -> &PolicyTree {
        &self.tree
    }

    /// 컴포지트를 조회합니다.
    pub fn composite(&self, id: ModuleId) -> Option<&CompositeModule> {
        self.composites.get(&id)
    }

    /// 모든 컴포지트 (식별자 순)
    pub fn composites(&self) -> impl Iterator<Item = &CompositeModule> {
        self.composites.values()
    }

    /// 컴포지트 수
    pub fn len(&self) -> usize {
        self.composites.len()
    }

    /// 컴포지트가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.composites.is_empty()
    }

    /// 컴포지트의 현재 공유 정책
    pub fn policy(&self, id: ModuleId) -> Option<&SharingPolicy> {
        self.composites.get(&id)?.policy(&self.tree)
    }

    /// 심볼릭 이름으로 컴포지트를 찾습니다.
    pub fn find(&self, symbolic_name: &str) -> Option<&CompositeModule> {
        self.composites
            .values()
            .find(|c| c.symbolic_name() == symbolic_name)
    }

    fn get_mut(&mut self, id: ModuleId) -> Result<&mut CompositeModule, CompositeError> {
        self.composites
            .get_mut(&id)
            .ok_or(CompositeError::UnknownComposite(id))
    }

    /// 컴포지트를 설치합니다. `parent`가 `0`이면 루트 아래에 설치합니다.
    pub fn install_composite(
        &mut self,
        parent: ModuleId,
        manifest: &Manifest,
        configuration: &CompositeConfiguration,
    ) -> Result<ModuleId, CairnError> {
        let id = self.services.runtime.next_module_id();
        self.check_parent(id, parent)?;
        let composite = CompositeModule::install(
            id,
            parent,
            manifest,
            configuration,
            self.link_to_parent,
            self.services.clone(),
            &mut self.tree,
        )?;
        self.composites.insert(id, composite);
        Ok(id)
    }

    fn check_parent(&self, composite: ModuleId, parent: ModuleId) -> Result<(), CompositeError> {
        if parent != ModuleId::ROOT && !self.composites.contains_key(&parent) {
            return Err(CompositeError::UnknownParent { composite, parent });
        }
        Ok(())
    }

    /// 컴포지트의 실행 컨텍스트를 통해 구성 모듈을 설치합니다.
    pub fn install_constituent(
        &mut self,
        composite: ModuleId,
        request: InstallRequest,
    ) -> Result<Arc<dyn ModuleHandle>, CairnError> {
        let context = self
            .composites
            .get(&composite)
            .ok_or(CompositeError::UnknownComposite(composite))?
            .anchor()
            .create_execution_context()?;
        context.install_module(request)
    }

    /// 컴포지트를 시작합니다.
    pub fn start(&mut self, id: ModuleId) -> Result<(), CairnError> {
        self.get_mut(id)?.start()
    }

    /// 컴포지트를 정지합니다.
    pub fn stop(&mut self, id: ModuleId) -> Result<(), CairnError> {
        self.get_mut(id)?.stop()
    }

    /// 컴포지트의 구성 모듈 레지스트리를 다시 만듭니다.
    pub fn refresh(&mut self, id: ModuleId) -> Result<(), CairnError> {
        self.get_mut(id)?.refresh()
    }

    /// 컴포지트를 새 매니페스트로 업데이트합니다.
    pub fn update(&mut self, id: ModuleId, manifest: &Manifest) -> Result<(), CairnError> {
        let composite = self
            .composites
            .get_mut(&id)
            .ok_or(CompositeError::UnknownComposite(id))?;
        composite.update(&mut self.tree, manifest)
    }

    /// 하위 컴포지트를 깊은 것부터 나열합니다.
    fn descendants(&self, id: ModuleId) -> Vec<ModuleId> {
        let mut order = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                if current != id {
                    order.push(current);
                }
                continue;
            }
            stack.push((current, true));
            for child in self.composites.values().filter(|c| c.parent() == current) {
                stack.push((child.id(), false));
            }
        }
        order
    }

    /// 컴포지트를 제거하고 닫습니다.
    ///
    /// 하위 컴포지트가 있으면 깊은 것부터 먼저 제거합니다. 모든 연쇄 제거 결과를 합쳐 반환합니다.
    pub fn uninstall(&mut self, id: ModuleId) -> Result<CascadeReport, CairnError> {
        if !self.composites.contains_key(&id) {
            return Err(CompositeError::UnknownComposite(id).into());
        }

        let mut report = CascadeReport::default();
        for descendant in self.descendants(id).into_iter().chain(std::iter::once(id)) {
            let Some(mut composite) = self.composites.remove(&descendant) else {
                continue;
            };
            match composite.uninstall() {
                Ok(cascade) => report.absorb(cascade),
                Err(e) => {
                    self.composites.insert(descendant, composite);
                    return Err(e);
                }
            }
            if let Err(e) = composite.close(&mut self.tree) {
                self.composites.insert(descendant, composite);
                return Err(e);
            }
            debug!(composite_id = %descendant, root = %id, "composite removed from host");
        }
        info!(
            composite_id = %id,
            uninstalled = report.uninstalled.len(),
            failed = report.failed.len(),
            "composite tree uninstalled"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryRuntime, RecordingStartLevels};
    use cairn_core::error::LifecycleError;
    use cairn_core::runtime::RootRuntime;
    use cairn_core::types::{
        COMPOSITE_PACKAGE_IMPORT_POLICY, MODULE_MANIFEST_VERSION, MODULE_SYMBOLIC_NAME,
        ModuleState,
    };

    fn host() -> (Arc<InMemoryRuntime>, CompositeHost) {
        let runtime = Arc::new(InMemoryRuntime::new());
        let levels = Arc::new(RecordingStartLevels::new());
        let services = CompositeServices::new(runtime.clone(), runtime.clone(), levels.factory());
        (runtime, CompositeHost::new(services, true))
    }

    fn manifest(name: &str) -> Manifest {
        [
            (MODULE_SYMBOLIC_NAME, name),
            (COMPOSITE_PACKAGE_IMPORT_POLICY, "com.acme.*"),
        ]
        .into_iter()
        .collect()
    }

    fn request(name: &str) -> InstallRequest {
        let manifest: Manifest = [(MODULE_SYMBOLIC_NAME, name), (MODULE_MANIFEST_VERSION, "2")]
            .into_iter()
            .collect();
        InstallRequest::new(format!("mem:{name}"), manifest)
    }

    #[test]
    fn nested_install_builds_tree() {
        let (_, mut host) = host();
        let config = CompositeConfiguration::new();
        let outer = host
            .install_composite(ModuleId::ROOT, &manifest("outer"), &config)
            .unwrap();
        let inner = host.install_composite(outer, &manifest("inner"), &config).unwrap();

        let tree = host.tree();
        let outer_node = host.composite(outer).unwrap().node();
        let inner_node = host.composite(inner).unwrap().node();
        assert_eq!(tree.parent(inner_node), Some(outer_node));
        assert_eq!(tree.depth(inner_node), 2);
        assert_eq!(host.find("inner").unwrap().id(), inner);
        assert!(host.policy(inner).is_some());
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let (_, mut host) = host();
        let err = host
            .install_composite(ModuleId::new(77), &manifest("x"), &CompositeConfiguration::new())
            .unwrap_err();
        assert!(matches!(
            err,
            CairnError::Lifecycle(LifecycleError::NotFound(id)) if id == ModuleId::new(77)
        ));
        assert!(host.is_empty());
    }

    #[test]
    fn unknown_parent_names_the_composite_being_installed() {
        let (runtime, host) = host();
        let id = runtime.next_module_id();
        let err = host.check_parent(id, ModuleId::new(77)).unwrap_err();
        assert!(matches!(
            err,
            CompositeError::UnknownParent { composite, parent }
                if composite == id && parent == ModuleId::new(77)
        ));
        assert!(host.check_parent(id, ModuleId::ROOT).is_ok());
    }

    #[test]
    fn close_failure_keeps_composite_in_host() {
        let (_, mut host) = host();
        let id = host
            .install_composite(ModuleId::ROOT, &manifest("leaf"), &CompositeConfiguration::new())
            .unwrap();
        let node = host.composite(id).unwrap().node();
        host.tree.detach(node).unwrap();

        assert!(host.uninstall(id).is_err());
        let composite = host.composite(id).expect("composite stays registered");
        assert_eq!(composite.state(), ModuleState::Uninstalled);
        assert_eq!(host.len(), 1);
    }

    #[test]
    fn operations_on_unknown_composite_fail() {
        let (_, mut host) = host();
        assert!(host.start(ModuleId::new(9)).is_err());
        assert!(host.uninstall(ModuleId::new(9)).is_err());
        assert!(host.install_constituent(ModuleId::new(9), request("a")).is_err());
    }

    #[test]
    fn constituents_are_tracked_through_context() {
        let (_, mut host) = host();
        let id = host
            .install_composite(ModuleId::ROOT, &manifest("outer"), &CompositeConfiguration::new())
            .unwrap();
        let module = host.install_constituent(id, request("com.acme.api")).unwrap();
        assert!(host.composite(id).unwrap().constituents().contains(module.id()));
        host.start(id).unwrap();
        assert_eq!(host.composite(id).unwrap().state(), ModuleState::Active);
    }

    #[test]
    fn uninstall_removes_descendants_first() {
        let (runtime, mut host) = host();
        let config = CompositeConfiguration::new();
        let outer = host
            .install_composite(ModuleId::ROOT, &manifest("outer"), &config)
            .unwrap();
        let inner = host.install_composite(outer, &manifest("inner"), &config).unwrap();
        let innermost = host.install_composite(inner, &manifest("innermost"), &config).unwrap();
        host.install_constituent(innermost, request("deep")).unwrap();
        host.install_constituent(outer, request("shallow")).unwrap();
        let sibling = host
            .install_composite(ModuleId::ROOT, &manifest("sibling"), &config)
            .unwrap();

        let report = host.uninstall(outer).unwrap();
        assert_eq!(report.uninstalled.len(), 2);
        assert!(report.is_clean());
        assert_eq!(host.len(), 1);
        assert!(host.composite(sibling).is_some());
        assert_eq!(host.tree().len(), 2);
        assert_eq!(runtime.live_modules(), 0);
    }
}
