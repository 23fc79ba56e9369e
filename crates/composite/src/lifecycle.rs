//! 컴포지트 생명주기 -- 컨테이너 모듈의 상태 기계
//!
//! [`CompositeModule`]은 하나의 컴포지트를 표현합니다. 정책 노드, 구성 모듈 레지스트리,
//! 앵커, 시작 레벨 컨트롤러를 소유하고 다음 전이를 관리합니다.
//!
//! ```text
//! INSTALLED ─load─> RESOLVED ─start─> STARTING ─> ACTIVE
//!                      ^                            |
//!                      └──────── STOPPING <──stop───┘
//!
//! (any) ─uninstall─> UNINSTALLED ─close─> (detached)
//! ```
//!
//! 정책 트리 변경이 필요한 연산(`install`, `update`, `close`)은 `&mut PolicyTree`를 받습니다.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use cairn_core::error::{CairnError, CascadeFailure, LifecycleError};
use cairn_core::filter::LdapFilterCompiler;
use cairn_core::header::{HeaderResolver, symbolic_name_of};
use cairn_core::metrics::{
    CASCADE_FAILURES_TOTAL, COMPOSITES_INSTALLED_TOTAL, COMPOSITES_UNINSTALLED_TOTAL,
    LABEL_COMPOSITE, LABEL_RESULT, POLICY_UPDATES_TOTAL,
};
use cairn_core::runtime::{
    DependencyResolver, FilterCompiler, ManifestValidator, RootAnchor, RootRuntime,
    StartLevelController,
};
use cairn_core::types::{Manifest, ModuleId, ModuleState};

use crate::anchor::AnchorDelegate;
use crate::constituents::ConstituentRegistry;
use crate::manifest::{
    CompositeConfiguration, CompositeManifestValidator, ModuleContent, composite_content,
};
use crate::policy::{NodeId, PolicyTree, SharingPolicy, build_policy};

/// 컴포지트 시작 시 올리는 시작 레벨
pub const BASELINE_START_LEVEL: u32 = 1;

/// 컴포지트별 시작 레벨 컨트롤러 팩토리
pub type StartLevelFactory =
    Arc<dyn Fn(ModuleId) -> Arc<dyn StartLevelController> + Send + Sync>;

/// 컴포지트가 사용하는 외부 협력자 모음
#[derive(Clone)]
pub struct CompositeServices {
    /// 루트 런타임
    pub runtime: Arc<dyn RootRuntime>,
    /// 루트 앵커 (서비스 조회)
    pub root_anchor: Arc<dyn RootAnchor>,
    /// 의존성 해석 엔진
    pub resolver: Arc<dyn DependencyResolver>,
    /// 서비스 필터 컴파일러
    pub filters: Arc<dyn FilterCompiler>,
    /// 컴포지트 매니페스트 검증기
    pub validator: Arc<dyn ManifestValidator>,
    /// 시작 레벨 컨트롤러 팩토리
    pub start_levels: StartLevelFactory,
}

impl CompositeServices {
    /// 헤더 해석기, LDAP 필터 컴파일러, 컴포지트 검증기를 기본으로 사용합니다.
    pub fn new(
        runtime: Arc<dyn RootRuntime>,
        root_anchor: Arc<dyn RootAnchor>,
        start_levels: StartLevelFactory,
    ) -> Self {
        Self {
            runtime,
            root_anchor,
            resolver: Arc::new(HeaderResolver::new()),
            filters: Arc::new(LdapFilterCompiler),
            validator: Arc::new(CompositeManifestValidator),
            start_levels,
        }
    }

    /// 의존성 해석 엔진을 교체합니다.
    pub fn with_resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// 필터 컴파일러를 교체합니다.
    pub fn with_filters(mut self, filters: Arc<dyn FilterCompiler>) -> Self {
        self.filters = filters;
        self
    }

    fn policy_for(&self, manifest: &Manifest) -> Result<SharingPolicy, CairnError> {
        let filters = Arc::clone(&self.filters);
        build_policy(manifest, self.resolver.as_ref(), move |text| {
            Ok(filters.compile_filter(text)?)
        })
    }
}

impl std::fmt::Debug for CompositeServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeServices").finish_non_exhaustive()
    }
}

/// 연쇄 제거 결과
///
/// 실패는 루트 런타임에 에러 이벤트로 게시되며 여기에는 식별자만 남습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// 제거된 구성 모듈
    pub uninstalled: Vec<ModuleId>,
    /// 제거에 실패한 구성 모듈
    pub failed: Vec<ModuleId>,
}

impl CascadeReport {
    /// 실패 없이 끝났는지 확인합니다.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// 다른 결과를 이어 붙입니다.
    pub fn absorb(&mut self, other: CascadeReport) {
        self.uninstalled.extend(other.uninstalled);
        self.failed.extend(other.failed);
    }
}

// ─── CompositeModule ─────────────────────────────────────────────────

/// 컴포지트 (컨테이너 모듈)
pub struct CompositeModule {
    id: ModuleId,
    parent: ModuleId,
    symbolic_name: String,
    state: ModuleState,
    content: ModuleContent,
    node: NodeId,
    constituents: Arc<ConstituentRegistry>,
    anchor: Arc<AnchorDelegate>,
    start_level: Arc<dyn StartLevelController>,
    services: CompositeServices,
}

impl CompositeModule {
    /// 컴포지트를 설치합니다.
    ///
    /// 매니페스트 검증과 정책 계산이 끝난 뒤에만 정책 노드를 트리에 추가합니다.
    /// `link_to_parent`이면 노드를 부모 아래에 연결하고, 앵커의 실행 컨텍스트가
    /// 설치 이벤트를 구성 모듈 레지스트리에 전달합니다.
    pub fn install(
        id: ModuleId,
        parent: ModuleId,
        manifest: &Manifest,
        configuration: &CompositeConfiguration,
        link_to_parent: bool,
        services: CompositeServices,
        tree: &mut PolicyTree,
    ) -> Result<Self, CairnError> {
        let mut manifest = manifest.clone();
        services.validator.validate(&mut manifest)?;
        let symbolic_name = symbolic_name_of(&manifest).unwrap_or_default().to_owned();
        let policy = services.policy_for(&manifest)?;
        let content = composite_content(configuration, &manifest);

        let node = tree.insert(id, policy, link_to_parent.then_some(parent))?;

        let constituents = Arc::new(ConstituentRegistry::new(
            id,
            Arc::clone(&services.runtime),
        ));
        let mut anchor = AnchorDelegate::new(
            id,
            symbolic_name.clone(),
            Arc::clone(&services.root_anchor),
            Arc::clone(&services.runtime),
            Arc::clone(&services.filters),
        );
        if link_to_parent {
            anchor = anchor.propagating_to(constituents.clone());
        }
        let anchor = Arc::new(anchor);
        services.runtime.register_anchor(id, anchor.clone());
        let start_level = (services.start_levels)(id);

        metrics::counter!(COMPOSITES_INSTALLED_TOTAL).increment(1);
        info!(
            composite_id = %id,
            parent = %parent,
            symbolic_name = %symbolic_name,
            node = %node,
            "composite installed"
        );

        Ok(Self {
            id,
            parent,
            symbolic_name,
            state: ModuleState::Installed,
            content,
            node,
            constituents,
            anchor,
            start_level,
            services,
        })
    }

    // --- 접근자 ---

    /// 컴포지트 식별자
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// 컴포지트 식별자 (앵커의 `composite_id`와 같음)
    pub fn composite_id(&self) -> ModuleId {
        self.id
    }

    /// 부모 컴포지트 (`0`은 루트)
    pub fn parent(&self) -> ModuleId {
        self.parent
    }

    /// 심볼릭 이름 (`composite:=true` 지시자 제외)
    pub fn symbolic_name(&self) -> &str {
        &self.symbolic_name
    }

    /// 현재 상태
    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// 현재 매니페스트
    pub fn manifest(&self) -> &Manifest {
        self.content.manifest()
    }

    /// 현재 컨텐츠
    pub fn content(&self) -> &ModuleContent {
        &self.content
    }

    /// 정책 노드
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// 트리에서 현재 정책을 조회합니다.
    pub fn policy<'t>(&self, tree: &'t PolicyTree) -> Option<&'t SharingPolicy> {
        tree.node(self.node).map(|node| node.policy())
    }

    /// 구성 모듈 레지스트리
    pub fn constituents(&self) -> &Arc<ConstituentRegistry> {
        &self.constituents
    }

    /// 앵커 모듈
    pub fn anchor(&self) -> &Arc<AnchorDelegate> {
        &self.anchor
    }

    /// 시작 레벨 컨트롤러
    pub fn start_level(&self) -> &Arc<dyn StartLevelController> {
        &self.start_level
    }

    fn invalid_state(&self, operation: &str) -> CairnError {
        LifecycleError::InvalidState {
            module: self.id,
            state: self.state.to_string(),
            operation: operation.to_owned(),
        }
        .into()
    }

    fn transition(&mut self, to: ModuleState) {
        debug!(composite_id = %self.id, from = %self.state, to = %to, "composite state transition");
        self.state = to;
    }

    // --- 상태 전이 ---

    /// INSTALLED에서 RESOLVED로 전이하고 레지스트리를 다시 만듭니다.
    pub fn load(&mut self) -> Result<(), CairnError> {
        if self.state != ModuleState::Installed {
            return Err(self.invalid_state("load"));
        }
        self.transition(ModuleState::Resolved);
        self.constituents.rebuild();
        Ok(())
    }

    /// 레지스트리를 다시 만듭니다. INSTALLED 또는 RESOLVED에서만 허용됩니다.
    pub fn refresh(&mut self) -> Result<(), CairnError> {
        match self.state {
            ModuleState::Installed | ModuleState::Resolved => {
                self.transition(ModuleState::Resolved);
                let count = self.constituents.rebuild();
                info!(composite_id = %self.id, constituents = count, "composite refreshed");
                Ok(())
            }
            _ => Err(self.invalid_state("refresh")),
        }
    }

    /// 컴포지트를 시작하고 시작 레벨을 [`BASELINE_START_LEVEL`]로 올립니다.
    ///
    /// 이미 ACTIVE이면 아무것도 하지 않습니다.
    pub fn start(&mut self) -> Result<(), CairnError> {
        self.services.runtime.require_lifecycle_permission(self.id)?;
        match self.state {
            ModuleState::Active => return Ok(()),
            ModuleState::Installed => self.load()?,
            ModuleState::Resolved => {}
            ModuleState::Starting | ModuleState::Stopping | ModuleState::Uninstalled => {
                return Err(self.invalid_state("start"));
            }
        }

        self.transition(ModuleState::Starting);
        if let Err(e) = self
            .start_level
            .initialize()
            .and_then(|()| self.start_level.set_level(BASELINE_START_LEVEL))
        {
            error!(composite_id = %self.id, error = %e, "start level activation failed");
            self.start_level.cleanup();
            self.transition(ModuleState::Resolved);
            return Err(e);
        }
        self.transition(ModuleState::Active);
        info!(composite_id = %self.id, level = self.start_level.level(), "composite started");
        Ok(())
    }

    /// 컴포지트를 정지합니다. ACTIVE가 아니면 아무것도 하지 않습니다.
    pub fn stop(&mut self) -> Result<(), CairnError> {
        if self.state != ModuleState::Active {
            debug!(composite_id = %self.id, state = %self.state, "stop ignored");
            return Ok(());
        }
        self.transition(ModuleState::Stopping);
        let shutdown = self.start_level.shutdown();
        self.start_level.cleanup();
        self.transition(ModuleState::Resolved);
        if let Err(e) = &shutdown {
            warn!(composite_id = %self.id, error = %e, "start level shutdown failed");
        }
        info!(composite_id = %self.id, "composite stopped");
        shutdown
    }

    /// 새 매니페스트로 구조적 업데이트를 수행합니다.
    ///
    /// 검증, 설정 읽기, 새 컨텐츠 구성, 정책 계산이 모두 성공한 뒤에만
    /// 컨텐츠를 교체하고 기존 노드에 정책을 병합합니다. 실패하면 아무것도 바뀌지 않습니다.
    /// ACTIVE였다면 교체 전에 정지하고 교체 후 다시 시작합니다.
    pub fn update(&mut self, tree: &mut PolicyTree, manifest: &Manifest) -> Result<(), CairnError> {
        let result = self.apply_update(tree, manifest);
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(POLICY_UPDATES_TOTAL, LABEL_RESULT => outcome).increment(1);
        result
    }

    fn apply_update(&mut self, tree: &mut PolicyTree, manifest: &Manifest) -> Result<(), CairnError> {
        self.services.runtime.require_lifecycle_permission(self.id)?;
        if self.state == ModuleState::Uninstalled {
            return Err(self.invalid_state("update"));
        }

        let mut manifest = manifest.clone();
        self.services.validator.validate(&mut manifest)?;
        let configuration = self.content.configuration()?;
        let content = composite_content(&configuration, &manifest);
        let policy = self.services.policy_for(&manifest)?;
        if !tree.contains(self.node) {
            return Err(crate::error::CompositeError::NodeNotFound(self.node).into());
        }

        // 여기부터는 실패해도 교체를 되돌리지 않습니다.
        let was_active = self.state == ModuleState::Active;
        if was_active {
            if let Err(e) = self.stop() {
                warn!(composite_id = %self.id, error = %e, "stop before update failed, continuing");
            }
        }
        tree.merge(self.node, policy)?;
        self.content = content;
        self.symbolic_name = symbolic_name_of(self.content.manifest())
            .unwrap_or_default()
            .to_owned();
        info!(composite_id = %self.id, node = %self.node, "composite policy updated");
        if was_active {
            if let Err(e) = self.start() {
                error!(
                    composite_id = %self.id,
                    error = %e,
                    "restart after update failed, composite left resolved"
                );
            }
        }
        Ok(())
    }

    /// 바이트 스트림 업데이트는 지원하지 않습니다.
    pub fn update_bytes(&self, _content: &[u8]) -> Result<(), CairnError> {
        Err(CairnError::unsupported(format!(
            "update composite {} from a byte stream",
            self.id
        )))
    }

    /// 컴포지트를 제거하고 구성 모듈을 연쇄 제거합니다.
    ///
    /// 개별 구성 모듈의 실패는 반환하지 않고 루트 런타임에 에러 이벤트로 게시한 뒤 계속합니다.
    pub fn uninstall(&mut self) -> Result<CascadeReport, CairnError> {
        self.services.runtime.require_lifecycle_permission(self.id)?;
        if self.state == ModuleState::Uninstalled {
            return Err(self.invalid_state("uninstall"));
        }
        if let Err(e) = self.stop() {
            warn!(composite_id = %self.id, error = %e, "stop during uninstall failed");
        }
        self.transition(ModuleState::Uninstalled);
        self.anchor.invalidate_context();

        let mut report = CascadeReport::default();
        for module in self.services.runtime.modules_under(self.id) {
            let module_id = module.id();
            if module_id.is_anchor() {
                continue;
            }
            match module.uninstall() {
                Ok(()) => report.uninstalled.push(module_id),
                Err(e) => {
                    let failure = CascadeFailure {
                        composite: self.id,
                        module: module_id,
                        reason: e.to_string(),
                    };
                    error!(
                        composite_id = %self.id,
                        module_id = %module_id,
                        error = %e,
                        "constituent uninstall failed"
                    );
                    metrics::counter!(CASCADE_FAILURES_TOTAL, LABEL_COMPOSITE => self.id.to_string())
                        .increment(1);
                    self.services.runtime.publish_error(module_id, failure);
                    report.failed.push(module_id);
                }
            }
        }

        metrics::counter!(COMPOSITES_UNINSTALLED_TOTAL).increment(1);
        info!(
            composite_id = %self.id,
            uninstalled = report.uninstalled.len(),
            failed = report.failed.len(),
            "composite uninstalled"
        );
        Ok(report)
    }

    /// 제거된 컴포지트를 닫습니다.
    ///
    /// 정책 노드를 부모에서 분리하고, 앵커를 닫고, 레지스트리를 비웁니다.
    pub fn close(&mut self, tree: &mut PolicyTree) -> Result<(), CairnError> {
        if self.state != ModuleState::Uninstalled {
            return Err(self.invalid_state("close"));
        }
        tree.detach(self.node)?;
        self.anchor.close();
        self.services.runtime.remove_anchor(self.id);
        self.constituents.clear();
        info!(composite_id = %self.id, "composite closed");
        Ok(())
    }
}

impl std::fmt::Debug for CompositeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeModule")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("symbolic_name", &self.symbolic_name)
            .field("state", &self.state)
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::COMPOSITE_CONFIGURATION_ENTRY;
    use crate::memory::{InMemoryRuntime, RecordingStartLevels, StartLevelCall};
    use cairn_core::header::Version;
    use cairn_core::runtime::InstallRequest;
    use cairn_core::types::{
        COMPOSITE_PACKAGE_IMPORT_POLICY, COMPOSITE_SERVICE_IMPORT_POLICY, IMPORT_PACKAGE,
        MODULE_MANIFEST_VERSION, MODULE_SYMBOLIC_NAME,
    };

    struct Fixture {
        runtime: Arc<InMemoryRuntime>,
        levels: Arc<RecordingStartLevels>,
        tree: PolicyTree,
        services: CompositeServices,
    }

    impl Fixture {
        fn new() -> Self {
            let runtime = Arc::new(InMemoryRuntime::new());
            let levels = Arc::new(RecordingStartLevels::new());
            let services = CompositeServices::new(runtime.clone(), runtime.clone(), levels.factory());
            Self {
                runtime,
                levels,
                tree: PolicyTree::new(),
                services,
            }
        }

        fn install(&mut self, manifest: &Manifest) -> CompositeModule {
            let id = self.services.runtime.next_module_id();
            CompositeModule::install(
                id,
                ModuleId::ROOT,
                manifest,
                &CompositeConfiguration::new().with("owner", "tests"),
                true,
                self.services.clone(),
                &mut self.tree,
            )
            .unwrap()
        }
    }

    fn composite_manifest(imports: &str) -> Manifest {
        [
            (MODULE_SYMBOLIC_NAME, "com.acme.composite"),
            (COMPOSITE_PACKAGE_IMPORT_POLICY, imports),
        ]
        .into_iter()
        .collect()
    }

    fn constituent(name: &str) -> InstallRequest {
        let manifest: Manifest = [(MODULE_SYMBOLIC_NAME, name), (MODULE_MANIFEST_VERSION, "2")]
            .into_iter()
            .collect();
        InstallRequest::new(format!("mem:{name}"), manifest)
    }

    #[test]
    fn install_links_node_and_registers_anchor() {
        let mut fx = Fixture::new();
        let composite = fx.install(&composite_manifest("com.acme.*"));
        assert_eq!(composite.state(), ModuleState::Installed);
        assert_eq!(composite.symbolic_name(), "com.acme.composite");
        assert_eq!(fx.tree.children(fx.tree.root()), &[composite.node()]);
        assert_eq!(composite.anchor().composite_id(), composite.composite_id());
        assert!(fx.runtime.anchor_of(composite.id()).is_some());
        assert_eq!(
            composite.content().configuration().unwrap().get("owner"),
            Some("tests")
        );
    }

    #[test]
    fn install_rejects_invalid_manifest_without_touching_tree() {
        let mut fx = Fixture::new();
        let mut manifest = composite_manifest("com.acme.*");
        manifest.insert(IMPORT_PACKAGE, "com.acme.api");
        let result = CompositeModule::install(
            ModuleId::new(50),
            ModuleId::ROOT,
            &manifest,
            &CompositeConfiguration::new(),
            true,
            fx.services.clone(),
            &mut fx.tree,
        );
        assert!(result.unwrap_err().is_manifest());
        assert_eq!(fx.tree.len(), 1);
    }

    #[test]
    fn install_under_unknown_parent_fails() {
        let mut fx = Fixture::new();
        let err = CompositeModule::install(
            ModuleId::new(50),
            ModuleId::new(42),
            &composite_manifest("a"),
            &CompositeConfiguration::new(),
            true,
            fx.services.clone(),
            &mut fx.tree,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CairnError::Lifecycle(LifecycleError::NotFound(id)) if id == ModuleId::new(42)
        ));
    }

    #[test]
    fn unlinked_install_has_no_parent_and_no_tracker() {
        let mut fx = Fixture::new();
        let composite = CompositeModule::install(
            ModuleId::new(50),
            ModuleId::ROOT,
            &composite_manifest("a"),
            &CompositeConfiguration::new(),
            false,
            fx.services.clone(),
            &mut fx.tree,
        )
        .unwrap();
        assert_eq!(fx.tree.parent(composite.node()), None);
        let context = composite.anchor().create_execution_context().unwrap();
        assert_eq!(context.listener_count(), 0);
    }

    #[test]
    fn start_resolves_and_raises_level_once() {
        let mut fx = Fixture::new();
        let mut composite = fx.install(&composite_manifest("a"));
        composite.start().unwrap();
        assert_eq!(composite.state(), ModuleState::Active);
        composite.start().unwrap();

        let controller = fx.levels.controller_for(composite.id());
        assert_eq!(controller.set_level_count(BASELINE_START_LEVEL), 1);
        assert_eq!(controller.level(), BASELINE_START_LEVEL);
        assert_eq!(
            controller.calls(),
            vec![StartLevelCall::Initialize, StartLevelCall::SetLevel(1)]
        );
    }

    #[test]
    fn failed_start_level_rolls_back_to_resolved() {
        let mut fx = Fixture::new();
        let mut composite = fx.install(&composite_manifest("a"));
        fx.levels.controller_for(composite.id()).fail_initialize(true);
        assert!(composite.start().is_err());
        assert_eq!(composite.state(), ModuleState::Resolved);
    }

    #[test]
    fn start_requires_permission() {
        let mut fx = Fixture::new();
        let mut composite = fx.install(&composite_manifest("a"));
        fx.runtime.deny_permission(composite.id());
        let err = composite.start().unwrap_err();
        assert!(matches!(
            err,
            CairnError::Lifecycle(LifecycleError::PermissionDenied { .. })
        ));
        assert_eq!(composite.state(), ModuleState::Installed);
    }

    #[test]
    fn stop_shuts_down_then_cleans_up() {
        let mut fx = Fixture::new();
        let mut composite = fx.install(&composite_manifest("a"));
        composite.start().unwrap();
        composite.stop().unwrap();
        assert_eq!(composite.state(), ModuleState::Resolved);
        let calls = fx.levels.controller_for(composite.id()).calls();
        assert_eq!(
            &calls[2..],
            &[StartLevelCall::Shutdown, StartLevelCall::Cleanup]
        );
        // 비활성 상태의 정지는 무시됩니다.
        composite.stop().unwrap();
        assert_eq!(fx.levels.controller_for(composite.id()).calls().len(), 4);
    }

    #[test]
    fn refresh_rebuilds_registry() {
        let mut fx = Fixture::new();
        let mut composite = fx.install(&composite_manifest("a"));
        fx.runtime.install(composite.id(), constituent("com.acme.api")).unwrap();
        composite.refresh().unwrap();
        assert_eq!(composite.state(), ModuleState::Resolved);
        assert_eq!(composite.constituents().len(), 1);
        composite.refresh().unwrap();
        assert_eq!(composite.constituents().len(), 1);

        composite.start().unwrap();
        assert!(composite.refresh().is_err());
    }

    #[test]
    fn load_only_from_installed() {
        let mut fx = Fixture::new();
        let mut composite = fx.install(&composite_manifest("a"));
        composite.load().unwrap();
        assert!(composite.load().is_err());
    }

    #[test]
    fn update_merges_policy_in_place() {
        let mut fx = Fixture::new();
        let mut composite = fx.install(&composite_manifest("com.acme.api"));
        let node = composite.node();
        composite
            .update(&mut fx.tree, &composite_manifest("com.acme.*"))
            .unwrap();
        assert_eq!(composite.node(), node);
        let policy = composite.policy(&fx.tree).unwrap();
        assert!(policy.imports_package("com.acme.util", &Version::new(1, 0, 0)));
        assert_eq!(fx.tree.children(fx.tree.root()), &[node]);
        // 설정 항목은 새 컨텐츠로 이어집니다.
        assert!(composite.content().entry(COMPOSITE_CONFIGURATION_ENTRY).is_some());
    }

    #[test]
    fn update_restarts_active_composite() {
        let mut fx = Fixture::new();
        let mut composite = fx.install(&composite_manifest("a"));
        composite.start().unwrap();
        composite.update(&mut fx.tree, &composite_manifest("b")).unwrap();
        assert_eq!(composite.state(), ModuleState::Active);
        let controller = fx.levels.controller_for(composite.id());
        assert_eq!(controller.set_level_count(BASELINE_START_LEVEL), 2);
    }

    #[test]
    fn failed_update_changes_nothing() {
        let mut fx = Fixture::new();
        let mut composite = fx.install(&composite_manifest("com.acme.api"));
        composite.start().unwrap();
        let before_manifest = composite.manifest().clone();
        let before_policy = composite.policy(&fx.tree).cloned();

        let mut bad = composite_manifest("com.acme.*");
        bad.insert(COMPOSITE_SERVICE_IMPORT_POLICY, "(objectClass=broken");
        assert!(composite.update(&mut fx.tree, &bad).unwrap_err().is_manifest());

        assert_eq!(composite.manifest(), &before_manifest);
        assert_eq!(composite.policy(&fx.tree).cloned(), before_policy);
        assert_eq!(composite.state(), ModuleState::Active);
    }

    #[test]
    fn restart_failure_after_swap_keeps_update() {
        let mut fx = Fixture::new();
        let mut composite = fx.install(&composite_manifest("com.acme.api"));
        composite.start().unwrap();
        let node = composite.node();
        fx.levels.controller_for(composite.id()).fail_initialize(true);

        composite
            .update(&mut fx.tree, &composite_manifest("com.acme.*"))
            .expect("update succeeds once the swap is done");

        let policy = composite.policy(&fx.tree).unwrap();
        assert!(policy.imports_package("com.acme.util", &Version::new(1, 0, 0)));
        assert_eq!(
            composite.manifest().get(COMPOSITE_PACKAGE_IMPORT_POLICY),
            Some("com.acme.*")
        );
        assert!(composite.content().entry(COMPOSITE_CONFIGURATION_ENTRY).is_some());
        assert_eq!(composite.node(), node);
        assert_eq!(composite.state(), ModuleState::Resolved);
    }

    #[test]
    fn update_without_configuration_entry_fails_before_swap() {
        let mut fx = Fixture::new();
        let mut composite = fx.install(&composite_manifest("a"));
        composite.content = ModuleContent::new(composite.manifest().clone());
        let before = composite.policy(&fx.tree).cloned();
        let err = composite
            .update(&mut fx.tree, &composite_manifest("b"))
            .unwrap_err();
        assert!(matches!(
            err,
            CairnError::Lifecycle(LifecycleError::Resource { .. })
        ));
        assert_eq!(composite.policy(&fx.tree).cloned(), before);
    }

    #[test]
    fn byte_stream_update_is_unsupported() {
        let mut fx = Fixture::new();
        let composite = fx.install(&composite_manifest("a"));
        assert!(composite.update_bytes(b"jar").unwrap_err().is_unsupported());
    }

    #[test]
    fn uninstall_cascades_and_publishes_failures() {
        let mut fx = Fixture::new();
        let mut composite = fx.install(&composite_manifest("a"));
        let context = composite.anchor().create_execution_context().unwrap();
        let ids: Vec<ModuleId> = ["x", "y", "z"]
            .iter()
            .map(|name| context.install_module(constituent(name)).unwrap().id())
            .collect();
        fx.runtime.fail_on_uninstall(ids[1]);

        let report = composite.uninstall().unwrap();
        assert_eq!(report.uninstalled, vec![ids[0], ids[2]]);
        assert_eq!(report.failed, vec![ids[1]]);
        assert!(!report.is_clean());

        let errors = fx.runtime.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].cause.module, ids[1]);
        assert_eq!(errors[0].cause.composite, composite.id());
        assert!(!context.is_valid());
    }

    #[test]
    fn uninstall_twice_is_invalid_state() {
        let mut fx = Fixture::new();
        let mut composite = fx.install(&composite_manifest("a"));
        composite.uninstall().unwrap();
        assert!(matches!(
            composite.uninstall(),
            Err(CairnError::Lifecycle(LifecycleError::InvalidState { .. }))
        ));
        assert!(composite.start().is_err());
    }

    #[test]
    fn close_requires_uninstall_and_detaches_once() {
        let mut fx = Fixture::new();
        let mut composite = fx.install(&composite_manifest("a"));
        assert!(composite.close(&mut fx.tree).is_err());

        composite.uninstall().unwrap();
        composite.close(&mut fx.tree).unwrap();
        assert!(fx.tree.children(fx.tree.root()).is_empty());
        assert_eq!(composite.anchor().state(), ModuleState::Uninstalled);
        assert!(fx.runtime.anchor_of(composite.id()).is_none());
        assert!(composite.constituents().is_empty());
        assert!(composite.close(&mut fx.tree).is_err());
    }
}
