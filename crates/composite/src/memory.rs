//! 메모리 기반 루트 런타임
//!
//! [`InMemoryRuntime`]은 [`RootRuntime`]과 [`RootAnchor`]를 함께 구현하는 참조 런타임입니다.
//! 모듈 테이블, 게시된 에러 이벤트, 서비스 목록을 메모리에 보관합니다.
//! CLI 시뮬레이션과 테스트에서 사용합니다.
//!
//! [`RecordingStartLevel`]은 호출 순서를 기록하는 시작 레벨 컨트롤러입니다.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use cairn_core::error::{CairnError, CascadeFailure, LifecycleError};
use cairn_core::event::FrameworkEvent;
use cairn_core::header::HeaderResolver;
use cairn_core::runtime::{
    InstallRequest, ModuleHandle, RootAnchor, RootRuntime, StartLevelController,
};
use cairn_core::types::{
    ModuleDescriptor, ModuleId, ModuleState, ServiceProperties, ServiceReference,
};

use crate::lifecycle::StartLevelFactory;

fn recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── MemoryModule ────────────────────────────────────────────────────

/// 메모리 런타임에 설치된 모듈
#[derive(Debug)]
pub struct MemoryModule {
    id: ModuleId,
    composite_id: ModuleId,
    symbolic_name: String,
    location: String,
    state: Mutex<ModuleState>,
    descriptor: Option<Arc<ModuleDescriptor>>,
    fail_uninstall: AtomicBool,
}

impl MemoryModule {
    fn new(
        id: ModuleId,
        composite_id: ModuleId,
        symbolic_name: String,
        location: String,
        descriptor: Option<Arc<ModuleDescriptor>>,
    ) -> Self {
        let state = if descriptor.is_some() {
            ModuleState::Resolved
        } else {
            ModuleState::Installed
        };
        Self {
            id,
            composite_id,
            symbolic_name,
            location,
            state: Mutex::new(state),
            descriptor,
            fail_uninstall: AtomicBool::new(false),
        }
    }

    /// 설치 위치
    pub fn location(&self) -> &str {
        &self.location
    }

    /// 이후의 제거 요청을 실패시킵니다.
    pub fn fail_on_uninstall(&self) {
        self.fail_uninstall.store(true, Ordering::Release);
    }

    fn is_live(&self) -> bool {
        !recover(&self.state).is_terminal()
    }
}

impl ModuleHandle for MemoryModule {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn composite_id(&self) -> ModuleId {
        self.composite_id
    }

    fn symbolic_name(&self) -> &str {
        &self.symbolic_name
    }

    fn state(&self) -> ModuleState {
        *recover(&self.state)
    }

    fn descriptor(&self) -> Option<Arc<ModuleDescriptor>> {
        self.descriptor.clone()
    }

    fn uninstall(&self) -> Result<(), CairnError> {
        let mut state = recover(&self.state);
        if state.is_terminal() {
            return Err(LifecycleError::InvalidState {
                module: self.id,
                state: state.to_string(),
                operation: "uninstall".to_owned(),
            }
            .into());
        }
        if self.fail_uninstall.load(Ordering::Acquire) {
            return Err(LifecycleError::Failed(format!(
                "module {} ({}) refused to uninstall",
                self.id, self.symbolic_name
            ))
            .into());
        }
        *state = ModuleState::Uninstalled;
        debug!(module_id = %self.id, composite_id = %self.composite_id, "module uninstalled");
        Ok(())
    }
}

// ─── InMemoryRuntime ─────────────────────────────────────────────────

/// 메모리 기반 루트 런타임
pub struct InMemoryRuntime {
    resolver: HeaderResolver,
    next_id: AtomicU64,
    next_service_id: AtomicU64,
    modules: Mutex<BTreeMap<ModuleId, Arc<MemoryModule>>>,
    anchors: Mutex<HashMap<ModuleId, Arc<dyn ModuleHandle>>>,
    errors: Mutex<Vec<FrameworkEvent>>,
    services: Mutex<Vec<ServiceReference>>,
    in_use: Mutex<Vec<ServiceReference>>,
    denied: Mutex<HashSet<ModuleId>>,
}

impl InMemoryRuntime {
    /// 빈 런타임을 생성합니다. 모듈 식별자는 `1`부터 발급됩니다.
    pub fn new() -> Self {
        Self {
            resolver: HeaderResolver::new(),
            next_id: AtomicU64::new(1),
            next_service_id: AtomicU64::new(1),
            modules: Mutex::new(BTreeMap::new()),
            anchors: Mutex::new(HashMap::new()),
            errors: Mutex::new(Vec::new()),
            services: Mutex::new(Vec::new()),
            in_use: Mutex::new(Vec::new()),
            denied: Mutex::new(HashSet::new()),
        }
    }

    /// 모듈을 설치하고 의존성 설명을 해석합니다.
    ///
    /// 매니페스트를 해석할 수 없으면 아무것도 설치하지 않고 실패합니다.
    pub fn install(
        &self,
        composite: ModuleId,
        request: InstallRequest,
    ) -> Result<Arc<MemoryModule>, CairnError> {
        let id = self.next_module_id();
        let descriptor = self.resolver.describe(id, &request.manifest)?;
        let module = Arc::new(MemoryModule::new(
            id,
            composite,
            descriptor.symbolic_name.clone(),
            request.location,
            Some(Arc::new(descriptor)),
        ));
        recover(&self.modules).insert(id, Arc::clone(&module));
        debug!(module_id = %id, composite_id = %composite, "module installed");
        Ok(module)
    }

    /// 의존성 설명이 없는 (해석되지 않은) 모듈을 추가합니다.
    pub fn add_unresolved(&self, composite: ModuleId, symbolic_name: &str) -> Arc<MemoryModule> {
        let id = self.next_module_id();
        let module = Arc::new(MemoryModule::new(
            id,
            composite,
            symbolic_name.to_owned(),
            format!("mem:{symbolic_name}"),
            None,
        ));
        recover(&self.modules).insert(id, Arc::clone(&module));
        module
    }

    /// 컴포지트에 식별자 `0`의 자리표시 앵커를 붙입니다.
    pub fn attach_placeholder_anchor(&self, composite: ModuleId) {
        let anchor = Arc::new(MemoryModule::new(
            ModuleId::ANCHOR,
            composite,
            format!("anchor@{composite}"),
            String::new(),
            None,
        ));
        self.register_anchor(composite, anchor);
    }

    /// 모듈이 다음 제거 요청에 실패하도록 표시합니다.
    pub fn fail_on_uninstall(&self, module: ModuleId) -> bool {
        match recover(&self.modules).get(&module) {
            Some(m) => {
                m.fail_on_uninstall();
                true
            }
            None => false,
        }
    }

    /// 모듈의 생명주기 권한을 거부합니다.
    pub fn deny_permission(&self, module: ModuleId) {
        recover(&self.denied).insert(module);
    }

    /// 거부했던 권한을 다시 허용합니다.
    pub fn grant_permission(&self, module: ModuleId) {
        recover(&self.denied).remove(&module);
    }

    /// 루트 앵커에 서비스를 등록합니다.
    pub fn register_service(
        &self,
        owner: ModuleId,
        properties: ServiceProperties,
    ) -> ServiceReference {
        let reference = ServiceReference {
            service_id: self.next_service_id.fetch_add(1, Ordering::Relaxed),
            owner,
            properties,
        };
        recover(&self.services).push(reference.clone());
        reference
    }

    /// 서비스를 루트 앵커가 사용 중인 것으로 표시합니다.
    pub fn use_service(&self, reference: &ServiceReference) {
        recover(&self.in_use).push(reference.clone());
    }

    /// 게시된 에러 이벤트
    pub fn errors(&self) -> Vec<FrameworkEvent> {
        recover(&self.errors).clone()
    }

    /// 컴포지트에 등록된 앵커
    pub fn anchor_of(&self, composite: ModuleId) -> Option<Arc<dyn ModuleHandle>> {
        recover(&self.anchors).get(&composite).cloned()
    }

    /// 제거되지 않은 모듈 수 (앵커 제외)
    pub fn live_modules(&self) -> usize {
        recover(&self.modules).values().filter(|m| m.is_live()).count()
    }
}

impl Default for InMemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl RootRuntime for InMemoryRuntime {
    fn modules_under(&self, composite: ModuleId) -> Vec<Arc<dyn ModuleHandle>> {
        let mut out: Vec<Arc<dyn ModuleHandle>> = Vec::new();
        if let Some(anchor) = self.anchor_of(composite) {
            out.push(anchor);
        }
        out.extend(
            recover(&self.modules)
                .values()
                .filter(|m| m.composite_id == composite && m.is_live())
                .map(|m| Arc::clone(m) as Arc<dyn ModuleHandle>),
        );
        out
    }

    fn module(&self, id: ModuleId) -> Option<Arc<dyn ModuleHandle>> {
        recover(&self.modules)
            .get(&id)
            .filter(|m| m.is_live())
            .map(|m| Arc::clone(m) as Arc<dyn ModuleHandle>)
    }

    fn publish_error(&self, module: ModuleId, cause: CascadeFailure) {
        warn!(module_id = %module, composite_id = %cause.composite, reason = %cause.reason, "framework error published");
        recover(&self.errors).push(FrameworkEvent::error(module, cause));
    }

    fn require_lifecycle_permission(&self, module: ModuleId) -> Result<(), CairnError> {
        if recover(&self.denied).contains(&module) {
            return Err(LifecycleError::PermissionDenied {
                module,
                reason: "lifecycle permission not granted".to_owned(),
            }
            .into());
        }
        Ok(())
    }

    fn install_module(
        &self,
        composite: ModuleId,
        request: InstallRequest,
    ) -> Result<Arc<dyn ModuleHandle>, CairnError> {
        let module: Arc<dyn ModuleHandle> = self.install(composite, request)?;
        Ok(module)
    }

    fn next_module_id(&self) -> ModuleId {
        ModuleId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn register_anchor(&self, composite: ModuleId, anchor: Arc<dyn ModuleHandle>) {
        recover(&self.anchors).insert(composite, anchor);
    }

    fn remove_anchor(&self, composite: ModuleId) {
        recover(&self.anchors).remove(&composite);
    }
}

impl RootAnchor for InMemoryRuntime {
    fn registered_services(&self) -> Vec<ServiceReference> {
        recover(&self.services).clone()
    }

    fn services_in_use(&self) -> Vec<ServiceReference> {
        recover(&self.in_use).clone()
    }
}

impl std::fmt::Debug for InMemoryRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRuntime")
            .field("modules", &recover(&self.modules).len())
            .field("anchors", &recover(&self.anchors).len())
            .field("errors", &recover(&self.errors).len())
            .finish_non_exhaustive()
    }
}

// ─── RecordingStartLevel ─────────────────────────────────────────────

/// 시작 레벨 컨트롤러 호출 기록
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartLevelCall {
    Initialize,
    SetLevel(u32),
    Shutdown,
    Cleanup,
}

/// 호출을 기록하는 시작 레벨 컨트롤러
#[derive(Debug, Default)]
pub struct RecordingStartLevel {
    calls: Mutex<Vec<StartLevelCall>>,
    level: AtomicU32,
    fail_initialize: AtomicBool,
}

impl RecordingStartLevel {
    /// 새 컨트롤러 (레벨 0)
    pub fn new() -> Self {
        Self::default()
    }

    /// 이후의 `initialize` 호출을 실패시킵니다.
    pub fn fail_initialize(&self, fail: bool) {
        self.fail_initialize.store(fail, Ordering::Release);
    }

    /// 지금까지의 호출 순서
    pub fn calls(&self) -> Vec<StartLevelCall> {
        recover(&self.calls).clone()
    }

    /// 특정 레벨로 설정된 횟수
    pub fn set_level_count(&self, level: u32) -> usize {
        recover(&self.calls)
            .iter()
            .filter(|c| **c == StartLevelCall::SetLevel(level))
            .count()
    }

    fn record(&self, call: StartLevelCall) {
        recover(&self.calls).push(call);
    }
}

impl StartLevelController for RecordingStartLevel {
    fn initialize(&self) -> Result<(), CairnError> {
        self.record(StartLevelCall::Initialize);
        if self.fail_initialize.load(Ordering::Acquire) {
            return Err(LifecycleError::Failed("start level initialization failed".to_owned()).into());
        }
        Ok(())
    }

    fn set_level(&self, level: u32) -> Result<(), CairnError> {
        self.record(StartLevelCall::SetLevel(level));
        self.level.store(level, Ordering::Release);
        Ok(())
    }

    fn shutdown(&self) -> Result<(), CairnError> {
        self.record(StartLevelCall::Shutdown);
        self.level.store(0, Ordering::Release);
        Ok(())
    }

    fn cleanup(&self) {
        self.record(StartLevelCall::Cleanup);
    }

    fn level(&self) -> u32 {
        self.level.load(Ordering::Acquire)
    }
}

/// 컴포지트별 [`RecordingStartLevel`] 모음
#[derive(Debug, Default)]
pub struct RecordingStartLevels {
    controllers: Mutex<HashMap<ModuleId, Arc<RecordingStartLevel>>>,
}

impl RecordingStartLevels {
    /// 빈 모음
    pub fn new() -> Self {
        Self::default()
    }

    /// 컴포지트의 컨트롤러 (없으면 생성)
    pub fn controller_for(&self, composite: ModuleId) -> Arc<RecordingStartLevel> {
        Arc::clone(recover(&self.controllers).entry(composite).or_default())
    }

    /// 컴포지트 생명주기에 넘길 팩토리
    pub fn factory(self: &Arc<Self>) -> StartLevelFactory {
        let levels = Arc::clone(self);
        Arc::new(move |composite| levels.controller_for(composite) as Arc<dyn StartLevelController>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::types::{MODULE_MANIFEST_VERSION, MODULE_SYMBOLIC_NAME, Manifest};

    fn request(name: &str) -> InstallRequest {
        let manifest: Manifest = [(MODULE_SYMBOLIC_NAME, name), (MODULE_MANIFEST_VERSION, "2")]
            .into_iter()
            .collect();
        InstallRequest::new(format!("mem:{name}"), manifest)
    }

    #[test]
    fn install_assigns_increasing_ids_and_descriptor() {
        let runtime = InMemoryRuntime::new();
        let a = runtime.install(ModuleId::new(5), request("a")).unwrap();
        let b = runtime.install(ModuleId::new(5), request("b")).unwrap();
        assert!(a.id() < b.id());
        assert_eq!(a.state(), ModuleState::Resolved);
        assert_eq!(a.descriptor().unwrap().symbolic_name, "a");
        assert_eq!(a.location(), "mem:a");
    }

    #[test]
    fn install_rejects_unparsable_manifest() {
        let runtime = InMemoryRuntime::new();
        let manifest: Manifest = [(MODULE_SYMBOLIC_NAME, "a")].into_iter().collect();
        let err = runtime
            .install(ModuleId::new(5), InstallRequest::new("mem:a", manifest))
            .unwrap_err();
        assert!(err.is_manifest());
        assert_eq!(runtime.live_modules(), 0);
    }

    #[test]
    fn modules_under_lists_anchor_first_and_skips_uninstalled() {
        let runtime = InMemoryRuntime::new();
        let composite = ModuleId::new(5);
        runtime.attach_placeholder_anchor(composite);
        let a = runtime.install(composite, request("a")).unwrap();
        let b = runtime.install(composite, request("b")).unwrap();
        b.uninstall().unwrap();

        let ids: Vec<ModuleId> = runtime.modules_under(composite).iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec![ModuleId::ANCHOR, a.id()]);
        assert!(runtime.module(b.id()).is_none());
    }

    #[test]
    fn flagged_module_refuses_uninstall() {
        let runtime = InMemoryRuntime::new();
        let a = runtime.install(ModuleId::new(5), request("a")).unwrap();
        assert!(runtime.fail_on_uninstall(a.id()));
        assert!(a.uninstall().is_err());
        assert_eq!(a.state(), ModuleState::Resolved);
        assert!(!runtime.fail_on_uninstall(ModuleId::new(999)));
    }

    #[test]
    fn double_uninstall_is_invalid_state() {
        let runtime = InMemoryRuntime::new();
        let a = runtime.install(ModuleId::new(5), request("a")).unwrap();
        a.uninstall().unwrap();
        assert!(matches!(
            a.uninstall(),
            Err(CairnError::Lifecycle(LifecycleError::InvalidState { .. }))
        ));
    }

    #[test]
    fn permission_can_be_denied_and_granted() {
        let runtime = InMemoryRuntime::new();
        let id = ModuleId::new(3);
        assert!(runtime.require_lifecycle_permission(id).is_ok());
        runtime.deny_permission(id);
        assert!(runtime.require_lifecycle_permission(id).is_err());
        runtime.grant_permission(id);
        assert!(runtime.require_lifecycle_permission(id).is_ok());
    }

    #[test]
    fn published_errors_are_recorded() {
        let runtime = InMemoryRuntime::new();
        runtime.publish_error(
            ModuleId::new(2),
            CascadeFailure {
                composite: ModuleId::new(1),
                module: ModuleId::new(2),
                reason: "locked".to_owned(),
            },
        );
        let errors = runtime.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].module_id, ModuleId::new(2));
    }

    #[test]
    fn services_registered_and_in_use() {
        let runtime = InMemoryRuntime::new();
        let first = runtime.register_service(ModuleId::new(1), ServiceProperties::new());
        let second = runtime.register_service(ModuleId::new(1), ServiceProperties::new());
        assert_ne!(first.service_id, second.service_id);
        runtime.use_service(&second);
        assert_eq!(runtime.registered_services().len(), 2);
        assert_eq!(runtime.services_in_use(), vec![second]);
    }

    #[test]
    fn recording_start_level_tracks_calls() {
        let levels = Arc::new(RecordingStartLevels::new());
        let factory = levels.factory();
        let controller = factory(ModuleId::new(4));
        controller.initialize().unwrap();
        controller.set_level(1).unwrap();
        assert_eq!(controller.level(), 1);
        controller.shutdown().unwrap();
        controller.cleanup();

        let recorded = levels.controller_for(ModuleId::new(4));
        assert_eq!(
            recorded.calls(),
            vec![
                StartLevelCall::Initialize,
                StartLevelCall::SetLevel(1),
                StartLevelCall::Shutdown,
                StartLevelCall::Cleanup,
            ]
        );
        assert_eq!(recorded.set_level_count(1), 1);
        assert_eq!(recorded.level(), 0);
    }

    #[test]
    fn failing_initialize() {
        let controller = RecordingStartLevel::new();
        controller.fail_initialize(true);
        assert!(controller.initialize().is_err());
    }
}
