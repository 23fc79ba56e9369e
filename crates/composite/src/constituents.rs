//! 구성 모듈 레지스트리 -- 컴포지트에 속한 모듈의 의존성 설명 집합
//!
//! [`ConstituentRegistry`]는 컴포지트 안에 현재 설치된 모듈의 해석된 설명을
//! 보관합니다. 앵커 모듈(식별자 `0`)은 절대 포함되지 않습니다.
//!
//! - `load`/`refresh` 시 [`rebuild`](ConstituentRegistry::rebuild)로 전체 재구성
//! - 설치 이벤트 수신 시 [`on_module_installed`](ConstituentRegistry::on_module_installed)로 추가
//! - 컴포지트 종료 시 [`clear`](ConstituentRegistry::clear)

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use cairn_core::event::ModuleEvent;
use cairn_core::metrics::{CONSTITUENTS, LABEL_COMPOSITE};
use cairn_core::runtime::{ModuleListener, RootRuntime};
use cairn_core::types::{ModuleDescriptor, ModuleId};

/// 컴포지트의 구성 모듈 레지스트리
///
/// 모든 접근은 내부 뮤텍스로 직렬화됩니다. 잠금이 오염되어도 내용을 복구해 계속 사용합니다.
pub struct ConstituentRegistry {
    composite_id: ModuleId,
    runtime: Arc<dyn RootRuntime>,
    constituents: Mutex<BTreeMap<ModuleId, Arc<ModuleDescriptor>>>,
}

impl ConstituentRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new(composite_id: ModuleId, runtime: Arc<dyn RootRuntime>) -> Self {
        Self {
            composite_id,
            runtime,
            constituents: Mutex::new(BTreeMap::new()),
        }
    }

    /// 레지스트리를 소유한 컴포지트
    pub fn composite_id(&self) -> ModuleId {
        self.composite_id
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ModuleId, Arc<ModuleDescriptor>>> {
        self.constituents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record_gauge(&self, len: usize) {
        metrics::gauge!(CONSTITUENTS, LABEL_COMPOSITE => self.composite_id.to_string())
            .set(len as f64);
    }

    /// 루트 런타임의 현재 모듈 목록으로 레지스트리를 다시 만듭니다.
    ///
    /// 앵커와 해석되지 않은 모듈은 건너뜁니다. 재구성 후 구성 모듈 수를 반환합니다.
    pub fn rebuild(&self) -> usize {
        let mut constituents = self.lock();
        constituents.clear();
        for module in self.runtime.modules_under(self.composite_id) {
            if module.id().is_anchor() {
                continue;
            }
            if let Some(descriptor) = module.descriptor() {
                constituents.insert(module.id(), descriptor);
            }
        }
        let len = constituents.len();
        drop(constituents);

        debug!(composite_id = %self.composite_id, constituents = len, "constituent registry rebuilt");
        self.record_gauge(len);
        len
    }

    /// 설치 이벤트를 반영합니다.
    ///
    /// 설치 이벤트가 아니거나 다른 컴포지트의 이벤트이면 무시합니다.
    /// 설명이 추가되면 `true`를 반환합니다.
    pub fn on_module_installed(&self, event: &ModuleEvent) -> bool {
        if !event.is_install()
            || event.composite_id != self.composite_id
            || event.module_id.is_anchor()
        {
            return false;
        }

        let mut constituents = self.lock();
        let Some(descriptor) = self
            .runtime
            .module(event.module_id)
            .filter(|module| module.composite_id() == self.composite_id)
            .and_then(|module| module.descriptor())
        else {
            return false;
        };
        constituents.insert(event.module_id, descriptor);
        let len = constituents.len();
        drop(constituents);

        debug!(
            composite_id = %self.composite_id,
            module_id = %event.module_id,
            "constituent added"
        );
        self.record_gauge(len);
        true
    }

    /// 현재 구성 모듈 설명의 복사본 (모듈 식별자 순)
    pub fn snapshot(&self) -> Vec<Arc<ModuleDescriptor>> {
        self.lock().values().cloned().collect()
    }

    /// 구성 모듈 수
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 모듈이 구성 모듈인지 확인합니다.
    pub fn contains(&self, module: ModuleId) -> bool {
        self.lock().contains_key(&module)
    }

    /// 모든 설명을 제거합니다.
    pub fn clear(&self) {
        self.lock().clear();
        self.record_gauge(0);
    }
}

impl ModuleListener for ConstituentRegistry {
    fn module_changed(&self, event: &ModuleEvent) {
        self.on_module_installed(event);
    }
}

impl std::fmt::Debug for ConstituentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstituentRegistry")
            .field("composite_id", &self.composite_id)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRuntime;
    use cairn_core::event::ModuleEventKind;
    use cairn_core::runtime::{InstallRequest, ModuleHandle};
    use cairn_core::types::{MODULE_MANIFEST_VERSION, MODULE_SYMBOLIC_NAME, Manifest};

    fn request(name: &str) -> InstallRequest {
        let manifest: Manifest = [(MODULE_SYMBOLIC_NAME, name), (MODULE_MANIFEST_VERSION, "2")]
            .into_iter()
            .collect();
        InstallRequest::new(format!("mem:{name}"), manifest)
    }

    fn setup() -> (Arc<InMemoryRuntime>, ConstituentRegistry) {
        let runtime = Arc::new(InMemoryRuntime::new());
        let registry = ConstituentRegistry::new(ModuleId::new(10), runtime.clone());
        (runtime, registry)
    }

    #[test]
    fn rebuild_collects_resolved_modules() {
        let (runtime, registry) = setup();
        let composite = ModuleId::new(10);
        let a = runtime.install(composite, request("a")).unwrap();
        let b = runtime.install(composite, request("b")).unwrap();
        runtime.install(ModuleId::new(11), request("elsewhere")).unwrap();

        assert_eq!(registry.rebuild(), 2);
        assert!(registry.contains(a.id()));
        assert!(registry.contains(b.id()));
        let ids: Vec<ModuleId> = registry.snapshot().iter().map(|d| d.module_id).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
    }

    #[test]
    fn rebuild_skips_anchor_and_unresolved() {
        let (runtime, registry) = setup();
        let composite = ModuleId::new(10);
        runtime.add_unresolved(composite, "pending");
        runtime.attach_placeholder_anchor(composite);
        runtime.install(composite, request("ok")).unwrap();

        assert_eq!(registry.rebuild(), 1);
        assert!(!registry.contains(ModuleId::ANCHOR));
    }

    #[test]
    fn rebuild_is_idempotent() {
        let (runtime, registry) = setup();
        runtime.install(ModuleId::new(10), request("a")).unwrap();
        registry.rebuild();
        let first = registry.snapshot();
        registry.rebuild();
        assert_eq!(registry.snapshot(), first);
    }

    #[test]
    fn rebuild_drops_uninstalled_modules() {
        let (runtime, registry) = setup();
        let a = runtime.install(ModuleId::new(10), request("a")).unwrap();
        registry.rebuild();
        a.uninstall().unwrap();
        assert_eq!(registry.rebuild(), 0);
    }

    #[test]
    fn install_event_adds_descriptor() {
        let (runtime, registry) = setup();
        let a = runtime.install(ModuleId::new(10), request("a")).unwrap();
        let added = registry.on_module_installed(&ModuleEvent::installed(a.id(), ModuleId::new(10)));
        assert!(added);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn foreign_install_event_is_ignored() {
        let (runtime, registry) = setup();
        let other = runtime.install(ModuleId::new(11), request("x")).unwrap();
        let added =
            registry.on_module_installed(&ModuleEvent::installed(other.id(), ModuleId::new(11)));
        assert!(!added);
        assert!(registry.is_empty());
    }

    #[test]
    fn install_event_naming_this_composite_for_foreign_module_is_ignored() {
        let (runtime, registry) = setup();
        let foreign = runtime.install(ModuleId::new(11), request("x")).unwrap();
        let added = registry
            .on_module_installed(&ModuleEvent::installed(foreign.id(), ModuleId::new(10)));
        assert!(!added);
        assert!(!registry.contains(foreign.id()));
        assert!(registry.is_empty());
    }

    #[test]
    fn non_install_event_is_ignored() {
        let (runtime, registry) = setup();
        let a = runtime.install(ModuleId::new(10), request("a")).unwrap();
        registry.module_changed(&ModuleEvent::new(
            ModuleEventKind::Started,
            a.id(),
            ModuleId::new(10),
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn clear_empties_registry() {
        let (runtime, registry) = setup();
        runtime.install(ModuleId::new(10), request("a")).unwrap();
        registry.rebuild();
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_install_events_are_all_recorded() {
        let (runtime, registry) = setup();
        let registry = Arc::new(registry);
        let composite = ModuleId::new(10);
        let ids: Vec<ModuleId> = (0..16)
            .map(|i| runtime.install(composite, request(&format!("m{i}"))).unwrap().id())
            .collect();

        let handles: Vec<_> = ids
            .iter()
            .map(|id| {
                let registry = Arc::clone(&registry);
                let id = *id;
                std::thread::spawn(move || {
                    registry.on_module_installed(&ModuleEvent::installed(id, composite));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 16);
    }
}
