//! 앵커 모듈 -- 컴포지트 자신의 실행 신원
//!
//! [`AnchorDelegate`]는 컴포지트 내부에서 식별자 `0`으로 보이는 제한된 모듈입니다.
//! 상태는 생성 시점부터 `STARTING`으로 고정되며, 시작/정지/제거/업데이트는
//! 항상 [`CairnError::Unsupported`]로 거부됩니다. 컴포지트 종료만이 앵커를 닫을 수 있습니다.
//!
//! [`AnchorContext`]는 앵커에 묶인 실행 컨텍스트입니다. 컴포지트 안에 모듈을
//! 설치하고 리스너에게 이벤트를 동기적으로 전달합니다. 컴포지트가 제거되면
//! 무효화되며, 이후 모든 연산은 [`LifecycleError::ContextInvalid`]로 실패합니다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use cairn_core::error::{CairnError, LifecycleError};
use cairn_core::event::ModuleEvent;
use cairn_core::filter::Filter;
use cairn_core::runtime::{
    FilterCompiler, InstallRequest, ModuleHandle, ModuleListener, RootAnchor, RootRuntime,
};
use cairn_core::types::{ModuleDescriptor, ModuleId, ModuleState, ServiceReference};

fn recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── AnchorContext ───────────────────────────────────────────────────

/// 앵커에 묶인 실행 컨텍스트
pub struct AnchorContext {
    composite_id: ModuleId,
    valid: AtomicBool,
    runtime: Arc<dyn RootRuntime>,
    filters: Arc<dyn FilterCompiler>,
    listeners: Mutex<Vec<Arc<dyn ModuleListener>>>,
}

impl AnchorContext {
    fn new(
        composite_id: ModuleId,
        runtime: Arc<dyn RootRuntime>,
        filters: Arc<dyn FilterCompiler>,
    ) -> Self {
        Self {
            composite_id,
            valid: AtomicBool::new(true),
            runtime,
            filters,
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn ensure_valid(&self) -> Result<(), CairnError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(LifecycleError::ContextInvalid {
                composite: self.composite_id,
            }
            .into())
        }
    }

    /// 컨텍스트가 아직 유효한지 확인합니다.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// 컨텍스트가 속한 컴포지트
    pub fn composite_id(&self) -> Result<ModuleId, CairnError> {
        self.ensure_valid()?;
        Ok(self.composite_id)
    }

    /// 서비스 필터를 컴파일합니다.
    pub fn create_filter(&self, filter: &str) -> Result<Filter, CairnError> {
        self.ensure_valid()?;
        Ok(self.filters.compile_filter(filter)?)
    }

    /// 컴포지트 안에 모듈을 설치하고 `INSTALLED` 이벤트를 리스너에게 전달합니다.
    pub fn install_module(
        &self,
        request: InstallRequest,
    ) -> Result<Arc<dyn ModuleHandle>, CairnError> {
        self.ensure_valid()?;
        let module = self.runtime.install_module(self.composite_id, request)?;
        info!(
            composite_id = %self.composite_id,
            module_id = %module.id(),
            symbolic_name = module.symbolic_name(),
            "module installed into composite"
        );
        self.dispatch(&ModuleEvent::installed(module.id(), self.composite_id))?;
        Ok(module)
    }

    /// 모듈 리스너를 등록합니다.
    pub fn add_module_listener(&self, listener: Arc<dyn ModuleListener>) -> Result<(), CairnError> {
        self.ensure_valid()?;
        recover(&self.listeners).push(listener);
        Ok(())
    }

    /// 등록된 리스너 수
    pub fn listener_count(&self) -> usize {
        recover(&self.listeners).len()
    }

    /// 이벤트를 호출자 스레드에서 모든 리스너에게 전달합니다.
    pub fn dispatch(&self, event: &ModuleEvent) -> Result<(), CairnError> {
        self.ensure_valid()?;
        // 리스너 호출 중에는 잠금을 잡지 않습니다.
        let listeners = recover(&self.listeners).clone();
        debug!(
            composite_id = %self.composite_id,
            event = %event,
            listeners = listeners.len(),
            "dispatching module event"
        );
        for listener in listeners {
            listener.module_changed(event);
        }
        Ok(())
    }

    pub(crate) fn invalidate(&self) {
        if self.valid.swap(false, Ordering::AcqRel) {
            recover(&self.listeners).clear();
            debug!(composite_id = %self.composite_id, "execution context invalidated");
        }
    }
}

impl std::fmt::Debug for AnchorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorContext")
            .field("composite_id", &self.composite_id)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

// ─── AnchorDelegate ──────────────────────────────────────────────────

/// 컴포지트의 앵커 모듈
pub struct AnchorDelegate {
    composite_id: ModuleId,
    symbolic_name: String,
    state: Mutex<ModuleState>,
    root: Arc<dyn RootAnchor>,
    runtime: Arc<dyn RootRuntime>,
    filters: Arc<dyn FilterCompiler>,
    propagate_to: Option<Arc<dyn ModuleListener>>,
    context: Mutex<Option<Arc<AnchorContext>>>,
}

impl AnchorDelegate {
    /// 새 앵커를 생성합니다. 상태는 `STARTING`입니다.
    pub fn new(
        composite_id: ModuleId,
        symbolic_name: impl Into<String>,
        root: Arc<dyn RootAnchor>,
        runtime: Arc<dyn RootRuntime>,
        filters: Arc<dyn FilterCompiler>,
    ) -> Self {
        Self {
            composite_id,
            symbolic_name: symbolic_name.into(),
            state: Mutex::new(ModuleState::Starting),
            root,
            runtime,
            filters,
            propagate_to: None,
            context: Mutex::new(None),
        }
    }

    /// 실행 컨텍스트의 이벤트를 전달받을 구성 모듈 추적기를 지정합니다.
    pub fn propagating_to(mut self, tracker: Arc<dyn ModuleListener>) -> Self {
        self.propagate_to = Some(tracker);
        self
    }

    /// 앵커를 소유한 컴포지트
    pub fn composite_id(&self) -> ModuleId {
        self.composite_id
    }

    /// 현재 상태
    pub fn state(&self) -> ModuleState {
        *recover(&self.state)
    }

    /// 루트 앵커에 등록된 서비스 목록
    ///
    /// 컴포지트 범위로 걸러지지 않은 전체 목록입니다.
    pub fn registered_services(&self) -> Vec<ServiceReference> {
        self.root.registered_services()
    }

    /// 루트 앵커가 사용 중인 서비스 목록 (컴포지트 범위로 걸러지지 않음)
    pub fn services_in_use(&self) -> Vec<ServiceReference> {
        self.root.services_in_use()
    }

    fn forbidden(&self, action: &str) -> CairnError {
        CairnError::unsupported(format!(
            "{action} the anchor module of composite {}",
            self.composite_id
        ))
    }

    /// 항상 실패합니다.
    pub fn start(&self) -> Result<(), CairnError> {
        Err(self.forbidden("start"))
    }

    /// 항상 실패합니다.
    pub fn stop(&self) -> Result<(), CairnError> {
        Err(self.forbidden("stop"))
    }

    /// 항상 실패합니다.
    pub fn update_bytes(&self, _content: &[u8]) -> Result<(), CairnError> {
        Err(self.forbidden("update"))
    }

    /// 실행 컨텍스트를 생성합니다. 이미 있으면 기존 컨텍스트를 반환합니다.
    ///
    /// 추적기가 지정되어 있으면 컨텍스트의 리스너로 등록됩니다.
    pub fn create_execution_context(&self) -> Result<Arc<AnchorContext>, CairnError> {
        let mut slot = recover(&self.context);
        if let Some(context) = slot.as_ref() {
            return Ok(Arc::clone(context));
        }
        if self.state() == ModuleState::Uninstalled {
            return Err(LifecycleError::ContextInvalid {
                composite: self.composite_id,
            }
            .into());
        }

        let context = Arc::new(AnchorContext::new(
            self.composite_id,
            Arc::clone(&self.runtime),
            Arc::clone(&self.filters),
        ));
        if let Some(tracker) = &self.propagate_to {
            context.add_module_listener(Arc::clone(tracker))?;
        }
        *slot = Some(Arc::clone(&context));
        Ok(context)
    }

    /// 생성된 실행 컨텍스트
    pub fn execution_context(&self) -> Option<Arc<AnchorContext>> {
        recover(&self.context).clone()
    }

    pub(crate) fn invalidate_context(&self) {
        if let Some(context) = recover(&self.context).as_ref() {
            context.invalidate();
        }
    }

    /// 앵커를 닫습니다. 상태가 `UNINSTALLED`가 되고 실행 컨텍스트가 무효화됩니다.
    pub(crate) fn close(&self) {
        *recover(&self.state) = ModuleState::Uninstalled;
        self.invalidate_context();
        info!(composite_id = %self.composite_id, "anchor closed");
    }
}

impl ModuleHandle for AnchorDelegate {
    fn id(&self) -> ModuleId {
        ModuleId::ANCHOR
    }

    fn composite_id(&self) -> ModuleId {
        self.composite_id
    }

    fn symbolic_name(&self) -> &str {
        &self.symbolic_name
    }

    fn state(&self) -> ModuleState {
        AnchorDelegate::state(self)
    }

    fn descriptor(&self) -> Option<Arc<ModuleDescriptor>> {
        None
    }

    fn uninstall(&self) -> Result<(), CairnError> {
        Err(self.forbidden("uninstall"))
    }
}

impl std::fmt::Debug for AnchorDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorDelegate")
            .field("composite_id", &self.composite_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
