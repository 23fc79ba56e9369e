//! 협력자 trait -- 컴포지트가 의존하는 외부 구성요소의 확장 포인트
//!
//! 컴포지트는 아래 구성요소를 직접 구현하지 않고 trait으로만 사용합니다.
//! 기본 구현은 [`HeaderResolver`](crate::header::HeaderResolver)와
//! [`LdapFilterCompiler`](crate::filter::LdapFilterCompiler)이며,
//! 루트 런타임의 메모리 구현은 `cairn-composite`의 `memory` 모듈에 있습니다.

use std::sync::Arc;

use crate::error::{CairnError, CascadeFailure, ManifestError};
use crate::event::ModuleEvent;
use crate::filter::Filter;
use crate::header::{ImportSpec, RequireSpec};
use crate::types::{Manifest, ModuleDescriptor, ModuleId, ModuleState, ServiceReference};

/// 의존성 해석 엔진이 반환하는 타입이 있는 헤더
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedHeaders {
    /// `Import-Package` 명세
    pub imports: Vec<ImportSpec>,
    /// `Require-Module` 명세
    pub requires: Vec<RequireSpec>,
}

/// 의존성 해석 엔진
///
/// 매니페스트의 헤더를 타입이 있는 명세로 변환합니다.
pub trait DependencyResolver: Send + Sync {
    /// 매니페스트를 파싱합니다.
    fn parse_descriptor(&self, manifest: &Manifest) -> Result<ResolvedHeaders, CairnError>;
}

/// 서비스 필터 컴파일러
pub trait FilterCompiler: Send + Sync {
    /// 필터 문자열을 컴파일합니다.
    fn compile_filter(&self, filter: &str) -> Result<Filter, ManifestError>;
}

/// 구조화된 매니페스트 검증기
///
/// 검증과 동시에 기본값 보정 등 매니페스트를 수정할 수 있습니다.
pub trait ManifestValidator: Send + Sync {
    /// 매니페스트를 검증합니다.
    fn validate(&self, manifest: &mut Manifest) -> Result<(), ManifestError>;
}

/// 모듈 이벤트 리스너
///
/// 실행 컨텍스트가 이벤트를 호출자 스레드에서 동기적으로 전달합니다.
pub trait ModuleListener: Send + Sync {
    /// 모듈 상태 변경을 통지받습니다.
    fn module_changed(&self, event: &ModuleEvent);
}

/// 루트 런타임에 설치된 모듈 핸들
pub trait ModuleHandle: Send + Sync {
    /// 모듈 식별자
    fn id(&self) -> ModuleId;

    /// 모듈이 속한 컴포지트
    fn composite_id(&self) -> ModuleId;

    /// 심볼릭 이름
    fn symbolic_name(&self) -> &str;

    /// 현재 생명주기 상태
    fn state(&self) -> ModuleState;

    /// 해석된 의존성 설명. 해석되지 않은 모듈은 `None`입니다.
    fn descriptor(&self) -> Option<Arc<ModuleDescriptor>>;

    /// 모듈을 제거합니다.
    fn uninstall(&self) -> Result<(), CairnError>;
}

/// 모듈 설치 요청
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    /// 설치 위치 (식별용)
    pub location: String,
    /// 모듈 매니페스트
    pub manifest: Manifest,
}

impl InstallRequest {
    /// 새 설치 요청을 생성합니다.
    pub fn new(location: impl Into<String>, manifest: Manifest) -> Self {
        Self {
            location: location.into(),
            manifest,
        }
    }
}

/// 루트 런타임
///
/// 모듈 테이블, 에러 이벤트 게시, 권한 검사를 제공합니다.
pub trait RootRuntime: Send + Sync {
    /// 컴포지트에 속한 모든 모듈을 반환합니다 (앵커 포함).
    fn modules_under(&self, composite: ModuleId) -> Vec<Arc<dyn ModuleHandle>>;

    /// 식별자로 모듈을 조회합니다.
    fn module(&self, id: ModuleId) -> Option<Arc<dyn ModuleHandle>>;

    /// 에러 이벤트를 게시합니다.
    fn publish_error(&self, module: ModuleId, cause: CascadeFailure);

    /// 생명주기 변경 권한을 검사합니다.
    fn require_lifecycle_permission(&self, module: ModuleId) -> Result<(), CairnError>;

    /// 컴포지트 안에 모듈을 설치합니다.
    fn install_module(
        &self,
        composite: ModuleId,
        request: InstallRequest,
    ) -> Result<Arc<dyn ModuleHandle>, CairnError>;

    /// 새 모듈 식별자를 할당합니다.
    fn next_module_id(&self) -> ModuleId;

    /// 컴포지트의 앵커 모듈을 등록합니다. 앵커는 식별자 `0`으로 보입니다.
    fn register_anchor(&self, composite: ModuleId, anchor: Arc<dyn ModuleHandle>);

    /// 컴포지트의 앵커 모듈 등록을 해제합니다.
    fn remove_anchor(&self, composite: ModuleId);
}

/// 루트 앵커 -- 서비스 조회 위임 대상
pub trait RootAnchor: Send + Sync {
    /// 등록된 서비스 목록
    fn registered_services(&self) -> Vec<ServiceReference>;

    /// 사용 중인 서비스 목록
    fn services_in_use(&self) -> Vec<ServiceReference>;
}

/// 컴포지트 단위 시작 레벨 제어기
pub trait StartLevelController: Send + Sync {
    /// 제어기를 초기화합니다.
    fn initialize(&self) -> Result<(), CairnError>;

    /// 활성 시작 레벨을 변경합니다.
    fn set_level(&self, level: u32) -> Result<(), CairnError>;

    /// 모든 모듈을 정지시키고 레벨을 0으로 내립니다.
    fn shutdown(&self) -> Result<(), CairnError>;

    /// 내부 자원을 정리합니다.
    fn cleanup(&self);

    /// 현재 활성 시작 레벨
    fn level(&self) -> u32;
}
