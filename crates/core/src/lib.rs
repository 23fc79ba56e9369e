//! # cairn-core
//!
//! 중첩 컴포지트 런타임의 공통 기반 크레이트입니다.
//!
//! - [`error`]: 에러 분류 ([`CairnError`] 와 도메인별 하위 에러)
//! - [`config`]: `cairn.toml` 설정과 컴포지트 토폴로지 정의
//! - [`types`]: 모듈 식별자, 상태, 매니페스트, 서비스 속성
//! - [`header`]: 매니페스트 헤더 파서와 버전 범위
//! - [`filter`]: LDAP 스타일 서비스 필터
//! - [`event`]: 모듈 이벤트와 프레임워크 에러 이벤트
//! - [`runtime`]: 컴포지트가 의존하는 협력자 trait
//! - [`metrics`]: 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod header;
pub mod metrics;
pub mod runtime;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{CairnError, CascadeFailure, ConfigError, LifecycleError, ManifestError};

// 설정
pub use config::{CairnConfig, CompositeDefinition, ConstituentDefinition};

// 이벤트
pub use event::{Event, EventMetadata, FrameworkEvent, ModuleEvent, ModuleEventKind};

// 헤더/필터
pub use filter::{Filter, LdapFilterCompiler};
pub use header::{HeaderResolver, ImportSpec, RequireSpec, Version, VersionRange};

// 협력자 trait
pub use runtime::{
    DependencyResolver, FilterCompiler, InstallRequest, ManifestValidator, ModuleHandle,
    ModuleListener, ResolvedHeaders, RootAnchor, RootRuntime, StartLevelController,
};

// 도메인 타입
pub use types::{
    Manifest, ModuleDescriptor, ModuleId, ModuleState, PropertyValue, ServiceProperties,
    ServiceReference,
};
