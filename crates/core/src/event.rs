//! 이벤트 시스템 -- 모듈 생명주기와 프레임워크 에러 통지
//!
//! [`EventMetadata`]는 모든 이벤트에 공통으로 포함되는 메타데이터이며,
//! [`Event`] trait은 모든 이벤트 타입이 구현해야 하는 인터페이스입니다.
//!
//! - [`ModuleEvent`]: 모듈 설치/해석/시작/정지/업데이트/제거 통지.
//!   실행 컨텍스트가 리스너에게 동기적으로 전달합니다.
//! - [`FrameworkEvent`]: 루트 런타임에 게시되는 에러 이벤트.
//!   연쇄 제거 실패([`CascadeFailure`])를 담습니다.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::CascadeFailure;
use crate::types::ModuleId;

// --- 소스명 상수 ---

/// 컴포지트 생명주기 소스명
pub const SOURCE_COMPOSITE: &str = "composite";
/// 실행 컨텍스트 소스명
pub const SOURCE_ANCHOR_CONTEXT: &str = "anchor-context";

// --- 이벤트 타입 상수 ---

/// 모듈 이벤트 타입
pub const EVENT_TYPE_MODULE: &str = "module";
/// 프레임워크 에러 이벤트 타입
pub const EVENT_TYPE_FRAMEWORK_ERROR: &str = "framework-error";

/// 이벤트 메타데이터 -- 모든 이벤트에 공통으로 포함되는 추적 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 이벤트 발생 시각
    pub timestamp: SystemTime,
    /// 이벤트를 생성한 소스명 (예: "composite", "anchor-context")
    pub source_module: String,
    /// 추적 ID -- 같은 흐름의 이벤트를 연결합니다
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id를 사용하여 새 메타데이터를 생성합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 새로운 UUID v4 trace_id를 생성하여 메타데이터를 만듭니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self::new(source_module, uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] source={} trace={}",
            unix_timestamp_str(self.timestamp),
            self.source_module,
            self.trace_id,
        )
    }
}

/// 모든 이벤트가 구현해야 하는 기본 trait
pub trait Event: Send + Sync + 'static {
    /// 이벤트 고유 ID (UUID v4)
    fn event_id(&self) -> &str;

    /// 이벤트 메타데이터
    fn metadata(&self) -> &EventMetadata;

    /// 이벤트 타입명 (로깅에 사용)
    fn event_type(&self) -> &str;
}

// ─── ModuleEvent ─────────────────────────────────────────────────────

/// 모듈 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleEventKind {
    /// 설치됨
    Installed,
    /// 의존성 해석됨
    Resolved,
    /// 시작됨
    Started,
    /// 정지됨
    Stopped,
    /// 업데이트됨
    Updated,
    /// 제거됨
    Uninstalled,
}

impl fmt::Display for ModuleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installed => write!(f, "INSTALLED"),
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Started => write!(f, "STARTED"),
            Self::Stopped => write!(f, "STOPPED"),
            Self::Updated => write!(f, "UPDATED"),
            Self::Uninstalled => write!(f, "UNINSTALLED"),
        }
    }
}

/// 모듈 생명주기 이벤트
#[derive(Debug, Clone)]
pub struct ModuleEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 이벤트 종류
    pub kind: ModuleEventKind,
    /// 대상 모듈
    pub module_id: ModuleId,
    /// 대상 모듈이 속한 컴포지트
    pub composite_id: ModuleId,
}

impl ModuleEvent {
    /// 새로운 trace를 시작하는 모듈 이벤트를 생성합니다.
    pub fn new(kind: ModuleEventKind, module_id: ModuleId, composite_id: ModuleId) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(SOURCE_ANCHOR_CONTEXT),
            kind,
            module_id,
            composite_id,
        }
    }

    /// 설치 이벤트를 생성합니다.
    pub fn installed(module_id: ModuleId, composite_id: ModuleId) -> Self {
        Self::new(ModuleEventKind::Installed, module_id, composite_id)
    }

    /// 설치 이벤트인지 확인합니다.
    pub fn is_install(&self) -> bool {
        self.kind == ModuleEventKind::Installed
    }
}

impl Event for ModuleEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_MODULE
    }
}

impl fmt::Display for ModuleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ModuleEvent[{}] {} module={} composite={}",
            &self.id[..8.min(self.id.len())],
            self.kind,
            self.module_id,
            self.composite_id,
        )
    }
}

// ─── FrameworkEvent ──────────────────────────────────────────────────

/// 루트 런타임에 게시되는 에러 이벤트
#[derive(Debug, Clone)]
pub struct FrameworkEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 에러를 보고한 모듈
    pub module_id: ModuleId,
    /// 에러 원인
    pub cause: CascadeFailure,
}

impl FrameworkEvent {
    /// 에러 이벤트를 생성합니다.
    pub fn error(module_id: ModuleId, cause: CascadeFailure) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(SOURCE_COMPOSITE),
            module_id,
            cause,
        }
    }
}

impl Event for FrameworkEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_FRAMEWORK_ERROR
    }
}

impl fmt::Display for FrameworkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FrameworkEvent[{}] ERROR module={}: {}",
            &self.id[..8.min(self.id.len())],
            self.module_id,
            self.cause,
        )
    }
}

fn unix_timestamp_str(time: SystemTime) -> String {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => duration.as_secs().to_string(),
        Err(_) => "unknown".to_owned(),
    }
}
