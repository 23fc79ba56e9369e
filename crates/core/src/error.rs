//! 에러 타입 -- 도메인별 에러 정의
//!
//! 컴포지트 코어의 에러 분류:
//! - [`ManifestError`]: 잘못된 정책/필터/매니페스트 입력. 항상 호출자에게 전파되며 재시도하지 않습니다.
//! - [`CairnError::Unsupported`]: 의도적으로 금지된 호출 (앵커 모듈 변경, 바이트 스트림 업데이트).
//! - [`LifecycleError`]: 상태 전이 위반 또는 구조적 업데이트 중 리소스 실패.
//! - [`CascadeFailure`]: 컨테이너 해체 중 개별 구성 모듈의 제거 실패. 에러 이벤트로만 보고됩니다.

use crate::types::ModuleId;

/// Cairn 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum CairnError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 매니페스트/정책/필터 파싱 에러
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// 지원하지 않는 연산
    #[error("unsupported operation: {action}")]
    Unsupported {
        /// 거부된 동작 설명
        action: String,
    },

    /// 생명주기 에러
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// 구성 모듈 연쇄 제거 실패
    #[error("cascade failure: {0}")]
    Cascade(#[from] CascadeFailure),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CairnError {
    /// 지원하지 않는 연산 에러를 생성합니다.
    pub fn unsupported(action: impl Into<String>) -> Self {
        Self::Unsupported {
            action: action.into(),
        }
    }

    /// 매니페스트 에러인지 확인합니다.
    pub fn is_manifest(&self) -> bool {
        matches!(self, Self::Manifest(_))
    }

    /// 지원하지 않는 연산 에러인지 확인합니다.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 매니페스트/정책 입력 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    /// 필수 헤더 누락
    #[error("missing required header: {0}")]
    MissingHeader(String),

    /// 컴포지트에 허용되지 않는 헤더
    #[error("header not allowed in a composite manifest: {0}")]
    ForbiddenHeader(String),

    /// 헤더 값 구문 오류
    #[error("invalid header '{header}': {reason}")]
    InvalidHeader { header: String, reason: String },

    /// 서비스 필터 구문 오류
    #[error("invalid filter '{filter}' at offset {offset}: {reason}")]
    InvalidFilter {
        filter: String,
        offset: usize,
        reason: String,
    },

    /// 지원하지 않는 매니페스트 버전
    #[error("unsupported manifest version: {0}")]
    UnsupportedVersion(String),

    /// 버전/버전 범위 구문 오류
    #[error("invalid version '{value}': {reason}")]
    InvalidVersion { value: String, reason: String },
}

/// 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// 현재 상태에서 허용되지 않는 전이
    #[error("module {module} cannot {operation} while {state}")]
    InvalidState {
        module: ModuleId,
        state: String,
        operation: String,
    },

    /// 권한 검사 실패
    #[error("permission denied for module {module}: {reason}")]
    PermissionDenied { module: ModuleId, reason: String },

    /// 컨텐츠 리소스 읽기 실패
    #[error("resource '{path}' unavailable: {reason}")]
    Resource { path: String, reason: String },

    /// 무효화된 실행 컨텍스트 사용
    #[error("execution context of composite {composite} is no longer valid")]
    ContextInvalid { composite: ModuleId },

    /// 모듈을 찾을 수 없음
    #[error("module not found: {0}")]
    NotFound(ModuleId),

    /// 기타 생명주기 실패
    #[error("{0}")]
    Failed(String),
}

/// 구성 모듈 연쇄 제거 실패
///
/// 컨테이너 해체 중 한 구성 모듈의 제거가 실패했음을 나타냅니다.
/// 호출자에게 반환되지 않고 루트 런타임에 에러 이벤트로 게시됩니다.
#[derive(Debug, Clone, thiserror::Error)]
#[error("uninstall of module {module} in composite {composite} failed: {reason}")]
pub struct CascadeFailure {
    /// 해체 중인 컴포지트
    pub composite: ModuleId,
    /// 제거에 실패한 구성 모듈
    pub module: ModuleId,
    /// 실패 사유
    pub reason: String,
}
