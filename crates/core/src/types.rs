//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 모듈 식별자, 생명주기 상태, 매니페스트, 서비스 속성과 같이
//! 코어와 컴포지트 크레이트가 공유하는 데이터 구조를 정의합니다.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::header::{ImportSpec, RequireSpec, Version};

// --- 매니페스트 헤더 이름 ---

/// 모듈 심볼릭 이름
pub const MODULE_SYMBOLIC_NAME: &str = "Module-SymbolicName";
/// 매니페스트 버전 (현재 `2`만 지원)
pub const MODULE_MANIFEST_VERSION: &str = "Module-ManifestVersion";
/// 모듈 버전
pub const MODULE_VERSION: &str = "Module-Version";
/// 모듈 활성화 엔트리
pub const MODULE_ACTIVATOR: &str = "Module-Activator";
/// 모듈 클래스패스
pub const MODULE_CLASSPATH: &str = "Module-ClassPath";
/// 네이티브 코드
pub const MODULE_NATIVE_CODE: &str = "Module-NativeCode";
/// 패키지 가져오기
pub const IMPORT_PACKAGE: &str = "Import-Package";
/// 동적 패키지 가져오기
pub const DYNAMIC_IMPORT_PACKAGE: &str = "DynamicImport-Package";
/// 패키지 내보내기
pub const EXPORT_PACKAGE: &str = "Export-Package";
/// 다른 모듈 요구
pub const REQUIRE_MODULE: &str = "Require-Module";
/// 프래그먼트 호스트
pub const FRAGMENT_HOST: &str = "Fragment-Host";

/// 컴포지트: 부모로부터 가져올 패키지 정책
pub const COMPOSITE_PACKAGE_IMPORT_POLICY: &str = "Composite-PackageImportPolicy";
/// 컴포지트: 부모에게 내보낼 패키지 정책
pub const COMPOSITE_PACKAGE_EXPORT_POLICY: &str = "Composite-PackageExportPolicy";
/// 컴포지트: 부모에게서 요구할 모듈 정책
pub const COMPOSITE_MODULE_REQUIRE_POLICY: &str = "Composite-ModuleRequirePolicy";
/// 컴포지트: 부모로부터 가져올 서비스 필터
pub const COMPOSITE_SERVICE_IMPORT_POLICY: &str = "Composite-ServiceImportPolicy";
/// 컴포지트: 부모에게 내보낼 서비스 필터
pub const COMPOSITE_SERVICE_EXPORT_POLICY: &str = "Composite-ServiceExportPolicy";

/// 모듈 식별자
///
/// `0`은 예약된 값입니다. 루트 런타임 자신(루트 컴포지트)과
/// 각 컴포지트 내부의 앵커 모듈이 모두 `0`으로 보입니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ModuleId(u64);

impl ModuleId {
    /// 컴포지트 내부 앵커 모듈 식별자
    pub const ANCHOR: ModuleId = ModuleId(0);
    /// 루트 런타임(루트 컴포지트) 식별자
    pub const ROOT: ModuleId = ModuleId(0);

    /// 새 식별자를 생성합니다.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// 원시 값을 반환합니다.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// 예약된 앵커 식별자인지 확인합니다.
    pub const fn is_anchor(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ModuleId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// 모듈 생명주기 상태
///
/// 상태 전환:
/// ```text
/// INSTALLED → RESOLVED → STARTING → ACTIVE → STOPPING → RESOLVED
///     \___________\___________\__________\________\______→ UNINSTALLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    /// 설치됨 (의존성 미해석)
    Installed,
    /// 의존성 해석 완료
    Resolved,
    /// 시작 중
    Starting,
    /// 실행 중
    Active,
    /// 정지 중
    Stopping,
    /// 제거됨 (종료 상태)
    Uninstalled,
}

impl ModuleState {
    /// 종료 상태인지 확인합니다.
    pub fn is_terminal(self) -> bool {
        self == Self::Uninstalled
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installed => write!(f, "installed"),
            Self::Resolved => write!(f, "resolved"),
            Self::Starting => write!(f, "starting"),
            Self::Active => write!(f, "active"),
            Self::Stopping => write!(f, "stopping"),
            Self::Uninstalled => write!(f, "uninstalled"),
        }
    }
}

/// 모듈 매니페스트
///
/// 헤더 이름은 대소문자를 구분하지 않습니다. 같은 이름으로 다시 넣으면
/// 기존 값을 대체하며, 처음 넣은 키 표기를 유지합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    headers: BTreeMap<String, String>,
}

impl Manifest {
    /// 빈 매니페스트를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    fn key_of(&self, name: &str) -> Option<&String> {
        self.headers.keys().find(|k| k.eq_ignore_ascii_case(name))
    }

    /// 헤더 값을 조회합니다.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.key_of(name)
            .and_then(|k| self.headers.get(k))
            .map(String::as_str)
    }

    /// 헤더 존재 여부를 확인합니다.
    pub fn contains(&self, name: &str) -> bool {
        self.key_of(name).is_some()
    }

    /// 헤더를 설정하고 이전 값을 반환합니다.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        match self.key_of(&name).cloned() {
            Some(existing) => self.headers.insert(existing, value.into()),
            None => self.headers.insert(name, value.into()),
        }
    }

    /// 헤더를 제거하고 값을 반환합니다.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let key = self.key_of(name).cloned()?;
        self.headers.remove(&key)
    }

    /// 헤더 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// 모든 헤더를 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut manifest = Manifest::new();
        for (k, v) in iter {
            manifest.insert(k, v);
        }
        manifest
    }
}

/// 서비스 속성 값
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// 불리언
    Bool(bool),
    /// 정수
    Int(i64),
    /// 문자열
    Str(String),
    /// 문자열 목록 (예: `objectClass`)
    List(Vec<String>),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

/// 서비스 속성 집합
///
/// 키 조회는 대소문자를 구분하지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceProperties {
    entries: BTreeMap<String, PropertyValue>,
}

impl ServiceProperties {
    /// 빈 속성 집합을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 속성을 추가합니다 (빌더 스타일).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// 속성을 설정합니다.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        let key = key.into();
        let existing = self
            .entries
            .keys()
            .find(|k| k.eq_ignore_ascii_case(&key))
            .cloned();
        self.entries.insert(existing.unwrap_or(key), value.into());
    }

    /// 속성을 조회합니다 (대소문자 무시).
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// 속성 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 등록된 서비스 참조
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceReference {
    /// 서비스 ID
    pub service_id: u64,
    /// 서비스를 등록한 모듈
    pub owner: ModuleId,
    /// 서비스 속성
    pub properties: ServiceProperties,
}

/// 해석된 모듈 의존성 설명
///
/// 구성 모듈 레지스트리가 보관하는 단위입니다. 의존성 해석이 끝난 모듈만
/// 설명을 가지며, `Arc`로 공유됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// 모듈 식별자
    pub module_id: ModuleId,
    /// 심볼릭 이름
    pub symbolic_name: String,
    /// 모듈 버전
    pub version: Version,
    /// 패키지 가져오기 명세
    pub imports: Vec<ImportSpec>,
    /// 모듈 요구 명세
    pub requires: Vec<RequireSpec>,
}

impl fmt::Display for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{} (id={}, imports={}, requires={})",
            self.symbolic_name,
            self.version,
            self.module_id,
            self.imports.len(),
            self.requires.len(),
        )
    }
}
