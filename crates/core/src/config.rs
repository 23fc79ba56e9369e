//! 설정 관리 -- cairn.toml 파싱 및 런타임 설정
//!
//! [`CairnConfig`]는 로깅 설정과 컴포지트 토폴로지 정의를 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`CAIRN_GENERAL_LOG_LEVEL=debug` 형식)
//! 3. 설정 파일 (`cairn.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), cairn_core::error::CairnError> {
//! use cairn_core::config::CairnConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = CairnConfig::load("cairn.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = CairnConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CairnError, ConfigError};
use crate::types::{
    COMPOSITE_MODULE_REQUIRE_POLICY, COMPOSITE_PACKAGE_EXPORT_POLICY,
    COMPOSITE_PACKAGE_IMPORT_POLICY, COMPOSITE_SERVICE_EXPORT_POLICY,
    COMPOSITE_SERVICE_IMPORT_POLICY, IMPORT_PACKAGE, MODULE_MANIFEST_VERSION,
    MODULE_SYMBOLIC_NAME, MODULE_VERSION, Manifest, REQUIRE_MODULE,
};

/// Cairn 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CairnConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 컴포지트 설정
    #[serde(default)]
    pub composite: CompositeConfig,
}

impl CairnConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CairnError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, CairnError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CairnError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                CairnError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, CairnError> {
        toml::from_str(toml_str).map_err(|e| {
            CairnError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `CAIRN_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.general.log_level, "CAIRN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "CAIRN_GENERAL_LOG_FORMAT");
        override_bool(
            &mut self.composite.link_to_parent,
            "CAIRN_COMPOSITE_LINK_TO_PARENT",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), CairnError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        // 부모는 앞에서 정의된 컴포지트만 가리킬 수 있으므로 순환이 생기지 않습니다.
        let mut seen = HashSet::new();
        for (idx, def) in self.composite.definitions.iter().enumerate() {
            let field = format!("composite.definitions[{idx}]");
            if def.name.trim().is_empty() {
                return Err(invalid(&format!("{field}.name"), "must not be empty"));
            }
            if let Some(parent) = &def.parent {
                if !seen.contains(parent.as_str()) {
                    return Err(invalid(
                        &format!("{field}.parent"),
                        format!("'{parent}' must name a composite defined earlier"),
                    ));
                }
            }
            if !seen.insert(def.name.as_str()) {
                return Err(invalid(
                    &format!("{field}.name"),
                    format!("duplicate composite '{}'", def.name),
                ));
            }
            for (c_idx, constituent) in def.constituents.iter().enumerate() {
                if constituent.name.trim().is_empty() {
                    return Err(invalid(
                        &format!("{field}.constituents[{c_idx}].name"),
                        "must not be empty",
                    ));
                }
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> CairnError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 컴포지트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    /// 새 컴포지트의 정책 노드를 부모 아래에 연결하고,
    /// 실행 컨텍스트 이벤트를 구성 모듈 추적기로 전파합니다.
    pub link_to_parent: bool,
    /// 컴포지트 토폴로지 정의 (부모가 먼저 나와야 합니다)
    pub definitions: Vec<CompositeDefinition>,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            link_to_parent: true,
            definitions: Vec::new(),
        }
    }
}

/// 컴포지트 하나의 정의
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeDefinition {
    /// 심볼릭 이름
    pub name: String,
    /// 모듈 버전
    pub version: Option<String>,
    /// 부모 컴포지트 이름 (없으면 루트)
    pub parent: Option<String>,
    /// 부모로부터 가져올 패키지
    pub import_package_policy: Option<String>,
    /// 부모에게 내보낼 패키지
    pub export_package_policy: Option<String>,
    /// 부모에게서 요구할 모듈
    pub require_module_policy: Option<String>,
    /// 부모로부터 가져올 서비스 필터
    pub import_service_policy: Option<String>,
    /// 부모에게 내보낼 서비스 필터
    pub export_service_policy: Option<String>,
    /// `composite.properties` 항목
    pub configuration: BTreeMap<String, String>,
    /// 컴포지트 안에 설치할 구성 모듈
    pub constituents: Vec<ConstituentDefinition>,
}

impl CompositeDefinition {
    /// 정의로부터 컴포지트 매니페스트를 만듭니다.
    pub fn manifest(&self) -> Manifest {
        let mut manifest = Manifest::new();
        manifest.insert(MODULE_SYMBOLIC_NAME, self.name.as_str());
        manifest.insert(MODULE_MANIFEST_VERSION, "2");
        let optional = [
            (MODULE_VERSION, &self.version),
            (COMPOSITE_PACKAGE_IMPORT_POLICY, &self.import_package_policy),
            (COMPOSITE_PACKAGE_EXPORT_POLICY, &self.export_package_policy),
            (COMPOSITE_MODULE_REQUIRE_POLICY, &self.require_module_policy),
            (COMPOSITE_SERVICE_IMPORT_POLICY, &self.import_service_policy),
            (COMPOSITE_SERVICE_EXPORT_POLICY, &self.export_service_policy),
        ];
        for (header, value) in optional {
            if let Some(value) = value {
                manifest.insert(header, value.as_str());
            }
        }
        manifest
    }
}

/// 구성 모듈 정의
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstituentDefinition {
    /// 심볼릭 이름
    pub name: String,
    /// 모듈 버전
    pub version: Option<String>,
    /// `Import-Package` 헤더
    pub import_package: Option<String>,
    /// `Require-Module` 헤더
    pub require_module: Option<String>,
    /// 제거 시 실패하도록 표시 (연쇄 제거 시뮬레이션용)
    pub fail_uninstall: bool,
}

impl ConstituentDefinition {
    /// 정의로부터 모듈 매니페스트를 만듭니다.
    pub fn manifest(&self) -> Manifest {
        let mut manifest = Manifest::new();
        manifest.insert(MODULE_SYMBOLIC_NAME, self.name.as_str());
        manifest.insert(MODULE_MANIFEST_VERSION, "2");
        let optional = [
            (MODULE_VERSION, &self.version),
            (IMPORT_PACKAGE, &self.import_package),
            (REQUIRE_MODULE, &self.require_module),
        ];
        for (header, value) in optional {
            if let Some(value) = value {
                manifest.insert(header, value.as_str());
            }
        }
        manifest
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}
