//! 매니페스트 헤더 파서 -- 의존성 해석 엔진의 기본 구현
//!
//! 헤더 값은 쉼표로 구분된 절(clause)의 목록입니다. 각 절은 하나 이상의
//! 경로와 `;`로 구분된 매개변수로 이루어집니다.
//!
//! ```text
//! Import-Package: com.acme.api;version="[1.0,2.0)", com.acme.util;resolution:=optional
//!                 ^path        ^attribute            ^path         ^directive
//! ```
//!
//! 따옴표 안의 `,`와 `;`는 구분자로 취급하지 않습니다.
//! [`HeaderResolver`]는 이 파서로 [`DependencyResolver`]를 구현합니다.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CairnError, ManifestError};
use crate::runtime::{DependencyResolver, ResolvedHeaders};
use crate::types::{
    IMPORT_PACKAGE, MODULE_MANIFEST_VERSION, MODULE_SYMBOLIC_NAME, MODULE_VERSION, Manifest,
    ModuleDescriptor, ModuleId, REQUIRE_MODULE,
};

/// 가져오기 버전 속성
pub const VERSION_ATTRIBUTE: &str = "version";
/// 모듈 요구 버전 속성
pub const MODULE_VERSION_ATTRIBUTE: &str = "module-version";
/// 해석 지시자 (`mandatory` | `optional`)
pub const RESOLUTION_DIRECTIVE: &str = "resolution";
/// 컴포지트 표시 지시자
pub const COMPOSITE_DIRECTIVE: &str = "composite";

// ─── Version ─────────────────────────────────────────────────────────

/// 모듈 버전 (`major.minor.micro.qualifier`)
///
/// 숫자 부분은 `semver`로 비교하고, 수식어(qualifier)는 문자열로 비교합니다.
/// 누락된 숫자 부분은 `0`으로 채웁니다 (`"1.2"` == `"1.2.0"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    base: semver::Version,
    qualifier: String,
}

impl Version {
    /// 새 버전을 생성합니다.
    pub fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            base: semver::Version::new(major, minor, micro),
            qualifier: String::new(),
        }
    }

    /// 가장 낮은 버전 (`0.0.0`)
    pub fn empty() -> Self {
        Self::new(0, 0, 0)
    }

    /// 수식어를 반환합니다.
    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    /// 버전 문자열을 파싱합니다.
    pub fn parse(value: &str) -> Result<Self, ManifestError> {
        let trimmed = value.trim();
        let invalid = |reason: &str| ManifestError::InvalidVersion {
            value: value.to_owned(),
            reason: reason.to_owned(),
        };
        if trimmed.is_empty() {
            return Err(invalid("empty version"));
        }

        let mut parts = trimmed.splitn(4, '.');
        let mut numbers = [0u64; 3];
        for (idx, slot) in numbers.iter_mut().enumerate() {
            match parts.next() {
                Some(part) => {
                    *slot = part
                        .parse::<u64>()
                        .map_err(|_| invalid(&format!("component {} is not a number", idx + 1)))?;
                }
                None => break,
            }
        }

        let qualifier = parts.next().unwrap_or_default();
        if !qualifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid("qualifier contains invalid characters"));
        }

        Ok(Self {
            base: semver::Version::new(numbers[0], numbers[1], numbers[2]),
            qualifier: qualifier.to_owned(),
        })
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::empty()
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.base
            .cmp(&other.base)
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.base.major, self.base.minor, self.base.patch
        )?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

// ─── VersionRange ────────────────────────────────────────────────────

/// 버전 범위
///
/// - `"1.0"`: 1.0 이상 (상한 없음)
/// - `"[1.0,2.0)"`: 1.0 이상 2.0 미만
/// - `"(1.0,2.0]"`: 1.0 초과 2.0 이하
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    floor: Version,
    floor_inclusive: bool,
    ceiling: Option<Version>,
    ceiling_inclusive: bool,
}

impl VersionRange {
    /// 모든 버전을 허용하는 범위
    pub fn any() -> Self {
        Self::at_least(Version::empty())
    }

    /// 하한만 있는 범위를 생성합니다.
    pub fn at_least(floor: Version) -> Self {
        Self {
            floor,
            floor_inclusive: true,
            ceiling: None,
            ceiling_inclusive: false,
        }
    }

    /// 범위 문자열을 파싱합니다.
    pub fn parse(value: &str) -> Result<Self, ManifestError> {
        let trimmed = value.trim();
        let invalid = |reason: &str| ManifestError::InvalidVersion {
            value: value.to_owned(),
            reason: reason.to_owned(),
        };

        let floor_inclusive = match trimmed.chars().next() {
            Some('[') => true,
            Some('(') => false,
            _ => return Ok(Self::at_least(Version::parse(trimmed)?)),
        };
        let ceiling_inclusive = match trimmed.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(invalid("interval must end with ']' or ')'")),
        };

        let inner = &trimmed[1..trimmed.len() - 1];
        let (floor, ceiling) = inner
            .split_once(',')
            .ok_or_else(|| invalid("interval must contain ','"))?;
        let floor = Version::parse(floor)?;
        let ceiling = Version::parse(ceiling)?;
        if ceiling < floor {
            return Err(invalid("ceiling is lower than floor"));
        }

        Ok(Self {
            floor,
            floor_inclusive,
            ceiling: Some(ceiling),
            ceiling_inclusive,
        })
    }

    /// 버전이 범위에 포함되는지 확인합니다.
    pub fn includes(&self, version: &Version) -> bool {
        let above_floor = if self.floor_inclusive {
            version >= &self.floor
        } else {
            version > &self.floor
        };
        let below_ceiling = match &self.ceiling {
            None => true,
            Some(ceiling) if self.ceiling_inclusive => version <= ceiling,
            Some(ceiling) => version < ceiling,
        };
        above_floor && below_ceiling
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ceiling {
            None => write!(f, "{}", self.floor),
            Some(ceiling) => write!(
                f,
                "{}{},{}{}",
                if self.floor_inclusive { '[' } else { '(' },
                self.floor,
                ceiling,
                if self.ceiling_inclusive { ']' } else { ')' },
            ),
        }
    }
}

impl TryFrom<String> for VersionRange {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionRange> for String {
    fn from(range: VersionRange) -> Self {
        range.to_string()
    }
}

// ─── Import / Require specs ──────────────────────────────────────────

/// 패키지 가져오기 명세
///
/// 이름이 `.*`로 끝나면 해당 접두사 아래의 모든 패키지에 매칭되고,
/// `*` 단독이면 모든 패키지에 매칭됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSpec {
    /// 패키지 이름 (와일드카드 가능)
    pub name: String,
    /// 허용 버전 범위
    pub version_range: VersionRange,
    /// `resolution:=optional` 여부
    pub optional: bool,
    /// 기타 매칭 속성
    pub attributes: BTreeMap<String, String>,
}

impl ImportSpec {
    /// 패키지 이름이 이 명세에 매칭되는지 확인합니다.
    pub fn matches_name(&self, package: &str) -> bool {
        if self.name == "*" {
            return true;
        }
        match self.name.strip_suffix(".*") {
            Some(prefix) => package
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.')),
            None => self.name == package,
        }
    }

    /// 패키지 이름과 버전이 모두 매칭되는지 확인합니다.
    pub fn matches(&self, package: &str, version: &Version) -> bool {
        self.matches_name(package) && self.version_range.includes(version)
    }
}

impl fmt::Display for ImportSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};version=\"{}\"", self.name, self.version_range)?;
        if self.optional {
            write!(f, ";resolution:=optional")?;
        }
        Ok(())
    }
}

/// 모듈(컴포지트) 요구 명세
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequireSpec {
    /// 요구하는 모듈 심볼릭 이름
    pub symbolic_name: String,
    /// 허용 버전 범위
    pub version_range: VersionRange,
    /// `resolution:=optional` 여부
    pub optional: bool,
}

impl RequireSpec {
    /// 모듈 이름과 버전이 매칭되는지 확인합니다.
    pub fn matches(&self, symbolic_name: &str, version: &Version) -> bool {
        self.symbolic_name == symbolic_name && self.version_range.includes(version)
    }
}

impl fmt::Display for RequireSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};module-version=\"{}\"",
            self.symbolic_name, self.version_range
        )?;
        if self.optional {
            write!(f, ";resolution:=optional")?;
        }
        Ok(())
    }
}

// ─── Clause parser ───────────────────────────────────────────────────

/// 파싱된 헤더 절
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderClause {
    /// 경로 목록 (같은 매개변수를 공유)
    pub paths: Vec<String>,
    /// `key=value` 속성
    pub attributes: BTreeMap<String, String>,
    /// `key:=value` 지시자
    pub directives: BTreeMap<String, String>,
}

/// 따옴표 밖의 구분자로 문자열을 나눕니다.
fn split_unquoted(input: &str, separator: char) -> Result<Vec<&str>, String> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, c) in input.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == separator && !in_quotes {
            parts.push(&input[start..idx]);
            start = idx + c.len_utf8();
        }
    }
    if in_quotes {
        return Err("unterminated quoted value".to_owned());
    }
    parts.push(&input[start..]);
    Ok(parts)
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | '$' | '*'))
}

/// 헤더 값을 절 목록으로 파싱합니다.
///
/// # Errors
/// 빈 절, 매개변수 뒤의 경로, 잘못된 경로 문자, 닫히지 않은 따옴표가 있으면
/// [`ManifestError::InvalidHeader`]를 반환합니다.
pub fn parse_header(header: &str, value: &str) -> Result<Vec<HeaderClause>, ManifestError> {
    let invalid = |reason: String| ManifestError::InvalidHeader {
        header: header.to_owned(),
        reason,
    };

    let mut clauses = Vec::new();
    for raw_clause in split_unquoted(value, ',').map_err(invalid)? {
        if raw_clause.trim().is_empty() {
            return Err(invalid("empty clause".to_owned()));
        }

        let mut clause = HeaderClause::default();
        for element in split_unquoted(raw_clause, ';').map_err(invalid)? {
            let element = element.trim();
            if element.is_empty() {
                return Err(invalid(format!("empty element in clause '{}'", raw_clause.trim())));
            }

            if let Some((key, val)) = element.split_once(":=") {
                clause
                    .directives
                    .insert(key.trim().to_owned(), unquote(val).to_owned());
            } else if let Some((key, val)) = element.split_once('=') {
                clause
                    .attributes
                    .insert(key.trim().to_owned(), unquote(val).to_owned());
            } else {
                if !clause.attributes.is_empty() || !clause.directives.is_empty() {
                    return Err(invalid(format!("path '{element}' follows a parameter")));
                }
                if !is_valid_path(element) {
                    return Err(invalid(format!("invalid path '{element}'")));
                }
                clause.paths.push(element.to_owned());
            }
        }

        if clause.paths.is_empty() {
            return Err(invalid(format!("clause '{}' has no path", raw_clause.trim())));
        }
        clauses.push(clause);
    }
    Ok(clauses)
}

fn is_optional(clause: &HeaderClause) -> bool {
    clause
        .directives
        .get(RESOLUTION_DIRECTIVE)
        .is_some_and(|r| r == "optional")
}

/// `Import-Package` 형식 헤더를 가져오기 명세로 변환합니다.
///
/// 같은 패키지를 두 번 가져오면 에러입니다.
pub fn parse_imports(header: &str, value: &str) -> Result<Vec<ImportSpec>, ManifestError> {
    let mut imports: Vec<ImportSpec> = Vec::new();
    for clause in parse_header(header, value)? {
        let version_range = match clause.attributes.get(VERSION_ATTRIBUTE) {
            Some(range) => VersionRange::parse(range)?,
            None => VersionRange::any(),
        };
        let mut attributes = clause.attributes.clone();
        attributes.remove(VERSION_ATTRIBUTE);

        for path in &clause.paths {
            if imports.iter().any(|i| &i.name == path) {
                return Err(ManifestError::InvalidHeader {
                    header: header.to_owned(),
                    reason: format!("package '{path}' imported more than once"),
                });
            }
            imports.push(ImportSpec {
                name: path.clone(),
                version_range: version_range.clone(),
                optional: is_optional(&clause),
                attributes: attributes.clone(),
            });
        }
    }
    Ok(imports)
}

/// `Require-Module` 형식 헤더를 요구 명세로 변환합니다.
pub fn parse_requires(header: &str, value: &str) -> Result<Vec<RequireSpec>, ManifestError> {
    let mut requires = Vec::new();
    for clause in parse_header(header, value)? {
        let version_range = match clause.attributes.get(MODULE_VERSION_ATTRIBUTE) {
            Some(range) => VersionRange::parse(range)?,
            None => VersionRange::any(),
        };
        for path in &clause.paths {
            requires.push(RequireSpec {
                symbolic_name: path.clone(),
                version_range: version_range.clone(),
                optional: is_optional(&clause),
            });
        }
    }
    Ok(requires)
}

/// 심볼릭 이름 헤더에서 이름 부분만 꺼냅니다 (`name;composite:=true` → `name`).
pub fn symbolic_name_of(manifest: &Manifest) -> Option<&str> {
    manifest
        .get(MODULE_SYMBOLIC_NAME)
        .map(|v| v.split(';').next().unwrap_or(v).trim())
        .filter(|name| !name.is_empty())
}

// ─── HeaderResolver ──────────────────────────────────────────────────

/// 헤더 파서 기반 의존성 해석 엔진
///
/// 매니페스트 버전 `2`와 심볼릭 이름을 요구하고, `Import-Package`와
/// `Require-Module`을 타입이 있는 명세로 변환합니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderResolver;

impl HeaderResolver {
    /// 새 해석기를 생성합니다.
    pub fn new() -> Self {
        Self
    }

    /// 매니페스트에서 모듈 설명을 생성합니다.
    pub fn describe(
        &self,
        module_id: ModuleId,
        manifest: &Manifest,
    ) -> Result<ModuleDescriptor, CairnError> {
        let resolved = self.parse_descriptor(manifest)?;
        let version = match manifest.get(MODULE_VERSION) {
            Some(v) => Version::parse(v)?,
            None => Version::empty(),
        };
        Ok(ModuleDescriptor {
            module_id,
            symbolic_name: symbolic_name_of(manifest).unwrap_or_default().to_owned(),
            version,
            imports: resolved.imports,
            requires: resolved.requires,
        })
    }
}

impl DependencyResolver for HeaderResolver {
    fn parse_descriptor(&self, manifest: &Manifest) -> Result<ResolvedHeaders, CairnError> {
        match manifest.get(MODULE_MANIFEST_VERSION).map(str::trim) {
            Some("2") => {}
            Some(other) => return Err(ManifestError::UnsupportedVersion(other.to_owned()).into()),
            None => {
                return Err(ManifestError::MissingHeader(MODULE_MANIFEST_VERSION.to_owned()).into());
            }
        }
        if symbolic_name_of(manifest).is_none() {
            return Err(ManifestError::MissingHeader(MODULE_SYMBOLIC_NAME.to_owned()).into());
        }

        let imports = match manifest.get(IMPORT_PACKAGE) {
            Some(value) => parse_imports(IMPORT_PACKAGE, value)?,
            None => Vec::new(),
        };
        let requires = match manifest.get(REQUIRE_MODULE) {
            Some(value) => parse_requires(REQUIRE_MODULE, value)?,
            None => Vec::new(),
        };
        Ok(ResolvedHeaders { imports, requires })
    }
}
