//! 컴포지트 매니페스트와 컨텐츠
//!
//! - [`validate_composite_manifest`]: 컴포지트 매니페스트 검증 및 보정
//! - [`CompositeConfiguration`]: `composite.properties` 항목 (`key=value`)
//! - [`ModuleContent`]: 매니페스트와 이름 붙은 항목으로 이루어진 메모리 아카이브

use std::collections::BTreeMap;

use bytes::Bytes;

use cairn_core::error::{LifecycleError, ManifestError};
use cairn_core::header::{COMPOSITE_DIRECTIVE, parse_header};
use cairn_core::runtime::ManifestValidator;
use cairn_core::types::{
    DYNAMIC_IMPORT_PACKAGE, EXPORT_PACKAGE, FRAGMENT_HOST, IMPORT_PACKAGE, MODULE_ACTIVATOR,
    MODULE_CLASSPATH, MODULE_MANIFEST_VERSION, MODULE_NATIVE_CODE, MODULE_SYMBOLIC_NAME,
    Manifest, REQUIRE_MODULE,
};

/// 컴포지트 설정 항목 이름
pub const COMPOSITE_CONFIGURATION_ENTRY: &str = "composite.properties";

/// 컴포지트 매니페스트에 올 수 없는 헤더
pub const FORBIDDEN_HEADERS: [&str; 8] = [
    IMPORT_PACKAGE,
    EXPORT_PACKAGE,
    REQUIRE_MODULE,
    DYNAMIC_IMPORT_PACKAGE,
    FRAGMENT_HOST,
    MODULE_ACTIVATOR,
    MODULE_CLASSPATH,
    MODULE_NATIVE_CODE,
];

/// 컴포지트 매니페스트를 검증하고 보정합니다.
///
/// 심볼릭 이름이 필요하고, 구성 모듈 수준의 헤더는 허용되지 않습니다.
/// 매니페스트 버전이 없으면 `2`로 채우며, 심볼릭 이름에 `composite:=true`를 붙입니다.
pub fn validate_composite_manifest(manifest: &mut Manifest) -> Result<(), ManifestError> {
    let symbolic_name = manifest
        .get(MODULE_SYMBOLIC_NAME)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ManifestError::MissingHeader(MODULE_SYMBOLIC_NAME.to_owned()))?
        .to_owned();

    if let Some(header) = FORBIDDEN_HEADERS.iter().find(|h| manifest.contains(h)) {
        return Err(ManifestError::ForbiddenHeader((*header).to_owned()));
    }

    match manifest.get(MODULE_MANIFEST_VERSION).map(str::trim) {
        None => {
            manifest.insert(MODULE_MANIFEST_VERSION, "2");
        }
        Some("2") => {}
        Some(other) => return Err(ManifestError::UnsupportedVersion(other.to_owned())),
    }

    let clauses = parse_header(MODULE_SYMBOLIC_NAME, &symbolic_name)?;
    let [clause] = clauses.as_slice() else {
        return Err(ManifestError::InvalidHeader {
            header: MODULE_SYMBOLIC_NAME.to_owned(),
            reason: "exactly one symbolic name is required".to_owned(),
        });
    };
    match clause.directives.get(COMPOSITE_DIRECTIVE).map(String::as_str) {
        None => {
            manifest.insert(
                MODULE_SYMBOLIC_NAME,
                format!("{};{COMPOSITE_DIRECTIVE}:=true", symbolic_name.trim()),
            );
        }
        Some("true") => {}
        Some(other) => {
            return Err(ManifestError::InvalidHeader {
                header: MODULE_SYMBOLIC_NAME.to_owned(),
                reason: format!("{COMPOSITE_DIRECTIVE} directive must be true, found '{other}'"),
            });
        }
    }
    Ok(())
}

/// 컴포지트 매니페스트 검증기
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositeManifestValidator;

impl ManifestValidator for CompositeManifestValidator {
    fn validate(&self, manifest: &mut Manifest) -> Result<(), ManifestError> {
        validate_composite_manifest(manifest)
    }
}

// ─── CompositeConfiguration ──────────────────────────────────────────

/// `composite.properties` 설정
///
/// `#`/`!` 주석, `=` 또는 `:` 구분자, `\` 이스케이프를 지원합니다. 구분자 없는 줄은 빈 값을 가진 키로 취급합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeConfiguration {
    entries: BTreeMap<String, String>,
}

impl CompositeConfiguration {
    /// 빈 설정
    pub fn new() -> Self {
        Self::default()
    }

    /// properties 텍스트를 파싱합니다.
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim_start();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (key, value) = match find_separator(line) {
                Some(idx) => (&line[..idx], &line[idx + 1..]),
                None => (line, ""),
            };
            entries.insert(unescape(key), unescape(value));
        }
        Self { entries }
    }

    /// 항목을 추가합니다 (빌더 스타일).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// 항목을 설정합니다.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// 항목을 조회합니다.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// 항목 수
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 모든 항목을 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// properties 텍스트로 직렬화합니다.
    ///
    /// 구분자, 주석 문자, 줄바꿈과 앞뒤 공백은 `\`로 이스케이프되어
    /// [`parse`](Self::parse)로 되읽으면 같은 항목이 나옵니다.
    pub fn to_properties(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            escape_key(&mut out, key);
            out.push('=');
            escape_value(&mut out, value);
            out.push('\n');
        }
        out
    }
}

/// 이스케이프되지 않은 첫 `=` 또는 `:`의 위치
fn find_separator(line: &str) -> Option<usize> {
    let mut escaped = false;
    for (idx, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '=' | ':' => return Some(idx),
            _ => {}
        }
    }
    None
}

/// 이스케이프를 풀고 앞뒤 공백을 제거합니다. 이스케이프된 공백은 남깁니다.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut keep = 0;
    let mut chars = raw.trim_start().chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => {}
            }
            keep = out.len();
        } else {
            out.push(c);
            if !c.is_whitespace() {
                keep = out.len();
            }
        }
    }
    out.truncate(keep);
    out
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '\n' => out.push_str("\\n"),
        '\t' => out.push_str("\\t"),
        '\r' => out.push_str("\\r"),
        _ => {
            out.push('\\');
            out.push(c);
        }
    }
}

fn escape_key(out: &mut String, key: &str) {
    for c in key.chars() {
        if matches!(c, '\\' | '=' | ':' | '#' | '!') || c.is_whitespace() {
            push_escaped(out, c);
        } else {
            out.push(c);
        }
    }
}

fn escape_value(out: &mut String, value: &str) {
    let start = value.len() - value.trim_start().len();
    let end = value.trim_end().len();
    for (idx, c) in value.char_indices() {
        let edge = idx < start || idx >= end;
        if matches!(c, '\\' | '\n' | '\r' | '\t') || (edge && c.is_whitespace()) {
            push_escaped(out, c);
        } else {
            out.push(c);
        }
    }
}

impl From<BTreeMap<String, String>> for CompositeConfiguration {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }
}

// ─── ModuleContent ───────────────────────────────────────────────────

/// 모듈 컨텐츠 -- 매니페스트와 이름 붙은 항목
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleContent {
    manifest: Manifest,
    entries: BTreeMap<String, Bytes>,
}

impl ModuleContent {
    /// 항목 없는 컨텐츠
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest,
            entries: BTreeMap::new(),
        }
    }

    /// 항목을 추가합니다 (빌더 스타일).
    pub fn with_entry(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.entries.insert(name.into(), data.into());
        self
    }

    /// 매니페스트
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// 항목을 조회합니다.
    pub fn entry(&self, name: &str) -> Option<&Bytes> {
        self.entries.get(name)
    }

    /// 항목 이름 목록
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// 항목을 읽습니다. 없으면 리소스 에러입니다.
    pub fn read_entry(&self, name: &str) -> Result<&Bytes, LifecycleError> {
        self.entries.get(name).ok_or_else(|| LifecycleError::Resource {
            path: name.to_owned(),
            reason: "entry not found".to_owned(),
        })
    }

    /// `composite.properties` 항목을 읽어 설정으로 파싱합니다.
    pub fn configuration(&self) -> Result<CompositeConfiguration, LifecycleError> {
        let data = self.read_entry(COMPOSITE_CONFIGURATION_ENTRY)?;
        let text = std::str::from_utf8(data).map_err(|e| LifecycleError::Resource {
            path: COMPOSITE_CONFIGURATION_ENTRY.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(CompositeConfiguration::parse(text))
    }
}

/// 설정과 매니페스트로 컴포지트 컨텐츠를 만듭니다.
pub fn composite_content(
    configuration: &CompositeConfiguration,
    manifest: &Manifest,
) -> ModuleContent {
    ModuleContent::new(manifest.clone()).with_entry(
        COMPOSITE_CONFIGURATION_ENTRY,
        Bytes::from(configuration.to_properties()),
    )
}
