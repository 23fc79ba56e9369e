//! 서비스 필터 -- LDAP 스타일 필터 컴파일러
//!
//! 컴포지트의 서비스 가져오기/내보내기 정책은 필터 문자열로 표현됩니다.
//!
//! ```text
//! (&(objectClass=com.acme.Log)(|(level>=3)(vendor~=ACME))(!(internal=*)))
//! ```
//!
//! 지원 연산자: `&`, `|`, `!`, `=`, `~=`, `>=`, `<=`, 존재 검사(`attr=*`),
//! 부분 문자열(`attr=a*b*c`). `\`는 다음 문자를 이스케이프합니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::runtime::FilterCompiler;
use crate::types::{PropertyValue, ServiceProperties};

/// 컴파일된 필터 식
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    /// 모든 하위 식이 참 (`&`)
    And(Vec<FilterExpr>),
    /// 하위 식 중 하나가 참 (`|`)
    Or(Vec<FilterExpr>),
    /// 부정 (`!`)
    Not(Box<FilterExpr>),
    /// 동등 비교
    Equal { attr: String, value: String },
    /// 근사 비교 (공백/대소문자 무시)
    Approx { attr: String, value: String },
    /// 이상
    GreaterEq { attr: String, value: String },
    /// 이하
    LessEq { attr: String, value: String },
    /// 속성 존재
    Present { attr: String },
    /// 부분 문자열
    Substring {
        attr: String,
        initial: Option<String>,
        any: Vec<String>,
        last: Option<String>,
    },
}

/// 컴파일된 서비스 필터
///
/// 원본 문자열을 함께 보관하며, 직렬화 시 원본 문자열로 표현됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Filter {
    text: String,
    expr: FilterExpr,
}

impl Filter {
    /// 필터 문자열을 컴파일합니다.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut parser = Parser::new(text);
        parser.skip_whitespace();
        let expr = parser.parse_filter()?;
        parser.skip_whitespace();
        if !parser.at_end() {
            return Err(parser.error("unexpected trailing characters"));
        }
        Ok(Self {
            text: text.trim().to_owned(),
            expr,
        })
    }

    /// 원본 필터 문자열
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// 컴파일된 식
    pub fn expr(&self) -> &FilterExpr {
        &self.expr
    }

    /// 서비스 속성이 필터를 만족하는지 확인합니다.
    pub fn matches(&self, properties: &ServiceProperties) -> bool {
        self.expr.matches(properties)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Filter {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Filter {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Filter> for String {
    fn from(filter: Filter) -> Self {
        filter.text
    }
}

// ─── Matching ────────────────────────────────────────────────────────

impl FilterExpr {
    /// 서비스 속성에 대해 식을 평가합니다.
    pub fn matches(&self, properties: &ServiceProperties) -> bool {
        match self {
            Self::And(items) => items.iter().all(|e| e.matches(properties)),
            Self::Or(items) => items.iter().any(|e| e.matches(properties)),
            Self::Not(inner) => !inner.matches(properties),
            Self::Present { attr } => properties.get(attr).is_some(),
            Self::Equal { attr, value } => {
                compare(properties, attr, |v| value_cmp(v, value, Op::Equal))
            }
            Self::Approx { attr, value } => {
                compare(properties, attr, |v| value_cmp(v, value, Op::Approx))
            }
            Self::GreaterEq { attr, value } => {
                compare(properties, attr, |v| value_cmp(v, value, Op::GreaterEq))
            }
            Self::LessEq { attr, value } => {
                compare(properties, attr, |v| value_cmp(v, value, Op::LessEq))
            }
            Self::Substring {
                attr,
                initial,
                any,
                last,
            } => compare(properties, attr, |v| match v {
                PropertyValue::Str(s) => substring_match(s, initial.as_deref(), any, last.as_deref()),
                _ => false,
            }),
        }
    }
}

#[derive(Clone, Copy)]
enum Op {
    Equal,
    Approx,
    GreaterEq,
    LessEq,
}

/// 목록 속성은 원소 중 하나라도 만족하면 참입니다.
fn compare(
    properties: &ServiceProperties,
    attr: &str,
    test: impl Fn(&PropertyValue) -> bool,
) -> bool {
    match properties.get(attr) {
        None => false,
        Some(PropertyValue::List(items)) => items
            .iter()
            .any(|item| test(&PropertyValue::Str(item.clone()))),
        Some(value) => test(value),
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn value_cmp(actual: &PropertyValue, expected: &str, op: Op) -> bool {
    match actual {
        PropertyValue::Str(s) => match op {
            Op::Equal => s == expected,
            Op::Approx => normalize(s) == normalize(expected),
            Op::GreaterEq => s.as_str() >= expected,
            Op::LessEq => s.as_str() <= expected,
        },
        PropertyValue::Int(i) => match expected.trim().parse::<i64>() {
            Ok(e) => match op {
                Op::Equal | Op::Approx => *i == e,
                Op::GreaterEq => *i >= e,
                Op::LessEq => *i <= e,
            },
            Err(_) => false,
        },
        PropertyValue::Bool(b) => match op {
            Op::Equal | Op::Approx => expected.trim().eq_ignore_ascii_case(&b.to_string()),
            Op::GreaterEq | Op::LessEq => false,
        },
        PropertyValue::List(_) => false,
    }
}

fn substring_match(value: &str, initial: Option<&str>, any: &[String], last: Option<&str>) -> bool {
    let mut pos = 0;
    if let Some(prefix) = initial {
        if !value.starts_with(prefix) {
            return false;
        }
        pos = prefix.len();
    }
    for piece in any {
        match value[pos..].find(piece.as_str()) {
            Some(idx) => pos += idx + piece.len(),
            None => return false,
        }
    }
    match last {
        Some(suffix) => value.len() - pos >= suffix.len() && value.ends_with(suffix),
        None => true,
    }
}

// ─── Parser ──────────────────────────────────────────────────────────

struct Parser<'a> {
    text: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: &str) -> ManifestError {
        ManifestError::InvalidFilter {
            filter: self.text.to_owned(),
            offset: self.pos,
            reason: reason.to_owned(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ManifestError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{expected}'")))
        }
    }

    fn parse_filter(&mut self) -> Result<FilterExpr, ManifestError> {
        self.expect('(')?;
        self.skip_whitespace();
        let expr = match self.peek() {
            Some('&') => {
                self.pos += 1;
                FilterExpr::And(self.parse_list()?)
            }
            Some('|') => {
                self.pos += 1;
                FilterExpr::Or(self.parse_list()?)
            }
            Some('!') => {
                self.pos += 1;
                self.skip_whitespace();
                FilterExpr::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.skip_whitespace();
        self.expect(')')?;
        Ok(expr)
    }

    fn parse_list(&mut self) -> Result<Vec<FilterExpr>, ManifestError> {
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('(') => items.push(self.parse_filter()?),
                _ => return Ok(items),
            }
        }
    }

    fn parse_item(&mut self) -> Result<FilterExpr, ManifestError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '~' | '<' | '>' | '(' | ')') {
                break;
            }
            self.pos += 1;
        }
        let attr: String = self.chars[start..self.pos].iter().collect();
        let attr = attr.trim().to_owned();
        if attr.is_empty() {
            return Err(self.error("missing attribute name"));
        }

        let op = match self.peek() {
            Some('=') => {
                self.pos += 1;
                Op::Equal
            }
            Some(c @ ('~' | '<' | '>')) => {
                self.pos += 1;
                self.expect('=')?;
                match c {
                    '~' => Op::Approx,
                    '<' => Op::LessEq,
                    _ => Op::GreaterEq,
                }
            }
            _ => return Err(self.error("expected comparison operator")),
        };

        let pieces = self.parse_value()?;
        Ok(match op {
            Op::Equal => equality(attr, pieces),
            Op::Approx => FilterExpr::Approx {
                attr,
                value: pieces.join("*"),
            },
            Op::GreaterEq => FilterExpr::GreaterEq {
                attr,
                value: pieces.join("*"),
            },
            Op::LessEq => FilterExpr::LessEq {
                attr,
                value: pieces.join("*"),
            },
        })
    }

    /// 값을 이스케이프되지 않은 `*` 기준으로 나눠 읽습니다.
    fn parse_value(&mut self) -> Result<Vec<String>, ManifestError> {
        let mut pieces = vec![String::new()];
        loop {
            match self.peek() {
                None => return Err(self.error("unexpected end of filter")),
                Some(')') => return Ok(pieces),
                Some('(') => return Err(self.error("unescaped '(' in value")),
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self
                        .peek()
                        .ok_or_else(|| self.error("dangling escape"))?;
                    if let Some(current) = pieces.last_mut() {
                        current.push(escaped);
                    }
                    self.pos += 1;
                }
                Some('*') => {
                    pieces.push(String::new());
                    self.pos += 1;
                }
                Some(c) => {
                    if let Some(current) = pieces.last_mut() {
                        current.push(c);
                    }
                    self.pos += 1;
                }
            }
        }
    }
}

fn equality(attr: String, mut pieces: Vec<String>) -> FilterExpr {
    if pieces.len() == 1 {
        let value = pieces.pop().unwrap_or_default();
        return FilterExpr::Equal { attr, value };
    }
    if pieces.len() == 2 && pieces.iter().all(String::is_empty) {
        return FilterExpr::Present { attr };
    }

    let last = pieces.pop().filter(|s| !s.is_empty());
    let mut rest = pieces.into_iter();
    let initial = rest.next().filter(|s| !s.is_empty());
    let any = rest.filter(|s| !s.is_empty()).collect();
    FilterExpr::Substring {
        attr,
        initial,
        any,
        last,
    }
}

// ─── Compiler ────────────────────────────────────────────────────────

/// 기본 필터 컴파일러
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapFilterCompiler;

impl FilterCompiler for LdapFilterCompiler {
    fn compile_filter(&self, filter: &str) -> Result<Filter, ManifestError> {
        Filter::parse(filter)
    }
}
