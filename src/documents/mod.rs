//! Documents 모듈 - 인덱싱용 문서 타입과 빌더
//!
//! 백엔드 레코드를 `(text, metadata)` 쌍으로 변환합니다.
//! - text: 임베딩 입력이자 LLM에 전달되는 스니펫
//! - metadata: 구조화 필터(self-query)에 사용되는 평탄한 맵

mod builder;
mod coerce;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use builder::{build_documents, product_document, review_document, BuiltDocuments, ProductNames};
pub use coerce::{parse_float, parse_int};

// ============================================================================
// Metadata
// ============================================================================

/// 메타데이터 값 (문자열, 정수, 실수)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetadataValue {
    /// JSON 값에서 변환 (표현 불가능한 타입은 None)
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(MetadataValue::Str(s.clone())),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(MetadataValue::Int(i)),
                None => n.as_f64().map(MetadataValue::Float),
            },
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            MetadataValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, MetadataValue::Str(_))
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Int(i) => write!(f, "{}", i),
            MetadataValue::Float(v) => write!(f, "{:?}", v),
            MetadataValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Str(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Str(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Int(i)
    }
}

impl From<i32> for MetadataValue {
    fn from(i: i32) -> Self {
        MetadataValue::Int(i64::from(i))
    }
}

impl From<f64> for MetadataValue {
    fn from(f: f64) -> Self {
        MetadataValue::Float(f)
    }
}

/// 문서 메타데이터 (키 순서 고정)
pub type Metadata = BTreeMap<String, MetadataValue>;

// ============================================================================
// Document
// ============================================================================

/// 문서 종류 (`type` 메타데이터)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Product,
    Review,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Product => "product",
            DocumentKind::Review => "review",
        }
    }
}

/// 인덱싱 가능한 문서
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn kind(&self) -> Option<DocumentKind> {
        match self.metadata.get("type").and_then(MetadataValue::as_str) {
            Some("product") => Some(DocumentKind::Product),
            Some("review") => Some(DocumentKind::Review),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
