//! 백엔드 레코드 타입
//!
//! 쇼핑몰 백엔드가 돌려주는 JSON 레코드입니다.
//! 모든 필드는 느슨한 타입(`serde_json::Value`)으로 받습니다.
//! 숫자 필드가 문자열로 오거나, 비어 있거나, null일 수 있기 때문입니다.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 상품 레코드 (`/api/products`, `/api/products/with-stats`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub description: Option<Value>,
    #[serde(default)]
    pub brand: Option<Value>,
    #[serde(default)]
    pub origin: Option<Value>,
    #[serde(default)]
    pub roast_level: Option<Value>,
    #[serde(default)]
    pub tasting_notes: Option<Value>,
    #[serde(default)]
    pub quantity: Option<Value>,
    #[serde(default)]
    pub average_rating: Option<Value>,
    #[serde(default)]
    pub category: Option<Value>,
}

/// 리뷰 레코드 (`/api/reviews`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub product_id: Option<Value>,
    #[serde(default)]
    pub rating: Option<Value>,
    #[serde(default)]
    pub comment: Option<Value>,
    #[serde(default)]
    pub customer_name: Option<Value>,
    /// 필드가 없으면 None, `null`이면 `Some(Value::Null)`
    #[serde(default, deserialize_with = "present")]
    pub is_visible: Option<Value>,
    #[serde(default)]
    pub is_verified: Option<Value>,
}

impl ReviewRecord {
    /// 인덱싱 대상 여부
    ///
    /// 코멘트가 비어 있지 않고, `isVisible`이 없거나 참일 때만 true.
    /// `isVisible`이 있으면서 거짓(`false`, `null`, `0`, `""`)이면 숨김입니다.
    pub fn is_indexable(&self) -> bool {
        let has_comment = self.comment.as_ref().is_some_and(is_truthy);
        let hidden = self.is_visible.as_ref().is_some_and(|v| !is_truthy(v));
        has_comment && !hidden
    }
}

/// 존재하는 필드는 `null`이어도 `Some`으로 받음
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// 백엔드에서 가져온 전체 카탈로그
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub products: Vec<ProductRecord>,
    pub reviews: Vec<ReviewRecord>,
}

/// JSON 값의 "참" 여부
///
/// null, 빈 문자열, 0, false, 빈 배열/객체는 거짓입니다.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
