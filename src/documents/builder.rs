//! Document Builder
//!
//! 상품/리뷰 레코드를 인덱싱 문서로 변환합니다.
//! 레코드 하나의 결함은 해당 필드만 생략하며, 배치 전체를 실패시키지 않습니다.

use std::collections::HashMap;

use serde_json::Value;

use super::coerce::{parse_float, parse_int};
use super::{Document, DocumentKind, Metadata, MetadataValue};
use crate::backend::{is_truthy, ProductRecord, ReviewRecord};

const MISSING: &str = "N/A";
const UNKNOWN_PRODUCT: &str = "produit";
const ANONYMOUS: &str = "Anonyme";
const VERIFIED_MARKER: &str = " (Achat vérifié)";

// ============================================================================
// Build Output
// ============================================================================

/// 빌드 결과
#[derive(Debug, Clone, Default)]
pub struct BuiltDocuments {
    pub documents: Vec<Document>,
    pub product_count: usize,
    pub review_count: usize,
}

/// 상품/리뷰 전체를 문서로 변환
pub fn build_documents(products: &[ProductRecord], reviews: &[ReviewRecord]) -> BuiltDocuments {
    let mut documents: Vec<Document> = products.iter().map(product_document).collect();
    let product_count = documents.len();

    let names = ProductNames::from_products(products);
    documents.extend(reviews.iter().filter_map(|r| review_document(r, &names)));
    let review_count = documents.len() - product_count;

    tracing::info!(
        "Built {} documents ({} products + {} reviews)",
        documents.len(),
        product_count,
        review_count
    );

    BuiltDocuments {
        documents,
        product_count,
        review_count,
    }
}

// ============================================================================
// Products
// ============================================================================

/// 상품 문서 생성
pub fn product_document(product: &ProductRecord) -> Document {
    let mut lines = vec![
        format!("Produit : {}", display_or_missing(&product.name)),
        format!("Prix : {} dirhams", display_or_missing(&product.price)),
        format!("Description : {}", display_or_missing(&product.description)),
    ];

    let optional: [(&Option<Value>, &str, &str); 6] = [
        (&product.brand, "Marque : ", ""),
        (&product.origin, "Origine : ", ""),
        (&product.roast_level, "Torréfaction : ", ""),
        (&product.tasting_notes, "Notes de dégustation : ", ""),
        (&product.quantity, "Stock : ", " unités"),
        (&product.average_rating, "Note moyenne : ", "/5"),
    ];
    for (field, prefix, suffix) in optional {
        if let Some(value) = truthy(field) {
            lines.push(format!("{}{}{}", prefix, display_value(value), suffix));
        }
    }

    let mut metadata = Metadata::new();
    metadata.insert("type".to_string(), DocumentKind::Product.as_str().into());
    insert_json(&mut metadata, "id", &product.id);
    insert_json(&mut metadata, "name", &product.name);

    if let Some(price) = product.price.as_ref().and_then(parse_float) {
        metadata.insert("price".to_string(), MetadataValue::Float(price));
    }
    if let Some(rating) = product.average_rating.as_ref().and_then(parse_float) {
        metadata.insert("averageRating".to_string(), MetadataValue::Float(rating));
    }

    for (key, field) in [
        ("category", &product.category),
        ("brand", &product.brand),
        ("origin", &product.origin),
    ] {
        if let Some(value) = truthy(field).and_then(MetadataValue::from_json) {
            metadata.insert(key.to_string(), value);
        }
    }

    Document {
        text: lines.join("\n"),
        metadata,
    }
}

// ============================================================================
// Reviews
// ============================================================================

/// 상품 ID -> 상품명 매핑
///
/// 리뷰마다 상품 목록을 훑지 않도록 한 번만 구성합니다.
#[derive(Debug, Clone, Default)]
pub struct ProductNames {
    names: HashMap<IdKey, String>,
}

impl ProductNames {
    pub fn from_products(products: &[ProductRecord]) -> Self {
        let mut names = HashMap::with_capacity(products.len());

        for product in products {
            let Some(key) = product.id.as_ref().and_then(IdKey::from_json) else {
                continue;
            };
            let name = match &product.name {
                Some(value) => display_value(value),
                None => UNKNOWN_PRODUCT.to_string(),
            };
            // 중복 ID는 먼저 나온 상품 우선
            names.entry(key).or_insert(name);
        }

        Self { names }
    }

    /// 상품명 조회 (없으면 "produit")
    pub fn resolve(&self, product_id: Option<&Value>) -> &str {
        product_id
            .and_then(IdKey::from_json)
            .and_then(|key| self.names.get(&key))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_PRODUCT)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// 리뷰 문서 생성 (인덱싱 대상이 아니면 None)
pub fn review_document(review: &ReviewRecord, names: &ProductNames) -> Option<Document> {
    if !review.is_indexable() {
        return None;
    }

    let product_name = names.resolve(review.product_id.as_ref());
    let customer_name = match &review.customer_name {
        Some(value) => display_value(value),
        None => ANONYMOUS.to_string(),
    };
    let comment = review.comment.as_ref().map(display_value).unwrap_or_default();

    let mut text = format!(
        "Avis sur {} : Note {}/5 - {} - Client : {}",
        product_name,
        display_or_missing(&review.rating),
        comment,
        customer_name
    );
    if review.is_verified.as_ref().is_some_and(is_truthy) {
        text.push_str(VERIFIED_MARKER);
    }

    let mut metadata = Metadata::new();
    metadata.insert("type".to_string(), DocumentKind::Review.as_str().into());
    insert_json(&mut metadata, "productId", &review.product_id);
    metadata.insert("productName".to_string(), product_name.into());
    metadata.insert("customerName".to_string(), customer_name.into());

    if let Some(rating) = review.rating.as_ref().and_then(parse_int) {
        metadata.insert("rating".to_string(), MetadataValue::Int(rating));
    }

    Some(Document { text, metadata })
}

// ============================================================================
// Helpers
// ============================================================================

/// ID 비교 키 (1 == 1.0, 숫자와 문자열은 구분)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IdKey {
    Int(i64),
    Float(u64),
    Text(String),
}

impl IdKey {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Some(IdKey::Int(i));
                }
                let f = n.as_f64()?;
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    Some(IdKey::Int(f as i64))
                } else {
                    Some(IdKey::Float(f.to_bits()))
                }
            }
            Value::String(s) => Some(IdKey::Text(s.clone())),
            _ => None,
        }
    }
}

fn truthy(field: &Option<Value>) -> Option<&Value> {
    field.as_ref().filter(|v| is_truthy(v))
}

fn insert_json(metadata: &mut Metadata, key: &str, field: &Option<Value>) {
    if let Some(value) = field.as_ref().and_then(MetadataValue::from_json) {
        metadata.insert(key.to_string(), value);
    }
}

fn display_or_missing(field: &Option<Value>) -> String {
    match field {
        Some(value) if !value.is_null() => display_value(value),
        _ => MISSING.to_string(),
    }
}

/// 텍스트 조립용 값 표현 (문자열은 따옴표 없이)
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => MISSING.to_string(),
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
