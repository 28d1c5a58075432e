//! Self-query 플래너
//!
//! 질문과 선언된 메타데이터 속성 스키마를 LLM에 전달하여
//! 시맨틱 질의 + 구조화 필터를 생성합니다.
//!
//! 출력 검증 규칙:
//! - 선언되지 않은 속성을 참조하는 필터는 폐기 (경고)
//! - 문자열 속성은 `eq`/`ne`와 문자열 값만 허용
//! - 숫자 속성은 숫자 값만 허용
//! - 빈 시맨틱 질의는 원래 질문으로 대체

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::knowledge::{Comparison, Filter};
use crate::llm::ChatModel;

/// 인덱싱된 문서 내용 설명
pub const CONTENT_DESCRIPTION: &str =
    "Informations textuelles sur un produit de café ou un avis client.";

// ============================================================================
// Attribute schema
// ============================================================================

/// 속성 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Integer,
    Float,
}

/// 필터 가능한 메타데이터 속성
#[derive(Debug, Clone, Serialize)]
pub struct AttributeInfo {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
}

impl AttributeInfo {
    const fn new(name: &'static str, description: &'static str, attr_type: AttributeType) -> Self {
        Self {
            name,
            description,
            attr_type,
        }
    }

    /// 비교가 이 속성 타입에 유효한지
    pub fn accepts(&self, comparison: &Comparison) -> bool {
        match self.attr_type {
            AttributeType::String => {
                comparison.comparator.is_equality() && !comparison.value.is_numeric()
            }
            AttributeType::Integer | AttributeType::Float => comparison.value.is_numeric(),
        }
    }
}

/// 카탈로그 문서에 선언된 속성
pub fn catalog_attributes() -> Vec<AttributeInfo> {
    vec![
        AttributeInfo::new(
            "type",
            "Le type de document, 'product' pour un produit ou 'review' pour un avis",
            AttributeType::String,
        ),
        AttributeInfo::new("name", "Le nom du produit", AttributeType::String),
        AttributeInfo::new("price", "Le prix du produit en dirhams", AttributeType::Float),
        AttributeInfo::new(
            "category",
            "La catégorie du produit (ex: 'Café en grains', 'Machine', 'Accessoire')",
            AttributeType::String,
        ),
        AttributeInfo::new("brand", "La marque du produit", AttributeType::String),
        AttributeInfo::new(
            "averageRating",
            "La note moyenne d'un produit, de 0 à 5",
            AttributeType::Float,
        ),
        AttributeInfo::new(
            "origin",
            "Le pays ou la région d'origine du café",
            AttributeType::String,
        ),
        AttributeInfo::new(
            "rating",
            "La note donnée dans un avis (review), de 1 à 5",
            AttributeType::Integer,
        ),
    ]
}

// ============================================================================
// StructuredQuery
// ============================================================================

/// 플래너 출력
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredQuery {
    /// 임베딩할 시맨틱 질의
    pub query: String,
    /// 메타데이터 필터 (없으면 전체 검색)
    pub filter: Option<Filter>,
    /// 결과 수 힌트
    pub limit: Option<usize>,
}

impl StructuredQuery {
    /// 필터 없는 질의
    pub fn plain(query: &str) -> Self {
        Self {
            query: query.to_string(),
            filter: None,
            limit: None,
        }
    }
}

// ============================================================================
// QueryPlanner
// ============================================================================

/// LLM 기반 질의 플래너
pub struct QueryPlanner {
    llm: Arc<dyn ChatModel>,
    attributes: Vec<AttributeInfo>,
    content_description: String,
}

impl QueryPlanner {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        content_description: &str,
        attributes: Vec<AttributeInfo>,
    ) -> Self {
        Self {
            llm,
            attributes,
            content_description: content_description.to_string(),
        }
    }

    /// 카탈로그 스키마로 생성
    pub fn for_catalog(llm: Arc<dyn ChatModel>) -> Self {
        Self::new(llm, CONTENT_DESCRIPTION, catalog_attributes())
    }

    /// 질문을 구조화 질의로 변환
    pub async fn plan(&self, question: &str) -> Result<StructuredQuery> {
        let prompt = self.prompt(question)?;
        let output = self
            .llm
            .generate(&prompt)
            .await
            .context("Query planner call failed")?;

        let planned = self.parse(&output, question)?;
        tracing::debug!(
            "Planned query {:?} with filter {:?}",
            planned.query,
            planned.filter
        );
        Ok(planned)
    }

    /// 플래너 프롬프트 구성 (질문은 그대로 삽입)
    pub fn prompt(&self, question: &str) -> Result<String> {
        let attributes = serde_json::to_string_pretty(&self.attributes)
            .context("Failed to serialize attribute schema")?;

        Ok(format!(
            "{PLANNER_INSTRUCTIONS}\n\n\
             << Data Source >>\n\
             Content: {content}\n\
             Attributes:\n{attributes}\n\n\
             << User Query >>\n\
             {question}\n\n\
             << Structured Request >>\n",
            content = self.content_description,
        ))
    }

    /// LLM 출력 파싱 및 검증
    pub fn parse(&self, output: &str, question: &str) -> Result<StructuredQuery> {
        let json = strip_code_fence(output);
        let value: Value = serde_json::from_str(json)
            .with_context(|| format!("Query planner returned invalid JSON: {}", output.trim()))?;

        let query = value
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(question)
            .to_string();

        let filter = match value.get("filter") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.eq_ignore_ascii_case("NO_FILTER") => None,
            Some(Value::Object(map)) if map.is_empty() => None,
            Some(raw) => match serde_json::from_value::<Filter>(raw.clone()) {
                Ok(filter) => self.validate(filter),
                Err(e) => {
                    tracing::warn!("Dropping unparseable filter {}: {}", raw, e);
                    None
                }
            },
        };

        let limit = value
            .get("limit")
            .and_then(Value::as_u64)
            .filter(|&l| l > 0)
            .map(|l| l as usize);

        Ok(StructuredQuery {
            query,
            filter,
            limit,
        })
    }

    /// 선언된 스키마에 맞지 않는 필터는 통째로 폐기
    fn validate(&self, filter: Filter) -> Option<Filter> {
        for comparison in filter.comparisons() {
            let Some(attribute) = self.attributes.iter().find(|a| a.name == comparison.attribute)
            else {
                tracing::warn!(
                    "Dropping filter on undeclared attribute '{}'",
                    comparison.attribute
                );
                return None;
            };

            if !attribute.accepts(comparison) {
                tracing::warn!(
                    "Dropping filter: {:?} {} is not valid for {:?} attribute '{}'",
                    comparison.comparator,
                    comparison.value,
                    attribute.attr_type,
                    attribute.name
                );
                return None;
            }
        }
        Some(filter)
    }
}

/// Markdown 코드 펜스 제거
fn strip_code_fence(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // 언어 태그 (```json) 건너뛰기
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim()
}

const PLANNER_INSTRUCTIONS: &str = r#"Your goal is to structure the user's query to match the request schema provided below.

Answer with a single JSON object and nothing else:
{
    "query": string, // text to compare against document contents
    "filter": object or null, // condition used to filter documents
    "limit": integer or null // number of documents to retrieve, only if the user asks for a specific number
}

A filter is either a comparison or a logical operation:
- comparison: {"comparator": "eq" | "ne" | "gt" | "gte" | "lt" | "lte", "attribute": string, "value": string or number}
- operation: {"operator": "and" | "or" | "not", "arguments": [filter, ...]}

Rules:
- The "query" must only contain text expected to match document contents. Remove any filter conditions from it.
- Only use the attributes listed in the data source, with values of the attribute's type.
- String attributes only support "eq" and "ne".
- Use null for "filter" when no condition applies."#;

// ============================================================================
// Tests
// ============================================================================
