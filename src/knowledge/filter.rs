//! 메타데이터 필터
//!
//! self-query가 생성하는 구조화 필터입니다.
//! 비교(`eq ne gt gte lt lte`)를 `and`/`or`/`not`으로 조합합니다.
//!
//! 평가는 SQL의 3값 논리를 따릅니다. 키가 없거나 타입이 맞지 않으면
//! "unknown"이 되어 매칭되지 않습니다. 메모리/LanceDB/pgvector 백엔드가
//! 같은 결과를 내도록 하기 위함입니다.

use std::cmp::Ordering;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::documents::{Metadata, MetadataValue};

// ============================================================================
// Types
// ============================================================================

/// 비교 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparator {
    pub fn sql(&self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Ne => "<>",
            Comparator::Gt => ">",
            Comparator::Gte => ">=",
            Comparator::Lt => "<",
            Comparator::Lte => "<=",
        }
    }

    /// 문자열에 허용되는 연산자인지 (동등 비교만)
    pub fn is_equality(&self) -> bool {
        matches!(self, Comparator::Eq | Comparator::Ne)
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Comparator::Eq => ordering == Ordering::Equal,
            Comparator::Ne => ordering != Ordering::Equal,
            Comparator::Gt => ordering == Ordering::Greater,
            Comparator::Gte => ordering != Ordering::Less,
            Comparator::Lt => ordering == Ordering::Less,
            Comparator::Lte => ordering != Ordering::Greater,
        }
    }
}

/// 논리 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    And,
    Or,
    Not,
}

/// 속성 비교
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub comparator: Comparator,
    pub attribute: String,
    pub value: MetadataValue,
}

/// 논리 조합
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operator: Operator,
    pub arguments: Vec<Filter>,
}

/// 메타데이터 필터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    Comparison(Comparison),
    Operation(Operation),
}

// ============================================================================
// Constructors
// ============================================================================

impl Filter {
    pub fn compare(
        comparator: Comparator,
        attribute: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        Filter::Comparison(Comparison {
            comparator,
            attribute: attribute.into(),
            value: value.into(),
        })
    }

    pub fn eq(attribute: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::compare(Comparator::Eq, attribute, value)
    }

    pub fn lt(attribute: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::compare(Comparator::Lt, attribute, value)
    }

    pub fn gte(attribute: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::compare(Comparator::Gte, attribute, value)
    }

    pub fn and(arguments: Vec<Filter>) -> Self {
        Filter::Operation(Operation {
            operator: Operator::And,
            arguments,
        })
    }

    pub fn or(arguments: Vec<Filter>) -> Self {
        Filter::Operation(Operation {
            operator: Operator::Or,
            arguments,
        })
    }

    pub fn not(argument: Filter) -> Self {
        Filter::Operation(Operation {
            operator: Operator::Not,
            arguments: vec![argument],
        })
    }
}

// ============================================================================
// Evaluation
// ============================================================================

impl Filter {
    /// 필터에 등장하는 모든 비교
    pub fn comparisons(&self) -> Vec<&Comparison> {
        match self {
            Filter::Comparison(c) => vec![c],
            Filter::Operation(op) => op.arguments.iter().flat_map(|f| f.comparisons()).collect(),
        }
    }

    /// 매칭 여부 (unknown은 false)
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.evaluate(metadata) == Some(true)
    }

    /// 3값 평가 (None = unknown)
    pub fn evaluate(&self, metadata: &Metadata) -> Option<bool> {
        match self {
            Filter::Comparison(c) => c.evaluate(metadata),
            Filter::Operation(op) => {
                let results = op.arguments.iter().map(|f| f.evaluate(metadata));
                match op.operator {
                    Operator::And => {
                        let mut unknown = false;
                        for r in results {
                            match r {
                                Some(false) => return Some(false),
                                None => unknown = true,
                                Some(true) => {}
                            }
                        }
                        if unknown { None } else { Some(true) }
                    }
                    Operator::Or => {
                        let mut unknown = false;
                        for r in results {
                            match r {
                                Some(true) => return Some(true),
                                None => unknown = true,
                                Some(false) => {}
                            }
                        }
                        if unknown { None } else { Some(false) }
                    }
                    Operator::Not => not_argument(op).evaluate(metadata).map(|b| !b),
                }
            }
        }
    }

    /// SQL 조건식 렌더링 (LanceDB `only_if`용)
    ///
    /// # Arguments
    /// * `column` - 속성명 -> 컬럼명 매핑 (모르는 속성이면 None)
    pub fn to_sql(&self, column: &dyn Fn(&str) -> Option<String>) -> Result<String> {
        match self {
            Filter::Comparison(c) => {
                let col = column(&c.attribute)
                    .ok_or_else(|| anyhow::anyhow!("Unknown filter attribute: {}", c.attribute))?;
                Ok(format!("{} {} {}", col, c.comparator.sql(), sql_literal(&c.value)))
            }
            Filter::Operation(op) => match op.operator {
                Operator::Not => Ok(format!("NOT ({})", not_argument(op).to_sql(column)?)),
                Operator::And | Operator::Or => {
                    if op.arguments.is_empty() {
                        let neutral = if op.operator == Operator::And { "TRUE" } else { "FALSE" };
                        return Ok(neutral.to_string());
                    }
                    let joiner = if op.operator == Operator::And { " AND " } else { " OR " };
                    let parts = op
                        .arguments
                        .iter()
                        .map(|f| f.to_sql(column))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(format!("({})", parts.join(joiner)))
                }
            },
        }
    }
}

impl Comparison {
    fn evaluate(&self, metadata: &Metadata) -> Option<bool> {
        let actual = metadata.get(&self.attribute)?;
        let ordering = match (actual, &self.value) {
            (MetadataValue::Str(a), MetadataValue::Str(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                a.as_f64()?.partial_cmp(&b.as_f64()?)?
            }
            _ => return None,
        };
        Some(self.comparator.holds(ordering))
    }
}

/// `not`의 인자 (여러 개면 and로 묶음)
fn not_argument(op: &Operation) -> Filter {
    match op.arguments.as_slice() {
        [single] => single.clone(),
        many => Filter::and(many.to_vec()),
    }
}

fn sql_literal(value: &MetadataValue) -> String {
    match value {
        MetadataValue::Str(s) => format!("'{}'", s.replace('\'', "''")),
        MetadataValue::Int(i) => i.to_string(),
        MetadataValue::Float(f) => format!("{:?}", f),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(price: f64, brand: &str) -> Metadata {
        let mut md = Metadata::new();
        md.insert("type".to_string(), "product".into());
        md.insert("price".to_string(), price.into());
        md.insert("brand".to_string(), brand.into());
        md
    }

    fn review(rating: i64) -> Metadata {
        let mut md = Metadata::new();
        md.insert("type".to_string(), "review".into());
        md.insert("rating".to_string(), rating.into());
        md
    }

    #[test]
    fn test_comparison_numeric() {
        let cheap = Filter::lt("price", 100);
        assert!(cheap.matches(&product(80.0, "A")));
        assert!(!cheap.matches(&product(120.0, "A")));

        let good = Filter::gte("rating", 4.0);
        assert!(good.matches(&review(4)));
        assert!(!good.matches(&review(3)));
    }

    #[test]
    fn test_missing_attribute_is_unknown() {
        let filter = Filter::lt("price", 100);
        assert_eq!(filter.evaluate(&review(5)), None);
        assert!(!filter.matches(&review(5)));

        // NOT(unknown) 도 매칭되지 않음
        assert!(!Filter::not(filter).matches(&review(5)));
    }

    #[test]
    fn test_type_mismatch_is_unknown() {
        let filter = Filter::eq("brand", 3);
        assert_eq!(filter.evaluate(&product(10.0, "Atlas")), None);
    }

    #[test]
    fn test_logical_operators() {
        let filter = Filter::and(vec![
            Filter::eq("type", "product"),
            Filter::or(vec![Filter::eq("brand", "Atlas"), Filter::lt("price", 50)]),
        ]);

        assert!(filter.matches(&product(200.0, "Atlas")));
        assert!(filter.matches(&product(20.0, "Other")));
        assert!(!filter.matches(&product(200.0, "Other")));
        assert!(!filter.matches(&review(5)));
    }

    #[test]
    fn test_or_with_unknown() {
        let filter = Filter::or(vec![Filter::lt("price", 100), Filter::eq("type", "review")]);
        assert!(filter.matches(&review(2)));
        assert_eq!(
            Filter::or(vec![Filter::lt("price", 100), Filter::eq("type", "x")])
                .evaluate(&review(2)),
            None
        );
    }

    #[test]
    fn test_to_sql() {
        let filter = Filter::and(vec![
            Filter::eq("type", "product"),
            Filter::not(Filter::eq("brand", "L'Or")),
            Filter::lt("price", 99.5),
        ]);

        let column = |attr: &str| match attr {
            "type" => Some("doc_type".to_string()),
            "brand" => Some("brand".to_string()),
            "price" => Some("price".to_string()),
            _ => None,
        };

        let sql = filter.to_sql(&column).unwrap();
        assert_eq!(
            sql,
            "(doc_type = 'product' AND NOT (brand = 'L''Or') AND price < 99.5)"
        );

        assert!(Filter::eq("unknown", 1).to_sql(&column).is_err());
        assert_eq!(Filter::and(vec![]).to_sql(&column).unwrap(), "TRUE");
    }

    #[test]
    fn test_deserialize_from_json() {
        let json = r#"{
            "operator": "and",
            "arguments": [
                {"comparator": "eq", "attribute": "type", "value": "product"},
                {"comparator": "lte", "attribute": "price", "value": 150}
            ]
        }"#;
        let filter: Filter = serde_json::from_str(json).unwrap();
        assert_eq!(
            filter,
            Filter::and(vec![
                Filter::eq("type", "product"),
                Filter::compare(Comparator::Lte, "price", 150),
            ])
        );
        assert_eq!(filter.comparisons().len(), 2);
    }
}
