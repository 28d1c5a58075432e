//! PostgreSQL + pgvector Vector Store
//!
//! 문서 텍스트, JSONB 메타데이터, `vector(N)` 임베딩을 한 테이블에 저장합니다.
//! 검색은 코사인 거리(`<=>`) 순으로 정렬하며, 필터는 파라미터 바인딩된
//! `WHERE` 절로 컴파일됩니다.
//! ref: https://github.com/pgvector/pgvector

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::filter::{Comparison, Filter, Operator};
use super::vector::{SearchResult, VectorEntry, VectorStore};
use crate::documents::{Document, Metadata, MetadataValue};

/// 커넥션 풀 크기
const MAX_CONNECTIONS: u32 = 5;

/// 커넥션 획득 타임아웃
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// PgVectorStore
// ============================================================================

/// pgvector 저장소
pub struct PgVectorStore {
    pool: PgPool,
    table: String,
    dimension: usize,
}

impl PgVectorStore {
    /// 데이터베이스 연결 및 스키마 준비
    ///
    /// `vector` 확장이 없으면 생성을 시도합니다.
    pub async fn connect(database_url: &str, collection: &str, dimension: usize) -> Result<Self> {
        let table = sanitize_table_name(collection)?;

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let store = Self {
            pool,
            table,
            dimension,
        };
        store.ensure_schema().await?;

        tracing::info!("Connected to pgvector collection {}", store.table);
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .context("Failed to enable pgvector extension (CREATE EXTENSION vector)")?;

        sqlx::query(&self.create_table_sql())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create table {}", self.table))?;

        Ok(())
    }

    fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\
             id UUID PRIMARY KEY, \
             document TEXT NOT NULL, \
             cmetadata JSONB NOT NULL, \
             embedding vector({}) NOT NULL)",
            self.table, self.dimension
        )
    }

    /// 검색 쿼리 구성 (실행 전)
    fn search_query(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT document, cmetadata, (embedding <=> ");
        qb.push_bind(vector_literal(query_embedding));
        qb.push(format!("::vector) AS distance FROM \"{}\"", self.table));

        if let Some(filter) = filter {
            qb.push(" WHERE ");
            push_filter(&mut qb, filter);
        }

        qb.push(" ORDER BY distance ASC LIMIT ");
        qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        qb
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn recreate(&self) -> Result<()> {
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", self.table))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to drop table {}", self.table))?;
        tracing::info!("Dropped pgvector collection {}", self.table);

        self.ensure_schema().await
    }

    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != self.dimension) {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                bad.embedding.len()
            );
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO \"{}\" (id, document, cmetadata, embedding) ",
            self.table
        ));
        qb.push_values(entries, |mut row, entry| {
            row.push_bind(Uuid::new_v4())
                .push_bind(entry.document.text.clone())
                .push_bind(Json(entry.document.metadata.clone()))
                .push_bind(vector_literal(&entry.embedding))
                .push_unseparated("::vector");
        });

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .context("Failed to insert vectors")?;

        Ok(result.rows_affected() as usize)
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchResult>> {
        let mut qb = self.search_query(query_embedding, limit, filter);
        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to execute pgvector search")?;

        rows.iter()
            .map(|row| -> Result<SearchResult> {
                let text: String = row.try_get("document")?;
                let Json(metadata): Json<Metadata> = row.try_get("cmetadata")?;
                let distance: f64 = row.try_get("distance")?;
                Ok(SearchResult {
                    document: Document { text, metadata },
                    similarity: (1.0 - distance) as f32,
                })
            })
            .collect()
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", self.table))
            .fetch_one(&self.pool)
            .await
            .context("Failed to count rows")?;
        Ok(count as usize)
    }

    fn name(&self) -> &str {
        "pgvector"
    }
}

// ============================================================================
// SQL helpers
// ============================================================================

/// 테이블 이름 검증 (영숫자와 밑줄만 허용)
pub fn sanitize_table_name(name: &str) -> Result<String> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        anyhow::bail!(
            "Invalid collection name '{}': use letters, digits and underscores only",
            name
        );
    }
    Ok(name.to_string())
}

/// pgvector 텍스트 표현 (`[1,2,3]`)
pub fn vector_literal(values: &[f32]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// 필터를 WHERE 절로 컴파일
///
/// 저장된 값의 JSON 타입이 비교 값과 다르면 NULL이 되어 매칭되지 않습니다.
fn push_filter(qb: &mut QueryBuilder<'static, Postgres>, filter: &Filter) {
    match filter {
        Filter::Comparison(c) => push_comparison(qb, c),
        Filter::Operation(op) => match op.operator {
            Operator::Not => {
                qb.push("NOT (");
                match op.arguments.as_slice() {
                    [single] => push_filter(qb, single),
                    many => push_filter(qb, &Filter::and(many.to_vec())),
                }
                qb.push(")");
            }
            Operator::And | Operator::Or => {
                if op.arguments.is_empty() {
                    qb.push(if op.operator == Operator::And { "TRUE" } else { "FALSE" });
                    return;
                }
                let joiner = if op.operator == Operator::And { " AND " } else { " OR " };
                qb.push("(");
                for (i, arg) in op.arguments.iter().enumerate() {
                    if i > 0 {
                        qb.push(joiner);
                    }
                    push_filter(qb, arg);
                }
                qb.push(")");
            }
        },
    }
}

fn push_comparison(qb: &mut QueryBuilder<'static, Postgres>, c: &Comparison) {
    let (json_type, cast) = if c.value.is_numeric() {
        ("number", "::float8")
    } else {
        ("string", "")
    };

    qb.push("((CASE WHEN jsonb_typeof(cmetadata -> ");
    qb.push_bind(c.attribute.clone());
    qb.push(format!(") = '{}' THEN (cmetadata ->> ", json_type));
    qb.push_bind(c.attribute.clone());
    qb.push(format!("){} END) {} ", cast, c.comparator.sql()));

    match &c.value {
        MetadataValue::Str(s) => {
            qb.push_bind(s.clone());
        }
        other => {
            qb.push_bind(other.as_f64().unwrap_or_default());
        }
    }
    qb.push(")");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_table_name() {
        assert_eq!(
            sanitize_table_name("products_reviews").unwrap(),
            "products_reviews"
        );
        assert!(sanitize_table_name("").is_err());
        assert!(sanitize_table_name("1abc").is_err());
        assert!(sanitize_table_name("x; DROP TABLE users").is_err());
        assert!(sanitize_table_name("a\"b").is_err());
    }

    #[test]
    fn test_vector_literal() {
        assert_eq!(vector_literal(&[1.0, 0.5, -2.0]), "[1,0.5,-2]");
        assert_eq!(vector_literal(&[]), "[]");
    }

    #[test]
    fn test_filter_sql_uses_bind_parameters() {
        let mut qb: QueryBuilder<'static, Postgres> = QueryBuilder::new("");
        let filter = Filter::and(vec![
            Filter::eq("type", "product"),
            Filter::lt("price", 100),
        ]);
        push_filter(&mut qb, &filter);

        let sql = qb.sql();
        assert_eq!(
            sql,
            "(((CASE WHEN jsonb_typeof(cmetadata -> $1) = 'string' THEN (cmetadata ->> $2) END) = $3) AND \
             ((CASE WHEN jsonb_typeof(cmetadata -> $4) = 'number' THEN (cmetadata ->> $5)::float8 END) < $6))"
        );
        // 값은 SQL 문자열에 포함되지 않음
        assert!(!sql.contains("product"));
    }

    #[test]
    fn test_filter_sql_not_and_empty() {
        let mut qb: QueryBuilder<'static, Postgres> = QueryBuilder::new("");
        push_filter(&mut qb, &Filter::not(Filter::or(vec![])));
        assert_eq!(qb.sql(), "NOT (FALSE)");
    }

    #[test]
    #[ignore = "requires PostgreSQL with pgvector (set PGVECTOR_TEST_URL)"]
    fn test_live_roundtrip() {
        let Ok(url) = std::env::var("PGVECTOR_TEST_URL") else {
            return;
        };

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = PgVectorStore::connect(&url, "cafe_rag_test", 2).await.unwrap();
            store.recreate().await.unwrap();

            let mut metadata = Metadata::new();
            metadata.insert("type".to_string(), "product".into());
            metadata.insert("price".to_string(), MetadataValue::Float(80.0));
            let entry = VectorEntry {
                document: Document {
                    text: "Produit : Moka".to_string(),
                    metadata,
                },
                embedding: vec![1.0, 0.0],
            };
            assert_eq!(store.insert_batch(&[entry]).await.unwrap(), 1);
            assert_eq!(store.count().await.unwrap(), 1);

            let hits = store
                .search(&[1.0, 0.0], 5, Some(&Filter::lt("price", 100)))
                .await
                .unwrap();
            assert_eq!(hits.len(), 1);
            assert!((hits[0].similarity - 1.0).abs() < 1e-4);

            let none = store
                .search(&[1.0, 0.0], 5, Some(&Filter::eq("type", "review")))
                .await
                .unwrap();
            assert!(none.is_empty());
        });
    }
}
