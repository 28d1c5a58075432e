//! LanceDB Vector Store - 로컬 영속 벡터 검색
//!
//! ANN (Approximate Nearest Neighbor) 검색으로 대용량 벡터에서도 빠른 검색을 지원합니다.
//! 필터 대상 속성은 전용 컬럼으로 저장하여 `only_if` 조건으로 사전 필터링합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Float64Array, Int64Array, RecordBatch,
    RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use super::filter::Filter;
use super::vector::{SearchResult, VectorEntry, VectorStore};
use crate::documents::{Document, Metadata, MetadataValue};

/// 필터 가능한 문자열 속성 (속성명, 컬럼명)
const STRING_COLUMNS: [(&str, &str); 5] = [
    ("type", "doc_type"),
    ("name", "name"),
    ("category", "category"),
    ("brand", "brand"),
    ("origin", "origin"),
];

/// 필터 가능한 실수 속성
const FLOAT_COLUMNS: [(&str, &str); 2] = [("price", "price"), ("averageRating", "average_rating")];

/// 필터 가능한 정수 속성
const INT_COLUMNS: [(&str, &str); 1] = [("rating", "rating")];

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
///
/// LanceDB는 고성능 벡터 검색을 위한 columnar 데이터베이스입니다.
/// Apache Arrow 기반으로 빠른 읽기/쓰기를 제공합니다.
pub struct LanceVectorStore {
    db: Connection,
    table_name: String,
    dimension: i32,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `table_name` - 컬렉션(테이블) 이름
    /// * `dimension` - 임베딩 차원
    pub async fn open(path: &Path, table_name: &str, dimension: usize) -> Result<Self> {
        // 부모 디렉토리 생성
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        Ok(Self {
            db,
            table_name: table_name.to_string(),
            dimension,
        })
    }

    /// 필터 속성명 -> 컬럼명
    fn column_for(attribute: &str) -> Option<String> {
        STRING_COLUMNS
            .iter()
            .chain(FLOAT_COLUMNS.iter())
            .chain(INT_COLUMNS.iter())
            .find(|(attr, _)| *attr == attribute)
            .map(|(_, col)| col.to_string())
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(&self) -> Schema {
        let mut fields = vec![
            Field::new("text", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
        ];
        for (_, col) in STRING_COLUMNS {
            fields.push(Field::new(col, DataType::Utf8, true));
        }
        for (_, col) in FLOAT_COLUMNS {
            fields.push(Field::new(col, DataType::Float64, true));
        }
        for (_, col) in INT_COLUMNS {
            fields.push(Field::new(col, DataType::Int64, true));
        }
        fields.push(Field::new(
            "embedding",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                self.dimension,
            ),
            false,
        ));
        Schema::new(fields)
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[VectorEntry]) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        let expected = self.dimension as usize;
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != expected) {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                expected,
                bad.embedding.len()
            );
        }

        let texts: Vec<&str> = entries.iter().map(|e| e.document.text.as_str()).collect();
        let metadata_json = entries
            .iter()
            .map(|e| serde_json::to_string(&e.document.metadata))
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to serialize metadata")?;

        let mut columns: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(metadata_json)),
        ];

        for (attr, _) in STRING_COLUMNS {
            let values: Vec<Option<&str>> = entries
                .iter()
                .map(|e| e.document.metadata.get(attr).and_then(MetadataValue::as_str))
                .collect();
            columns.push(Arc::new(StringArray::from(values)));
        }
        for (attr, _) in FLOAT_COLUMNS {
            let values: Vec<Option<f64>> = entries
                .iter()
                .map(|e| e.document.metadata.get(attr).and_then(MetadataValue::as_f64))
                .collect();
            columns.push(Arc::new(Float64Array::from(values)));
        }
        for (attr, _) in INT_COLUMNS {
            let values: Vec<Option<i64>> = entries
                .iter()
                .map(|e| match e.document.metadata.get(attr) {
                    Some(MetadataValue::Int(i)) => Some(*i),
                    _ => None,
                })
                .collect();
            columns.push(Arc::new(Int64Array::from(values)));
        }

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;
        columns.push(Arc::new(embeddings_list));

        let batch = RecordBatch::try_new(Arc::new(self.create_schema()), columns)
            .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.contains(&self.table_name))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(&self.table_name)
            .execute()
            .await
            .with_context(|| format!("Failed to open table {}", self.table_name))
    }

    /// 검색 결과 배치에서 문서 추출
    fn batch_to_results(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
        let texts = batch
            .column_by_name("text")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow::anyhow!("Missing text column"))?;

        let metadata = batch
            .column_by_name("metadata")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow::anyhow!("Missing metadata column"))?;

        // _distance 컬럼 (LanceDB가 자동 추가)
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

        let mut results = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let metadata: Metadata = serde_json::from_str(metadata.value(i))
                .context("Failed to parse stored metadata")?;

            // 거리를 유사도로 변환 (L2 거리 -> 유사도 근사)
            let similarity = 1.0 / (1.0 + distances.value(i));

            results.push(SearchResult {
                document: Document {
                    text: texts.value(i).to_string(),
                    metadata,
                },
                similarity,
            });
        }

        Ok(results)
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn recreate(&self) -> Result<()> {
        if self.table_exists().await {
            self.db
                .drop_table(&self.table_name)
                .await
                .with_context(|| format!("Failed to drop table {}", self.table_name))?;
            tracing::info!("Dropped LanceDB table {}", self.table_name);
        }

        self.db
            .create_empty_table(&self.table_name, Arc::new(self.create_schema()))
            .execute()
            .await
            .with_context(|| format!("Failed to create table {}", self.table_name))?;

        Ok(())
    }

    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = self.entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            // 기존 테이블에 추가
            self.open_table()
                .await?
                .add(batches)
                .execute()
                .await
                .context("Failed to add vectors to table")?;
        } else {
            // 새 테이블 생성
            self.db
                .create_table(&self.table_name, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        Ok(entries.len())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchResult>> {
        if !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;

        let mut query = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(limit);

        if let Some(filter) = filter {
            let predicate = filter.to_sql(&Self::column_for)?;
            tracing::debug!("LanceDB filter: {}", predicate);
            query = query.only_if(predicate);
        }

        let stream = query
            .execute()
            .await
            .context("Failed to execute vector search")?;

        // RecordBatch 스트림에서 결과 추출
        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut results = Vec::new();
        for batch in &batches {
            results.extend(Self::batch_to_results(batch)?);
        }

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let count = self
            .open_table()
            .await?
            .count_rows(None)
            .await
            .context("Failed to count rows")?;
        Ok(count)
    }

    fn name(&self) -> &str {
        "lancedb"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn create_test_entry(text: &str, kind: &str, price: Option<f64>, x: f32) -> VectorEntry {
        let mut metadata = Metadata::new();
        metadata.insert("type".to_string(), kind.into());
        if let Some(price) = price {
            metadata.insert("price".to_string(), price.into());
        }
        if kind == "review" {
            metadata.insert("rating".to_string(), MetadataValue::Int(5));
        }
        VectorEntry {
            document: Document {
                text: text.to_string(),
                metadata,
            },
            embedding: vec![x, 0.1, 0.1, 0.1],
        }
    }

    async fn open_store(dir: &TempDir, name: &str) -> LanceVectorStore {
        let lance_path = dir.path().join("test.lance");
        LanceVectorStore::open(&lance_path, name, DIM).await.unwrap()
    }

    #[test]
    fn test_column_mapping() {
        assert_eq!(LanceVectorStore::column_for("type").as_deref(), Some("doc_type"));
        assert_eq!(
            LanceVectorStore::column_for("averageRating").as_deref(),
            Some("average_rating")
        );
        assert_eq!(LanceVectorStore::column_for("customerName"), None);
    }

    #[tokio::test]
    async fn test_lance_store_basic() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir, "basic").await;

        // 초기 상태
        assert_eq!(store.count().await.unwrap(), 0);

        let entries = vec![
            create_test_entry("a", "product", Some(10.0), 0.1),
            create_test_entry("b", "review", None, 0.2),
        ];
        let inserted = store.insert_batch(&entries).await.unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_lance_search_roundtrips_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir, "search").await;

        store
            .insert_batch(&[
                create_test_entry("cheap", "product", Some(50.0), 0.1),
                create_test_entry("pricey", "product", Some(900.0), 0.2),
                create_test_entry("avis", "review", None, 0.3),
            ])
            .await
            .unwrap();

        let query = vec![0.1, 0.1, 0.1, 0.1];
        let results = store.search(&query, 2, None).await.unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 2);
        assert_eq!(results[0].document.text, "cheap");
        assert_eq!(
            results[0].document.metadata.get("price"),
            Some(&MetadataValue::Float(50.0))
        );
    }

    #[tokio::test]
    async fn test_lance_search_with_filter() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir, "filter").await;

        store
            .insert_batch(&[
                create_test_entry("cheap", "product", Some(50.0), 0.1),
                create_test_entry("pricey", "product", Some(900.0), 0.2),
                create_test_entry("avis", "review", None, 0.3),
            ])
            .await
            .unwrap();

        let query = vec![0.3, 0.1, 0.1, 0.1];
        let filter = Filter::and(vec![Filter::eq("type", "product"), Filter::gte("price", 100)]);
        let results = store.search(&query, 10, Some(&filter)).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.text, "pricey");
    }

    #[tokio::test]
    async fn test_lance_recreate() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir, "recreate").await;

        store
            .insert_batch(&[create_test_entry("a", "product", Some(1.0), 0.1)])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        store.recreate().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);

        store
            .insert_batch(&[create_test_entry("b", "product", Some(2.0), 0.1)])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lance_dimension_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir, "dims").await;

        let mut entry = create_test_entry("a", "product", None, 0.1);
        entry.embedding = vec![0.1; DIM + 1];
        assert!(store.insert_batch(&[entry]).await.is_err());
    }
}
