//! Retriever - 질문에서 관련 문서 검색
//!
//! - `VectorRetriever`: 질문 임베딩 후 top-k 유사도 검색
//! - `SelfQueryRetriever`: 플래너가 만든 시맨틱 질의 + 메타데이터 필터로 검색

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::self_query::{QueryPlanner, StructuredQuery};
use crate::documents::Document;
use crate::embedding::EmbeddingProvider;
use crate::knowledge::VectorStore;

/// 기본 검색 문서 수
pub const DEFAULT_K: usize = 10;

// ============================================================================
// Retriever Trait
// ============================================================================

/// 문서 검색기 트레이트
#[async_trait]
pub trait Retriever: Send + Sync {
    /// 질문과 관련된 문서 (유사도 내림차순)
    async fn retrieve(&self, question: &str) -> Result<Vec<Document>>;
}

/// 임베딩 + 검색 공통 경로
async fn search_documents(
    store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    query: &StructuredQuery,
    k: usize,
) -> Result<Vec<Document>> {
    let embedding = embedder
        .embed_query(&query.query)
        .await
        .context("Failed to embed query")?;

    // 사용자가 요청한 수는 k 이내로만 반영
    let limit = query.limit.map_or(k, |l| l.min(k)).max(1);

    let results = store
        .search(&embedding, limit, query.filter.as_ref())
        .await
        .with_context(|| format!("{} search failed", store.name()))?;

    tracing::debug!("Retrieved {} documents for {:?}", results.len(), query.query);
    Ok(results.into_iter().map(|r| r.document).collect())
}

// ============================================================================
// VectorRetriever
// ============================================================================

/// 단순 유사도 검색기
pub struct VectorRetriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    k: usize,
}

impl VectorRetriever {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>, k: usize) -> Self {
        Self { store, embedder, k }
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, question: &str) -> Result<Vec<Document>> {
        let query = StructuredQuery::plain(question);
        search_documents(self.store.as_ref(), self.embedder.as_ref(), &query, self.k).await
    }
}

// ============================================================================
// SelfQueryRetriever
// ============================================================================

/// self-query 검색기
pub struct SelfQueryRetriever {
    planner: QueryPlanner,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    k: usize,
}

impl SelfQueryRetriever {
    pub fn new(
        planner: QueryPlanner,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        k: usize,
    ) -> Self {
        Self {
            planner,
            store,
            embedder,
            k,
        }
    }
}

#[async_trait]
impl Retriever for SelfQueryRetriever {
    async fn retrieve(&self, question: &str) -> Result<Vec<Document>> {
        let query = self.planner.plan(question).await?;
        search_documents(self.store.as_ref(), self.embedder.as_ref(), &query, self.k).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{Metadata, MetadataValue};
    use crate::knowledge::{MemoryVectorStore, VectorEntry};
    use crate::llm::ChatModel;

    /// 텍스트에 "review"가 있으면 y축, 아니면 x축
    struct AxisEmbedding;

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("review") {
                Ok(vec![0.0, 1.0])
            } else {
                Ok(vec![1.0, 0.0])
            }
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "axis"
        }
    }

    struct CannedLlm(&'static str);

    #[async_trait]
    impl ChatModel for CannedLlm {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    async fn store() -> Arc<dyn VectorStore> {
        let store = MemoryVectorStore::new();
        let mut entries = Vec::new();
        for (text, price, embedding) in [
            ("moka", 80.0, vec![1.0, 0.0]),
            ("arabica", 150.0, vec![0.9, 0.1]),
            ("review text", 0.0, vec![0.0, 1.0]),
        ] {
            let mut metadata = Metadata::new();
            if price > 0.0 {
                metadata.insert("type".to_string(), "product".into());
                metadata.insert("price".to_string(), MetadataValue::Float(price));
            } else {
                metadata.insert("type".to_string(), "review".into());
            }
            entries.push(VectorEntry {
                document: Document {
                    text: text.to_string(),
                    metadata,
                },
                embedding,
            });
        }
        store.insert_batch(&entries).await.unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_vector_retriever_top_k() {
        let retriever = VectorRetriever::new(store().await, Arc::new(AxisEmbedding), 2);
        let docs = retriever.retrieve("un café").await.unwrap();
        let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["moka", "arabica"]);
    }

    #[tokio::test]
    async fn test_self_query_retriever_applies_filter() {
        let llm = CannedLlm(
            r#"{"query": "café", "filter": {"comparator": "gt", "attribute": "price", "value": 100}}"#,
        );
        let planner = QueryPlanner::for_catalog(Arc::new(llm));
        let retriever = SelfQueryRetriever::new(planner, store().await, Arc::new(AxisEmbedding), 10);

        let docs = retriever.retrieve("café à plus de 100 dirhams").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "arabica");
    }

    #[tokio::test]
    async fn test_self_query_limit_capped_by_k() {
        let llm = CannedLlm(r#"{"query": "café", "filter": null, "limit": 50}"#);
        let planner = QueryPlanner::for_catalog(Arc::new(llm));
        let retriever = SelfQueryRetriever::new(planner, store().await, Arc::new(AxisEmbedding), 2);

        assert_eq!(retriever.retrieve("tout").await.unwrap().len(), 2);
    }
}
