//! Vector Store - 벡터 검색 트레이트 및 유틸리티
//!
//! 백엔드 구현:
//! - `MemoryVectorStore`: 프로세스 내 인덱스 (전수 코사인 검색)
//! - `LanceVectorStore`: LanceDB (로컬 영속)
//! - `PgVectorStore`: PostgreSQL + pgvector

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::filter::Filter;
use crate::documents::Document;
use crate::embedding::EmbeddingProvider;

/// 임베딩 배치 크기 (batchEmbedContents 요청 당 최대 100개)
const EMBED_BATCH_SIZE: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 원본 문서
    pub document: Document,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// 문서
    pub document: Document,
    /// 유사도 스코어 (높을수록 유사)
    pub similarity: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 저장소의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 컬렉션 삭제 후 재생성 (전체 재빌드용)
    async fn recreate(&self) -> Result<()>;

    /// 벡터 배치 삽입
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 벡터 검색 (필터가 있으면 매칭되는 문서만)
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchResult>>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 백엔드 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Indexing
// ============================================================================

/// 문서를 임베딩하여 저장소에 적재
///
/// # Arguments
/// * `recreate` - true면 기존 컬렉션을 지우고 새로 만듦
///
/// # Returns
/// 저장된 벡터 수
pub async fn index_documents(
    store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    documents: &[Document],
    recreate: bool,
) -> Result<usize> {
    if recreate {
        store
            .recreate()
            .await
            .with_context(|| format!("Failed to recreate {} collection", store.name()))?;
    }

    let mut inserted = 0;

    for batch in documents.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .await
            .context("Failed to embed documents")?;

        if embeddings.len() != batch.len() {
            anyhow::bail!(
                "Embedding count mismatch: {} documents, {} vectors",
                batch.len(),
                embeddings.len()
            );
        }

        let entries: Vec<VectorEntry> = batch
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(document, embedding)| VectorEntry { document, embedding })
            .collect();

        inserted += store
            .insert_batch(&entries)
            .await
            .context("Failed to insert vectors")?;

        tracing::debug!("Indexed {}/{} documents", inserted, documents.len());
    }

    tracing::info!("Indexed {} documents into {}", inserted, store.name());
    Ok(inserted)
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 두 벡터 간의 코사인 유사도를 계산합니다.
/// 결과는 -1.0 ~ 1.0 범위입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================
