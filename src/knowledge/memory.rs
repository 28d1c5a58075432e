//! In-memory Vector Store
//!
//! 프로세스 내 인덱스입니다. 전수 코사인 유사도 검색을 수행하며,
//! 재시작하면 사라집니다. 소규모 카탈로그와 테스트에 적합합니다.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::filter::Filter;
use super::vector::{cosine_similarity, SearchResult, VectorEntry, VectorStore};

/// 메모리 벡터 저장소
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    entries: RwLock<Vec<VectorEntry>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn recreate(&self) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        entries.clear();
        Ok(())
    }

    async fn insert_batch(&self, batch: &[VectorEntry]) -> Result<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        entries.extend_from_slice(batch);
        Ok(batch.len())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchResult>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut results: Vec<SearchResult> = entries
            .iter()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.document.metadata)))
            .map(|e| SearchResult {
                document: e.document.clone(),
                similarity: cosine_similarity(query_embedding, &e.embedding),
            })
            .collect();

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        Ok(entries.len())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// Tests
// ============================================================================
