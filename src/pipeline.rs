//! 초기화 파이프라인
//!
//! 백엔드 조회 -> 문서 빌드 -> 임베딩/인덱싱 -> 플래너/검색기 -> 답변 체인
//!
//! 모든 단계는 시작 시 한 번 순차 실행되며, 실패하면 해결 방법이 담긴
//! `InitError`를 반환합니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::backend::{BackendClient, FetchError};
use crate::config::{Settings, VectorBackend};
use crate::documents::{build_documents, BuiltDocuments};
use crate::embedding::{EmbeddingProvider, GeminiEmbedding};
use crate::gemini::GeminiClient;
use crate::knowledge::{
    index_documents, LanceVectorStore, MemoryVectorStore, PgVectorStore, VectorStore,
};
use crate::llm::{ChatModel, GeminiChat};
use crate::retrieval::{
    AnswerChain, QueryPlanner, RetrievalQa, Retriever, SelfQueryRetriever, VectorRetriever,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ============================================================================
// Errors
// ============================================================================

/// 초기화 실패 (치명적)
#[derive(Debug, Error)]
pub enum InitError {
    #[error(
        "GOOGLE_API_KEY is not set. Add it to the environment or .env \
         (get a key at https://aistudio.google.com/app/apikey)"
    )]
    MissingApiKey,

    #[error("invalid configuration")]
    Config(#[source] BoxError),

    #[error(
        "failed to fetch products from {url}. \
         Check that the backend is running and BACKEND_URL is correct"
    )]
    Backend {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to set up the embedding model. Check EMBEDDING_MODEL and EMBEDDING_DIMENSION")]
    Embedding(#[source] BoxError),

    #[error("failed to open the {backend} vector store. {hint}")]
    VectorStore {
        backend: VectorBackend,
        hint: &'static str,
        #[source]
        source: BoxError,
    },

    #[error(
        "failed to index documents. Check the API key, network access to Gemini \
         and that the vector store is writable"
    )]
    Indexing(#[source] BoxError),
}

impl InitError {
    fn vector_store(backend: VectorBackend, source: anyhow::Error) -> Self {
        let hint = match backend {
            VectorBackend::PgVector => {
                "Check that PostgreSQL is running, that the pgvector extension is installed \
                 (CREATE EXTENSION vector;) and that the POSTGRES_* credentials are correct"
            }
            VectorBackend::Lance => "Check that LANCE_PATH is writable",
            VectorBackend::Memory => "",
        };
        InitError::VectorStore {
            backend,
            hint,
            source: source.into(),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// 인덱싱 결과 요약
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub products: usize,
    pub reviews: usize,
    pub indexed: usize,
    pub backend: VectorBackend,
    pub built_at: DateTime<Utc>,
}

/// 초기화된 RAG 시스템
pub struct RagSystem {
    pub chain: Arc<dyn AnswerChain>,
    pub stats: IndexStats,
}

/// 백엔드에서 레코드를 가져와 문서 빌드 (API 키 불필요)
pub async fn fetch_documents(settings: &Settings) -> Result<BuiltDocuments, InitError> {
    let client = BackendClient::new(&settings.backend_url, settings.backend_timeout)
        .map_err(|e| InitError::Config(e.into()))?
        .with_stats(settings.products_with_stats);

    let catalog = client
        .fetch_catalog()
        .await
        .map_err(|source| InitError::Backend {
            url: settings.backend_url.clone(),
            source,
        })?;

    Ok(build_documents(&catalog.products, &catalog.reviews))
}

/// 설정된 벡터 저장소 열기
pub async fn open_store(settings: &Settings) -> Result<Arc<dyn VectorStore>, InitError> {
    let backend = settings.vector_backend;
    let store: Arc<dyn VectorStore> = match backend {
        VectorBackend::Memory => Arc::new(MemoryVectorStore::new()),
        VectorBackend::Lance => Arc::new(
            LanceVectorStore::open(
                &settings.lance_path,
                &settings.collection_name,
                settings.embedding_dimension,
            )
            .await
            .map_err(|e| InitError::vector_store(backend, e))?,
        ),
        VectorBackend::PgVector => {
            tracing::info!("Connecting to PostgreSQL at {}", settings.postgres.display_target());
            let url = settings
                .postgres
                .connection_string()
                .map_err(|e| InitError::Config(e.into()))?;
            Arc::new(
                PgVectorStore::connect(&url, &settings.collection_name, settings.embedding_dimension)
                    .await
                    .map_err(|e| InitError::vector_store(backend, e))?,
            )
        }
    };
    Ok(store)
}

/// Gemini 클라이언트 생성
pub fn gemini_client(settings: &Settings) -> Result<GeminiClient, InitError> {
    let api_key = settings.api_key.as_deref().ok_or(InitError::MissingApiKey)?;
    GeminiClient::new(api_key)
        .and_then(|c| c.with_timeout(settings.llm_timeout))
        .map(|c| {
            c.with_base_url(&settings.gemini_base_url)
                .with_rate_limit(settings.gemini_rpm)
        })
        .map_err(|e| InitError::Config(e.into()))
}

/// 전체 초기화
///
/// # Arguments
/// * `return_sources` - 답변과 함께 근거 문서를 반환할지
pub async fn initialize(settings: &Settings, return_sources: bool) -> Result<RagSystem, InitError> {
    // 1. API 키 확인 (네트워크 호출 전에)
    let client = gemini_client(settings)?;

    // 2. 레코드 조회 + 문서 빌드
    let built = fetch_documents(settings).await?;

    // 3. 임베딩 모델
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(
        GeminiEmbedding::new(
            client.clone(),
            &settings.embedding_model,
            settings.embedding_dimension,
        )
        .map_err(|e| InitError::Embedding(e.into()))?,
    );

    // 4. 벡터 저장소 (항상 재생성)
    let store = open_store(settings).await?;
    let indexed = index_documents(store.as_ref(), embedder.as_ref(), &built.documents, true)
        .await
        .map_err(|e| InitError::Indexing(e.into()))?;

    // 5. LLM + 검색기
    let llm: Arc<dyn ChatModel> = Arc::new(GeminiChat::new(client, &settings.llm_model));
    let retriever: Arc<dyn Retriever> = if settings.self_query {
        let planner = QueryPlanner::for_catalog(llm.clone());
        Arc::new(SelfQueryRetriever::new(
            planner,
            store.clone(),
            embedder.clone(),
            settings.retriever_k,
        ))
    } else {
        Arc::new(VectorRetriever::new(store.clone(), embedder.clone(), settings.retriever_k))
    };

    // 6. 답변 체인
    let chain: Arc<dyn AnswerChain> =
        Arc::new(RetrievalQa::new(llm, retriever).with_source_documents(return_sources));

    let stats = IndexStats {
        products: built.product_count,
        reviews: built.review_count,
        indexed,
        backend: settings.vector_backend,
        built_at: Utc::now(),
    };
    tracing::info!(
        "RAG ready: {} products + {} reviews indexed into {} (self-query: {})",
        stats.products,
        stats.reviews,
        store.name(),
        settings.self_query
    );

    Ok(RagSystem { chain, stats })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        Settings::from_source(|k| map.get(k).map(|v| v.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_network() {
        // 백엔드 주소가 닫혀 있어도 API 키 에러가 먼저
        let s = settings(&[("BACKEND_URL", "http://127.0.0.1:9"), ("VECTOR_BACKEND", "memory")]);
        let err = initialize(&s, false).await.err().unwrap();
        assert!(matches!(err, InitError::MissingApiKey));
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_backend_error() {
        let s = settings(&[
            ("BACKEND_URL", "http://127.0.0.1:9"),
            ("BACKEND_TIMEOUT_SECS", "2"),
        ]);
        let err = fetch_documents(&s).await.err().unwrap();
        assert!(matches!(err, InitError::Backend { .. }));
        assert!(err.to_string().contains("BACKEND_URL"));
    }

    #[test]
    fn test_vector_store_hint() {
        let err = InitError::vector_store(VectorBackend::PgVector, anyhow::anyhow!("refused"));
        let msg = err.to_string();
        assert!(msg.contains("pgvector"));
        assert!(msg.contains("CREATE EXTENSION vector;"));
    }

    #[tokio::test]
    async fn test_open_memory_store() {
        let s = settings(&[("VECTOR_BACKEND", "memory")]);
        let store = open_store(&s).await.unwrap();
        assert_eq!(store.name(), "memory");
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
