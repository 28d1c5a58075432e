//! 임베딩 모듈 - Gemini API를 통한 텍스트 벡터화
//!
//! 문서 텍스트와 질의를 벡터로 변환합니다.
//! 문서는 `RETRIEVAL_DOCUMENT`, 질의는 `RETRIEVAL_QUERY` 태스크로 임베딩합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let client = GeminiClient::new(api_key)?;
//! let embedder = GeminiEmbedding::new(client, "gemini-embedding-001", 768)?;
//! let embedding = embedder.embed_query("café éthiopien").await?;
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::gemini::GeminiClient;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 문서 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 검색 질의 임베딩 (기본 구현: 문서와 동일)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// 기본 임베딩 모델 (MRL 지원)
/// source: https://ai.google.dev/gemini-api/docs/embeddings
pub const DEFAULT_MODEL: &str = "gemini-embedding-001";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// 지원 차원 (MRL 권장값)
pub const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// 임베딩 태스크 타입
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

/// Google Gemini 임베딩 구현체
///
/// source: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug, Clone)]
pub struct GeminiEmbedding {
    client: GeminiClient,
    model: String,
    dimension: usize,
}

impl GeminiEmbedding {
    /// 새 Gemini 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `client` - Gemini REST 클라이언트
    /// * `model` - 임베딩 모델 이름
    /// * `dimension` - 임베딩 차원 (768, 1536, 3072 중 선택)
    pub fn new(client: GeminiClient, model: &str, dimension: usize) -> Result<Self> {
        // 유효한 차원 확인
        if !SUPPORTED_DIMENSIONS.contains(&dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            );
        }

        Ok(Self {
            client,
            model: model.strip_prefix("models/").unwrap_or(model).to_string(),
            dimension,
        })
    }

    fn request(&self, text: &str, task_type: TaskType) -> EmbedRequest {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type,
            output_dimensionality: Some(self.dimension),
        }
    }

    async fn embed_one(&self, text: &str, task_type: TaskType) -> Result<Vec<f32>> {
        // 빈 텍스트 처리
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let response: EmbedResponse = self
            .client
            .call(&self.model, "embedContent", &self.request(text, task_type))
            .await?;

        self.finish(response.embedding.values)
    }

    /// 차원 확인 후 정규화
    ///
    /// 3072 미만 차원은 정규화되지 않은 채로 반환됩니다.
    fn finish(&self, values: Vec<f32>) -> Result<Vec<f32>> {
        if values.len() != self.dimension {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                values.len()
            );
        }
        Ok(normalize(values))
    }
}

/// L2 정규화 (영벡터는 그대로)
pub fn normalize(mut values: Vec<f32>) -> Vec<f32> {
    let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|x| *x /= norm);
    }
    values
}

/// Gemini API 요청 본문
/// source: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: TaskType,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text, TaskType::RetrievalDocument).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text, TaskType::RetrievalQuery).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|t| self.request(t, TaskType::RetrievalDocument))
                .collect(),
        };

        tracing::debug!("Embedding batch of {} texts", texts.len());
        let response: BatchEmbedResponse = self
            .client
            .call(&self.model, "batchEmbedContents", &request)
            .await?;

        if response.embeddings.len() != texts.len() {
            anyhow::bail!(
                "Batch embedding returned {} vectors for {} texts",
                response.embeddings.len(),
                texts.len()
            );
        }

        response
            .embeddings
            .into_iter()
            .map(|e| self.finish(e.values))
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
