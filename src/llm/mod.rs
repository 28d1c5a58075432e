//! LLM 모듈 - Gemini generateContent 호출
//!
//! self-query 플래너와 답변 체인이 사용하는 텍스트 생성 인터페이스입니다.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::gemini::GeminiClient;

/// 기본 생성 모델
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

// ============================================================================
// ChatModel Trait
// ============================================================================

/// 텍스트 생성 모델 트레이트
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 프롬프트에 대한 응답 텍스트 생성
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Gemini
// ============================================================================

/// Gemini 생성 모델
#[derive(Debug, Clone)]
pub struct GeminiChat {
    client: GeminiClient,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiChat {
    pub fn new(client: GeminiClient, model: &str) -> Self {
        Self {
            client,
            model: model.strip_prefix("models/").unwrap_or(model).to_string(),
            temperature: 0.0,
            max_output_tokens: 8192,
        }
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let response: GenerateResponse = self
            .client
            .call(&self.model, "generateContent", &request)
            .await?;

        // 첫 후보의 텍스트 파트 연결
        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            tracing::warn!("{} returned an empty response", self.model);
        }

        Ok(text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
