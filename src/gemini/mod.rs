//! Gemini REST 클라이언트 - 임베딩과 생성 호출이 공유하는 전송 계층
//!
//! - API 키는 URL이 아닌 `x-goog-api-key` 헤더로 전송
//! - 클라이언트 측 Rate Limiter (기본 60 RPM)
//! - 429 / 5xx / 전송 에러 시 지수 백오프 재시도
//!
//! source: https://ai.google.dev/api/rest

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// 기본 API 베이스 URL
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// API 버전 경로
const API_VERSION: &str = "v1beta";

/// 기본 요청 타임아웃
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
pub const DEFAULT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

// ============================================================================
// Rate Limiter
// ============================================================================

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    /// 분당 요청 수에서 생성 (최소 딜레이 = 윈도우 / RPM)
    fn per_minute(rpm: u32) -> Self {
        let rpm = rpm.max(1);
        Self {
            requests: Vec::new(),
            max_requests: rpm,
            window: RATE_LIMIT_WINDOW,
            min_delay: RATE_LIMIT_WINDOW / rpm,
            last_request: None,
        }
    }

    /// 요청 가능 여부 확인 및 대기
    async fn acquire(&mut self) {
        // 1. 최소 딜레이 적용 (버스트 방지)
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();

        // 2. 윈도우 밖의 오래된 요청 제거
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        // 3. Rate limit 초과 시 대기
        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        // 4. 현재 요청 기록
        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

// ============================================================================
// GeminiClient
// ============================================================================

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

/// Gemini REST 클라이언트
///
/// 복제본은 Rate Limiter를 공유합니다.
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    max_retries: u32,
    initial_backoff: Duration,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// 새 클라이언트 생성 (기본 URL, 60초 타임아웃, 60 RPM)
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http: build_http(DEFAULT_TIMEOUT)?,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::per_minute(DEFAULT_RPM))),
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// 베이스 URL 변경 (프록시, 테스트 서버)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// 요청 타임아웃 변경
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = build_http(timeout)?;
        Ok(self)
    }

    /// 분당 요청 한도 변경
    pub fn with_rate_limit(mut self, rpm: u32) -> Self {
        self.rate_limiter = Arc::new(Mutex::new(RateLimiter::per_minute(rpm)));
        self
    }

    /// 재시도 정책 변경
    pub fn with_retry(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/v1beta/models/{model}:{method}`
    pub fn endpoint(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/{}/models/{}:{}", self.base_url, API_VERSION, model, method)
    }

    /// 모델 메서드 호출 (재시도 포함)
    pub async fn call<Req, Resp>(&self, model: &str, method: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint(model, method);
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..=self.max_retries {
            // Rate limiting (매 시도마다)
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            let response = match self
                .http
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    let err = anyhow::Error::new(e)
                        .context(format!("Failed to send {} request", method));
                    if attempt < self.max_retries {
                        let backoff = self.backoff(attempt);
                        tracing::warn!(
                            "Request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            self.max_retries
                        );
                        last_error = Some(err);
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            // 성공
            if status.is_success() {
                return serde_json::from_str(&body)
                    .with_context(|| format!("Failed to parse {} response", method));
            }

            // 429 / 5xx - 재시도
            if status.as_u16() == 429 || status.is_server_error() {
                let backoff = self.backoff(attempt);
                tracing::warn!(
                    "Gemini returned {}, backing off {:?} (attempt {}/{})",
                    status,
                    backoff,
                    attempt + 1,
                    self.max_retries
                );
                last_error = Some(anyhow::anyhow!("Gemini API error ({})", status));

                if attempt < self.max_retries {
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                // 다른 에러 - 즉시 실패
                if let Ok(error) = serde_json::from_str::<GeminiError>(&body) {
                    anyhow::bail!(
                        "Gemini API error ({}): {}",
                        error.error.status,
                        error.error.message
                    );
                }
                anyhow::bail!("Gemini API error ({}): {}", status, body);
            }
        }

        // 모든 재시도 실패
        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("{} failed after {} retries", method, self.max_retries)
        }))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(attempt)
    }
}

fn build_http(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

// ============================================================================
// Tests
// ============================================================================
