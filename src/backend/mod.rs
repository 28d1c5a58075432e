//! 백엔드 레코드 수집 모듈
//!
//! 쇼핑몰 백엔드(Spring Boot)에서 상품과 리뷰를 가져옵니다.
//! - 상품 조회 실패: 치명적 (인덱스를 만들 수 없음)
//! - 리뷰 조회 실패: 경고 후 빈 목록으로 계속 진행

mod records;

use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use url::Url;

pub use records::{is_truthy, Catalog, ProductRecord, ReviewRecord};

/// 기본 요청 타임아웃
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const PRODUCTS_PATH: &str = "api/products";
const PRODUCTS_WITH_STATS_PATH: &str = "api/products/with-stats";
const REVIEWS_PATH: &str = "api/reviews";

// ============================================================================
// Errors
// ============================================================================

/// 백엔드 조회 에러
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("backend unreachable at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("backend returned {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }

    fn from_transport(url: &Url, err: reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            FetchError::Timeout { url }
        } else {
            FetchError::Unreachable { url, source: err }
        }
    }
}

// ============================================================================
// BackendClient
// ============================================================================

/// 백엔드 HTTP 클라이언트
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: Url,
    client: reqwest::Client,
    products_with_stats: bool,
}

impl BackendClient {
    /// 새 클라이언트 생성
    ///
    /// # Arguments
    /// * `base_url` - 백엔드 베이스 URL (예: `http://localhost:8080`)
    /// * `timeout` - 요청 당 타임아웃
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid backend URL: {}", base_url))?;

        // join()이 마지막 세그먼트를 덮어쓰지 않도록 슬래시 보장
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("cafe-rag/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url,
            client,
            products_with_stats: true,
        })
    }

    /// `/api/products/with-stats` 대신 `/api/products` 사용 여부 설정
    pub fn with_stats(mut self, products_with_stats: bool) -> Self {
        self.products_with_stats = products_with_stats;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// 상품 목록 조회
    pub async fn fetch_products(&self) -> Result<Vec<ProductRecord>, FetchError> {
        let path = if self.products_with_stats {
            PRODUCTS_WITH_STATS_PATH
        } else {
            PRODUCTS_PATH
        };
        self.get_records(path).await
    }

    /// 리뷰 목록 조회
    pub async fn fetch_reviews(&self) -> Result<Vec<ReviewRecord>, FetchError> {
        self.get_records(REVIEWS_PATH).await
    }

    /// 상품 + 리뷰 조회
    ///
    /// 리뷰 조회 실패는 빈 목록으로 대체됩니다.
    pub async fn fetch_catalog(&self) -> Result<Catalog, FetchError> {
        let products = self.fetch_products().await?;
        tracing::info!("Fetched {} products from {}", products.len(), self.base_url);

        let reviews = match self.fetch_reviews().await {
            Ok(reviews) => {
                tracing::info!("Fetched {} reviews", reviews.len());
                reviews
            }
            Err(e) => {
                tracing::warn!("No reviews available, continuing without them: {}", e);
                Vec::new()
            }
        };

        Ok(Catalog { products, reviews })
    }

    /// JSON 배열을 원소 단위로 디코딩
    ///
    /// 레코드로 해석할 수 없는 원소(`null`, 문자열 등)는 경고 후 건너뜁니다.
    async fn get_records<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, FetchError> {
        let items: Vec<Value> = self.get_json(path).await?;
        Ok(decode_records(items, path))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = self
            .base_url
            .join(path)
            .unwrap_or_else(|_| self.base_url.clone());

        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_transport(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Decode {
                    url: url.to_string(),
                    source: e,
                }
            }
        })
    }
}

fn decode_records<T: DeserializeOwned>(items: Vec<Value>, path: &str) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping malformed record #{} from {}: {}", index, path, e);
                None
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_base_url() {
        let result = BackendClient::new("not a url", DEFAULT_TIMEOUT);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_records_skips_malformed() {
        let items = vec![
            serde_json::json!({"comment": "Excellent"}),
            Value::Null,
            serde_json::json!("oops"),
            serde_json::json!({"comment": "Bon"}),
        ];
        let reviews: Vec<ReviewRecord> = decode_records(items, REVIEWS_PATH);
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[1].comment, Some(serde_json::json!("Bon")));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = BackendClient::new("http://localhost:8080/shop", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8080/shop/");

        let joined = client.base_url().join(REVIEWS_PATH).unwrap();
        assert_eq!(joined.as_str(), "http://localhost:8080/shop/api/reviews");
    }
}
