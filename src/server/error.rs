//! API 에러 - `{"detail": ...}` 본문으로 응답

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("RAG system not initialized. Please check server logs.")]
    NotInitialized,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    InvalidBody(String),
    #[error("Erreur lors du traitement de la requête: {0}")]
    Processing(String),
    #[error("Erreur lors du traitement de la requête: {0}")]
    Timeout(String),
}

impl ApiError {
    /// 체인 에러 분류 (원인 체인에 reqwest 타임아웃이 있으면 Timeout)
    pub fn from_chain_error(err: &anyhow::Error) -> Self {
        let cause = format!("{:#}", err);
        if is_timeout(err) {
            ApiError::Timeout(cause)
        } else {
            ApiError::Processing(cause)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidBody(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

fn is_timeout(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .is_some_and(reqwest::Error::is_timeout)
            || cause
                .downcast_ref::<tokio::time::error::Elapsed>()
                .is_some()
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(json!({ "detail": self.to_string() }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_processing_detail() {
        let err = anyhow::anyhow!("quota exceeded").context("Answer generation failed");
        let api = ApiError::from_chain_error(&err);
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            api.to_string(),
            "Erreur lors du traitement de la requête: Answer generation failed: quota exceeded"
        );
    }

    #[tokio::test]
    async fn test_elapsed_is_timeout() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        let err: anyhow::Result<()> = Err(elapsed).context("LLM call");
        let api = ApiError::from_chain_error(&err.unwrap_err());
        assert_eq!(api.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_not_initialized_status() {
        assert_eq!(ApiError::NotInitialized.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
