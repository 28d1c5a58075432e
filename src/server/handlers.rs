//! HTTP 핸들러

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::error::ApiError;
use super::state::RagState;

#[derive(Debug, Deserialize)]
pub struct RagQuery {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RagResponse {
    pub answer: String,
}

pub async fn root(State(state): State<RagState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "RAG Assistant API is running",
        "rag_initialized": state.is_ready(),
    }))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

pub async fn rag_query(
    State(state): State<RagState>,
    payload: Result<Json<RagQuery>, JsonRejection>,
) -> Result<Json<RagResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::InvalidBody(e.body_text()))?;

    let chain = state.chain().ok_or(ApiError::NotInitialized)?;

    if request.question.trim().is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }

    match chain.invoke(&request.question).await {
        Ok(output) => Ok(Json(RagResponse {
            answer: output.result,
        })),
        Err(e) => {
            tracing::error!("RAG query failed: {:#}", e);
            Err(ApiError::from_chain_error(&e))
        }
    }
}
