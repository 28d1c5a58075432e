//! HTTP API 서버 (axum)
//!
//! - `GET /`: 상태 + 초기화 여부
//! - `GET /health`: 헬스 체크
//! - `POST /rag-query`: 질문 -> 답변

mod error;
mod handlers;
mod state;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use handlers::{RagQuery, RagResponse};
pub use state::RagState;

/// 라우터 생성 (CORS 전체 허용 + HTTP 트레이싱)
pub fn router(state: RagState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/rag-query", post(handlers::rag_query))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 리스너에서 서버 실행 (Ctrl-C로 정상 종료)
pub async fn serve(listener: TcpListener, state: RagState) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
