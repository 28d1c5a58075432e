//! cafe-rag - 커피 쇼핑몰 상품/리뷰 RAG 어시스턴트
//!
//! 백엔드에서 상품과 리뷰를 가져와 문서로 변환하고,
//! Gemini 임베딩으로 벡터 인덱스(LanceDB / pgvector / 메모리)를 만든 뒤
//! self-query 검색 + LLM 답변 체인을 HTTP API로 제공합니다.

pub mod backend;
pub mod cli;
pub mod config;
pub mod documents;
pub mod embedding;
pub mod gemini;
pub mod knowledge;
pub mod llm;
pub mod pipeline;
pub mod retrieval;
pub mod server;

// Re-exports
pub use backend::{BackendClient, Catalog, FetchError, ProductRecord, ReviewRecord};
pub use config::{Settings, VectorBackend};
pub use documents::{build_documents, BuiltDocuments, Document, Metadata, MetadataValue};
pub use embedding::{EmbeddingProvider, GeminiEmbedding};
pub use gemini::GeminiClient;
pub use knowledge::{
    Filter, LanceVectorStore, MemoryVectorStore, PgVectorStore, SearchResult, VectorEntry,
    VectorStore,
};
pub use llm::{ChatModel, GeminiChat};
pub use pipeline::{initialize, InitError, RagSystem};
pub use retrieval::{AnswerChain, ChainOutput, QueryPlanner, RetrievalQa, Retriever};
pub use server::{router, RagState};
