//! Knowledge 모듈 - 벡터 인덱스
//!
//! - Filter: self-query 구조화 필터 (3값 논리)
//! - Memory: 프로세스 내 코사인 전수 검색
//! - LanceDB: 로컬 영속 벡터 검색 (ANN)
//! - pgvector: PostgreSQL 기반 벡터 검색

mod filter;
mod lance;
mod memory;
mod pgvector;
mod vector;

// Re-exports
pub use filter::{Comparator, Comparison, Filter, Operation, Operator};
pub use lance::LanceVectorStore;
pub use memory::MemoryVectorStore;
pub use pgvector::{sanitize_table_name, vector_literal, PgVectorStore};
pub use vector::{cosine_similarity, index_documents, SearchResult, VectorEntry, VectorStore};
