//! Retrieval 모듈 - 질의 계획, 문서 검색, 답변 생성
//!
//! 질문 -> (self-query 플래너) -> 벡터 검색 -> stuff 프롬프트 -> LLM -> 답변

mod chain;
mod retriever;
mod self_query;

pub use chain::{stuff_prompt, AnswerChain, ChainOutput, RetrievalQa, FALLBACK_ANSWER};
pub use retriever::{Retriever, SelfQueryRetriever, VectorRetriever, DEFAULT_K};
pub use self_query::{
    catalog_attributes, AttributeInfo, AttributeType, QueryPlanner, StructuredQuery,
    CONTENT_DESCRIPTION,
};
