//! 준비 상태 홀더
//!
//! 답변 체인은 초기화가 끝난 뒤 정확히 한 번 설정됩니다.
//! 이후 요청들은 읽기 전용으로 공유합니다.

use std::sync::{Arc, OnceLock};

use crate::retrieval::AnswerChain;

/// 라우터에 주입되는 RAG 상태
#[derive(Clone, Default)]
pub struct RagState {
    chain: Arc<OnceLock<Arc<dyn AnswerChain>>>,
}

impl RagState {
    /// 미초기화 상태
    pub fn uninitialized() -> Self {
        Self::default()
    }

    /// 준비 완료 상태
    pub fn ready(chain: Arc<dyn AnswerChain>) -> Self {
        let state = Self::default();
        state.mark_ready(chain);
        state
    }

    /// 체인 설정 (이미 설정되어 있으면 false)
    pub fn mark_ready(&self, chain: Arc<dyn AnswerChain>) -> bool {
        self.chain.set(chain).is_ok()
    }

    pub fn is_ready(&self) -> bool {
        self.chain.get().is_some()
    }

    pub fn chain(&self) -> Option<Arc<dyn AnswerChain>> {
        self.chain.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::ChainOutput;
    use anyhow::Result;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl AnswerChain for Echo {
        async fn invoke(&self, question: &str) -> Result<ChainOutput> {
            Ok(ChainOutput {
                result: question.to_string(),
                source_documents: None,
            })
        }
    }

    #[test]
    fn test_transitions_once() {
        let state = RagState::uninitialized();
        assert!(!state.is_ready());
        assert!(state.chain().is_none());

        assert!(state.mark_ready(Arc::new(Echo)));
        assert!(state.is_ready());
        assert!(!state.mark_ready(Arc::new(Echo)));
    }

    #[test]
    fn test_clones_share_readiness() {
        let state = RagState::uninitialized();
        let handler_copy = state.clone();
        state.mark_ready(Arc::new(Echo));
        assert!(handler_copy.is_ready());
    }
}
