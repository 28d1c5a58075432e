//! 답변 체인 - 검색된 문서를 하나의 프롬프트로 묶어 LLM에 전달 ("stuff")

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use super::retriever::Retriever;
use crate::documents::Document;
use crate::llm::ChatModel;

/// LLM이 빈 응답을 주었을 때의 답변
pub const FALLBACK_ANSWER: &str = "Désolé, je n'ai pas pu générer de réponse.";

/// 체인 실행 결과
#[derive(Debug, Clone, Serialize)]
pub struct ChainOutput {
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_documents: Option<Vec<Document>>,
}

/// 질문 -> 답변 체인
#[async_trait]
pub trait AnswerChain: Send + Sync {
    async fn invoke(&self, question: &str) -> Result<ChainOutput>;
}

/// 검색 + 생성 QA 체인
pub struct RetrievalQa {
    llm: Arc<dyn ChatModel>,
    retriever: Arc<dyn Retriever>,
    return_source_documents: bool,
}

impl RetrievalQa {
    pub fn new(llm: Arc<dyn ChatModel>, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            llm,
            retriever,
            return_source_documents: false,
        }
    }

    pub fn with_source_documents(mut self, enabled: bool) -> Self {
        self.return_source_documents = enabled;
        self
    }
}

/// stuff 프롬프트 (문서는 빈 줄로 구분)
pub fn stuff_prompt(documents: &[Document], question: &str) -> String {
    let context = documents
        .iter()
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Use the following pieces of context to answer the question at the end. \
         If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n\
         {context}\n\n\
         Question: {question}\n\
         Helpful Answer:"
    )
}

#[async_trait]
impl AnswerChain for RetrievalQa {
    async fn invoke(&self, question: &str) -> Result<ChainOutput> {
        let documents = self
            .retriever
            .retrieve(question)
            .await
            .context("Document retrieval failed")?;

        let prompt = stuff_prompt(&documents, question);
        let answer = self
            .llm
            .generate(&prompt)
            .await
            .context("Answer generation failed")?;

        let result = if answer.trim().is_empty() {
            FALLBACK_ANSWER.to_string()
        } else {
            answer.trim().to_string()
        };

        Ok(ChainOutput {
            result,
            source_documents: self.return_source_documents.then_some(documents),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::Metadata;
    use std::sync::Mutex;

    struct FixedRetriever(Vec<&'static str>);

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, _question: &str) -> Result<Vec<Document>> {
            Ok(self
                .0
                .iter()
                .map(|t| Document {
                    text: t.to_string(),
                    metadata: Metadata::new(),
                })
                .collect())
        }
    }

    /// 받은 프롬프트를 기록하는 LLM
    struct RecordingLlm {
        answer: &'static str,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for RecordingLlm {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.answer.to_string())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn llm(answer: &'static str) -> Arc<RecordingLlm> {
        Arc::new(RecordingLlm {
            answer,
            prompts: Mutex::new(vec![]),
        })
    }

    #[test]
    fn test_stuff_prompt_layout() {
        let docs = vec![
            Document {
                text: "Produit : A".to_string(),
                metadata: Metadata::new(),
            },
            Document {
                text: "Produit : B".to_string(),
                metadata: Metadata::new(),
            },
        ];
        let prompt = stuff_prompt(&docs, "Lequel ?");
        assert!(prompt.contains("Produit : A\n\nProduit : B"));
        assert!(prompt.ends_with("Question: Lequel ?\nHelpful Answer:"));
    }

    #[tokio::test]
    async fn test_invoke_uses_retrieved_context() {
        let model = llm("Le café A.");
        let chain = RetrievalQa::new(model.clone(), Arc::new(FixedRetriever(vec!["Produit : A"])));

        let out = chain.invoke("Quel café ?").await.unwrap();
        assert_eq!(out.result, "Le café A.");
        assert!(out.source_documents.is_none());

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Produit : A"));
        assert!(prompts[0].contains("Quel café ?"));
    }

    #[tokio::test]
    async fn test_invoke_returns_sources_when_enabled() {
        let chain = RetrievalQa::new(llm("ok"), Arc::new(FixedRetriever(vec!["a", "b"])))
            .with_source_documents(true);
        let out = chain.invoke("q").await.unwrap();
        assert_eq!(out.source_documents.map(|d| d.len()), Some(2));
    }

    #[tokio::test]
    async fn test_empty_answer_falls_back() {
        let chain = RetrievalQa::new(llm("  "), Arc::new(FixedRetriever(vec![])));
        let out = chain.invoke("q").await.unwrap();
        assert_eq!(out.result, FALLBACK_ANSWER);
    }
}
