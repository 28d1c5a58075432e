//! CLI 모듈
//!
//! cafe-rag CLI 명령어 정의 및 구현

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use crate::config::{Settings, VectorBackend};
use crate::pipeline::{fetch_documents, initialize, open_store, IndexStats};
use crate::server::{self, RagState};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "cafe-rag")]
#[command(version, about = "커피 쇼핑몰 상품/리뷰 RAG 어시스턴트", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 인덱스를 빌드하고 HTTP API 서버 실행
    Serve {
        /// 리스닝 포트 (기본: PORT 환경변수 또는 8081)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// 인덱스를 빌드하고 질문 하나에 답변
    Ask {
        /// 질문
        question: String,

        /// 검색 문서 수 (기본: RETRIEVER_K)
        #[arg(short, long)]
        k: Option<usize>,

        /// 근거 문서 출력 안 함
        #[arg(long)]
        no_sources: bool,
    },

    /// 백엔드에서 문서를 빌드하여 미리보기 (API 키 불필요)
    Preview {
        /// 출력할 문서 수
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// 설정 및 인덱스 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_env().context("설정 로드 실패")?;

    match cli.command {
        Commands::Serve { port } => cmd_serve(settings, port).await,
        Commands::Ask {
            question,
            k,
            no_sources,
        } => cmd_ask(settings, &question, k, no_sources).await,
        Commands::Preview { limit } => cmd_preview(&settings, limit).await,
        Commands::Status => cmd_status(&settings).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 서버 명령어 (serve)
///
/// 초기화를 끝까지 수행한 뒤에만 리스너를 바인딩합니다.
async fn cmd_serve(mut settings: Settings, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        settings.port = port;
    }

    println!("[*] RAG 초기화 중... (백엔드: {})", settings.backend_url);
    let system = initialize(&settings, false).await?;
    print_stats(&system.stats);

    let bind_addr = format!("0.0.0.0:{}", settings.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    println!("[OK] API 서버 시작: http://{}", listener.local_addr()?);
    server::serve(listener, RagState::ready(system.chain)).await
}

/// 질문 명령어 (ask)
async fn cmd_ask(
    mut settings: Settings,
    question: &str,
    k: Option<usize>,
    no_sources: bool,
) -> Result<()> {
    if let Some(k) = k {
        anyhow::ensure!(k > 0, "--k는 1 이상이어야 합니다");
        settings.retriever_k = k;
    }

    println!("[*] RAG 초기화 중...");
    let system = initialize(&settings, !no_sources).await?;
    print_stats(&system.stats);

    println!("[*] 질문: \"{}\"", question);
    let output = system.chain.invoke(question).await.context("답변 생성 실패")?;

    println!("\n[OK] 답변:\n");
    println!("{}", output.result);

    if let Some(sources) = output.source_documents {
        if sources.is_empty() {
            println!("\n[!] 사용된 문서가 없습니다.");
        } else {
            println!("\n근거 문서 ({} 건):\n", sources.len());
            for (i, doc) in sources.iter().enumerate() {
                let kind = doc.kind().map(|k| k.as_str()).unwrap_or("-");
                println!("{}. [{}] {}", i + 1, kind, truncate_text(&doc.text, 200));
            }
        }
    }

    Ok(())
}

/// 미리보기 명령어 (preview)
async fn cmd_preview(settings: &Settings, limit: usize) -> Result<()> {
    println!("[*] 백엔드 조회 중: {}", settings.backend_url);
    let built = fetch_documents(settings).await?;

    println!(
        "[OK] 문서 {} 건 (상품 {} + 리뷰 {})\n",
        built.documents.len(),
        built.product_count,
        built.review_count
    );

    for (i, doc) in built.documents.iter().take(limit).enumerate() {
        let kind = doc.kind().map(|k| k.as_str()).unwrap_or("-");
        println!("--- #{} [{}] ---", i + 1, kind);
        println!("{}", doc.text);
        println!(
            "metadata: {}",
            serde_json::to_string(&doc.metadata).unwrap_or_default()
        );
        println!();
    }

    if built.documents.len() > limit {
        println!("... 외 {} 건", built.documents.len() - limit);
    }

    Ok(())
}

/// 상태 명령어 (status)
///
/// 설정과 저장된 인덱스 상태를 확인합니다.
async fn cmd_status(settings: &Settings) -> Result<()> {
    println!("cafe-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 백엔드: {}", settings.backend_url);
    println!(
        "[*] 모델: {} (임베딩 {}차원), {}",
        settings.embedding_model, settings.embedding_dimension, settings.llm_model
    );
    println!(
        "[*] 검색: top-{} / self-query {}",
        settings.retriever_k,
        if settings.self_query { "on" } else { "off" }
    );

    if settings.api_key.is_some() {
        println!("[OK] API 키 설정됨");
    } else {
        println!("[!] API 키 없음 (GOOGLE_API_KEY) - serve/ask 사용 불가");
    }

    match settings.vector_backend {
        VectorBackend::Memory => {
            println!("[*] 벡터 저장소: memory (프로세스 내, 실행할 때마다 재빌드)");
        }
        VectorBackend::Lance => {
            println!("[*] 벡터 저장소: LanceDB {}", settings.lance_path.display());
        }
        VectorBackend::PgVector => {
            println!(
                "[*] 벡터 저장소: pgvector {}",
                settings.postgres.display_target()
            );
        }
    }

    if settings.vector_backend != VectorBackend::Memory {
        match open_store(settings).await {
            Ok(store) => match store.count().await {
                Ok(count) => println!(
                    "[OK] 컬렉션 '{}': {} 벡터",
                    settings.collection_name, count
                ),
                Err(e) => println!("[!] 벡터 수 조회 실패: {}", e),
            },
            Err(e) => println!("[!] {}", e),
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_stats(stats: &IndexStats) {
    println!(
        "[OK] 상품 {} + 리뷰 {} -> {} 벡터 인덱싱 완료 ({}, {})",
        stats.products,
        stats.reviews,
        stats.indexed,
        stats.backend,
        stats.built_at.format("%Y-%m-%d %H:%M:%S")
    );
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
