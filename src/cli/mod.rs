//! CLI 모듈
//!
//! netdoc-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use crate::collector::{CollectionStats, CollectorConfig, FileCollector};
use crate::config::Settings;
use crate::context::RagContext;
use crate::query::{QueryOptions, QueryResponse, DEFAULT_SESSION};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "netdoc-rag")]
#[command(version, about = "사내 IT 문서용 로컬 RAG 시스템", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 파일 또는 폴더를 인제스천 (지식베이스를 새로 만듦)
    Ingest {
        /// 문서 파일 또는 폴더 경로
        path: PathBuf,

        /// PDF 파일 건너뛰기
        #[arg(long)]
        skip_pdfs: bool,

        /// 숨김 파일 포함
        #[arg(long)]
        hidden: bool,

        /// .gitignore / .ignore 무시
        #[arg(long)]
        no_ignore: bool,

        /// 최대 파일 크기 (MB, 0이면 제한 없음)
        #[arg(long, default_value = "10")]
        max_size_mb: u64,
    },

    /// 문서를 근거로 질문에 답변
    Ask {
        /// 질문
        question: String,

        /// 답변을 생성되는 대로 출력
        #[arg(long)]
        stream: bool,

        /// IT 질의 모드 (약어 확장, 넓은 검색)
        #[arg(long)]
        it: bool,

        /// 문서 검색 없이 답변
        #[arg(long)]
        no_context: bool,

        /// 세션 ID
        #[arg(short, long, default_value = DEFAULT_SESSION)]
        session: String,
    },

    /// 벡터 검색
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// 최소 유사도
        #[arg(short, long, default_value = "0.1")]
        threshold: f32,
    },

    /// 텍스트 검색 (대소문자 무시 부분 일치)
    Grep {
        /// 찾을 문자열
        text: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// 지식베이스 통계
    Stats,

    /// 상태 확인 (Ollama 연결, 모델 설치 여부)
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_env();
    let ctx = RagContext::from_settings(settings).context("컨텍스트 초기화 실패")?;

    match cli.command {
        Commands::Ingest {
            path,
            skip_pdfs,
            hidden,
            no_ignore,
            max_size_mb,
        } => {
            let config = CollectorConfig {
                respect_ignore_files: !no_ignore,
                include_hidden: hidden,
                max_file_size: max_size_mb * 1024 * 1024,
                skip_pdfs,
            };
            cmd_ingest(&ctx, path, config).await
        }
        Commands::Ask {
            question,
            stream,
            it,
            no_context,
            session,
        } => {
            let mut options = QueryOptions::for_session(session);
            if it {
                options = options.it();
            }
            if no_context {
                options = options.without_context();
            }
            cmd_ask(&ctx, &question, &options, stream).await
        }
        Commands::Search {
            query,
            limit,
            threshold,
        } => cmd_search(&ctx, &query, limit, threshold).await,
        Commands::Grep { text, limit } => cmd_grep(&ctx, &text, limit).await,
        Commands::Stats => cmd_stats(&ctx).await,
        Commands::Status => cmd_status(&ctx).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 인제스천 명령어 (ingest)
///
/// 파일/폴더의 문서를 청크로 나누고 임베딩하여 지식베이스를 다시 만듭니다.
async fn cmd_ingest(ctx: &RagContext, path: PathBuf, config: CollectorConfig) -> Result<()> {
    let health = ctx.generator.health().await;
    if !health.available {
        bail!(
            "Ollama 서버에 연결할 수 없습니다 ({}).\n\n\
             실행 방법:\n  \
             ollama serve\n  \
             ollama pull {}",
            ctx.settings.ollama_url,
            ctx.settings.embed_model
        );
    }

    let collector = FileCollector::new(config);
    let files = collector
        .collect(&path)
        .with_context(|| format!("파일 수집 실패: {}", path.display()))?;

    if files.is_empty() {
        println!("[!] 수집할 파일이 없습니다.");
        return Ok(());
    }

    let stats = CollectionStats::from_files(&files);
    println!("[*] 수집 대상: {} 파일", stats.total_files);
    println!(
        "    텍스트: {}, PDF: {}, DOCX: {}",
        stats.text_files, stats.pdf_files, stats.docx_files
    );
    println!("    총 크기: {}", format_bytes(stats.total_size as usize));
    println!();

    let report = ctx
        .ingestor()
        .ingest_files(&files)
        .await
        .context("인제스천 실패")?;

    for failure in &report.failures {
        println!("[!] {}: {}", failure.name, failure.reason);
    }

    println!();
    println!(
        "[OK] 완료: 문서 성공 {}, 실패 {}",
        report.documents_processed, report.documents_failed
    );
    println!(
        "     청크: {} 생성, {} 임베딩, {} 실패",
        report.chunks_produced, report.chunks_embedded, report.chunks_failed
    );
    println!("     총 단어: {}", report.total_words);
    println!(
        "     저장 위치: {}",
        ctx.settings.knowledge_base_path().display()
    );

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(
    ctx: &RagContext,
    question: &str,
    options: &QueryOptions,
    stream: bool,
) -> Result<()> {
    let orchestrator = ctx.orchestrator();

    let response = if stream {
        let (tx, mut rx) = mpsc::channel::<String>(64);

        let printer = tokio::spawn(async move {
            let mut stdout = std::io::stdout();
            while let Some(fragment) = rx.recv().await {
                print!("{}", fragment);
                let _ = stdout.flush();
            }
            println!();
        });

        let result = orchestrator.query_stream(question, options, tx).await;
        let _ = printer.await;
        result.context("답변 생성 실패")?
    } else {
        let response = orchestrator
            .query(question, options)
            .await
            .context("답변 생성 실패")?;
        println!("{}", response.answer);
        response
    };

    print_sources(&response);
    Ok(())
}

fn print_sources(response: &QueryResponse) {
    if response.needs_ingestion {
        println!();
        println!("[!] 지식베이스가 없습니다. 먼저 `netdoc-rag ingest <경로>`를 실행하세요.");
        return;
    }

    if response.sources.is_empty() {
        return;
    }

    println!();
    println!("[*] 출처:");
    for (i, source) in response.sources.iter().enumerate() {
        println!(
            "  {}. {} #{} [유사도: {:.4}]",
            i + 1,
            source.document,
            source.chunk_index,
            source.similarity
        );
        println!("     {}", truncate_text(&source.preview, 120));
    }
}

/// 벡터 검색 명령어 (search)
async fn cmd_search(ctx: &RagContext, query: &str, limit: usize, threshold: f32) -> Result<()> {
    if !ctx.store.load().await {
        println!("[!] 지식베이스가 없습니다. 먼저 ingest를 실행하세요.");
        return Ok(());
    }

    println!("[*] 검색 중: \"{}\"", query);

    let query_embedding = ctx
        .embedder
        .embed(query)
        .await
        .context("질의 임베딩 실패")?;
    let results = ctx.retriever().search(&query_embedding, limit, threshold);

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [유사도: {:.4}] {} #{}",
            i + 1,
            result.similarity,
            result.document_name,
            result.chunk_index
        );
        println!("   내용: {}", truncate_text(&result.text, 200));
        println!();
    }

    Ok(())
}

/// 텍스트 검색 명령어 (grep)
async fn cmd_grep(ctx: &RagContext, text: &str, limit: usize) -> Result<()> {
    if !ctx.store.load().await {
        println!("[!] 지식베이스가 없습니다. 먼저 ingest를 실행하세요.");
        return Ok(());
    }

    let results = ctx.retriever().search_documents(text, limit);

    if results.is_empty() {
        println!("[!] \"{}\"를 포함한 청크가 없습니다.", text);
        return Ok(());
    }

    println!("[OK] 일치 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        println!("{}. {} #{}", i + 1, result.document_name, result.chunk_index);
        println!("   {}", truncate_text(&result.preview, 200));
        println!();
    }

    Ok(())
}

/// 통계 명령어 (stats)
async fn cmd_stats(ctx: &RagContext) -> Result<()> {
    ctx.store.load().await;
    let stats = ctx.store.stats().await;

    if !stats.loaded {
        println!("[!] 지식베이스가 없습니다: {}", stats.knowledge_base_path.display());
        return Ok(());
    }

    println!("[OK] 문서: {} 건, 청크: {} 개", stats.document_count, stats.chunk_count);
    println!("     총 단어: {}", stats.total_words);
    if let Some(completed_at) = stats.last_ingestion {
        println!(
            "     마지막 인제스천: {}",
            completed_at.format("%Y-%m-%d %H:%M")
        );
    }

    if !stats.documents.is_empty() {
        println!();
        for doc in &stats.documents {
            println!(
                "  {:<40} [{}] {} 청크, {} 단어",
                truncate_text(&doc.name, 40),
                doc.document_type.as_str(),
                doc.chunks,
                doc.words
            );
        }
    }

    Ok(())
}

/// 상태 명령어 (status)
///
/// Ollama 연결, 모델 설치 여부, 지식베이스 위치를 확인합니다.
async fn cmd_status(ctx: &RagContext) -> Result<()> {
    println!("netdoc-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", ctx.settings.data_dir.display());

    let health = ctx.generator.health().await;
    if health.available {
        println!("[OK] Ollama: {}", ctx.settings.ollama_url);
    } else {
        println!("[!] Ollama: 연결 불가 ({})", ctx.settings.ollama_url);
        println!("    실행: ollama serve");
    }

    if health.available {
        if health.is_ready() {
            println!(
                "[OK] 모델: {}, {} ({}차원)",
                ctx.generator.name(),
                ctx.embedder.name(),
                ctx.embedder.dimension()
            );
        } else {
            for model in &health.missing_models {
                println!("[!] 모델 없음: {}", model);
                println!("    설치: ollama pull {}", model);
            }
        }
    }

    if ctx.store.load().await {
        let stats = ctx.store.stats().await;
        println!(
            "[OK] 지식베이스: 문서 {} 건, 청크 {} 개",
            stats.document_count, stats.chunk_count
        );
    } else {
        println!("[!] 지식베이스: 없음 (ingest 필요)");
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

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

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_parse_ask_flags() {
        let cli = Cli::try_parse_from([
            "netdoc-rag", "ask", "why is DNS slow?", "--stream", "--it", "-s", "ops",
        ])
        .unwrap();

        match cli.command {
            Commands::Ask {
                question,
                stream,
                it,
                no_context,
                session,
            } => {
                assert_eq!(question, "why is DNS slow?");
                assert!(stream && it && !no_context);
                assert_eq!(session, "ops");
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_parse_search_defaults() {
        let cli = Cli::try_parse_from(["netdoc-rag", "search", "vpn"]).unwrap();
        match cli.command {
            Commands::Search { limit, threshold, .. } => {
                assert_eq!(limit, 5);
                assert!((threshold - 0.1).abs() < f32::EPSILON);
            }
            _ => panic!("expected search"),
        }
    }
}
