//! 인제스천 파이프라인
//!
//! 파일 → 텍스트 추출 → 메타데이터 → 청킹 → 임베딩 → 레코드 로그.
//!
//! 문서와 청크는 순차 처리합니다. 문서 추출 실패와 청크 임베딩 실패는
//! 건너뛰고 집계하며, 백엔드 연결 불가(`ServiceUnavailable`)만 실행 전체를 중단합니다.
//! 로그는 실행이 끝날 때 통째로 교체되므로, 중단되면 기존 지식베이스가 유지됩니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::collector::CollectedFile;
use crate::config::Settings;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, RagResult};
use crate::extractor::TextExtractor;

use super::chunker::{sentence_chunker, Chunker};
use super::metadata::MetadataExtractor;
use super::store::{
    write_summary, ChunkRecord, DocumentRecord, DocumentSummary, IngestionSummary,
    KnowledgeBaseWriter,
};

// ============================================================================
// Types
// ============================================================================

/// 문서 단위 실패
#[derive(Debug, Clone, Serialize)]
pub struct DocumentFailure {
    pub name: String,
    pub reason: String,
}

/// 인제스천 결과 집계
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionReport {
    pub documents_total: usize,
    pub documents_processed: usize,
    pub documents_failed: usize,
    pub chunks_produced: usize,
    pub chunks_embedded: usize,
    pub chunks_failed: usize,
    pub total_words: usize,
    pub failures: Vec<DocumentFailure>,
}

/// 처리 완료된 문서 (기록 전)
#[derive(Debug, Clone)]
pub struct IngestedDocument {
    pub document: DocumentRecord,
    pub chunks: Vec<ChunkRecord>,
    /// 청커가 만든 청크 수 (임베딩 실패 포함)
    pub chunks_produced: usize,
}

// ============================================================================
// Ingestor
// ============================================================================

/// 인제스천 실행기
pub struct Ingestor {
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Box<dyn Chunker>,
    metadata: MetadataExtractor,
    knowledge_base_path: PathBuf,
    summary_path: PathBuf,
}

impl Ingestor {
    pub fn new(
        settings: &Settings,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            extractor,
            embedder,
            chunker: sentence_chunker(settings.chunk.clone()),
            metadata: MetadataExtractor::new(&settings.keyword_vocabulary),
            knowledge_base_path: settings.knowledge_base_path(),
            summary_path: settings.summary_path(),
        }
    }

    /// 파일 목록 전체 인제스천 후 지식베이스/요약 파일 교체
    pub async fn ingest_files(&self, files: &[CollectedFile]) -> RagResult<IngestionReport> {
        let mut report = IngestionReport {
            documents_total: files.len(),
            ..Default::default()
        };
        let mut documents: Vec<IngestedDocument> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for (i, file) in files.iter().enumerate() {
            tracing::info!(
                "[{}/{}] Processing {} ({})",
                i + 1,
                files.len(),
                file.name,
                file.file_type.label()
            );

            match self.ingest_document(&file.path, &file.name).await {
                Ok(doc) => {
                    report.chunks_produced += doc.chunks_produced;
                    report.chunks_embedded += doc.chunks.len();
                    report.chunks_failed += doc.chunks_produced - doc.chunks.len();

                    if doc.chunks.is_empty() {
                        let err = RagError::EmbeddingFailed(format!(
                            "all {} chunks failed to embed",
                            doc.chunks_produced
                        ));
                        tracing::warn!("Skipping {}: {}", file.name, err);
                        report.documents_failed += 1;
                        report.failures.push(DocumentFailure {
                            name: file.name.clone(),
                            reason: err.to_string(),
                        });
                        continue;
                    }

                    // 같은 이름은 나중 문서가 덮어씀
                    match positions.get(&doc.document.name) {
                        Some(&pos) => {
                            tracing::warn!(
                                "Duplicate document name {}, replacing earlier entry",
                                doc.document.name
                            );
                            documents[pos] = doc;
                        }
                        None => {
                            positions.insert(doc.document.name.clone(), documents.len());
                            documents.push(doc);
                        }
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", file.name, e);
                    report.documents_failed += 1;
                    report.failures.push(DocumentFailure {
                        name: file.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.documents_processed = files.len() - report.documents_failed;
        report.total_words = documents.iter().map(|d| d.document.metadata.word_count).sum();

        self.persist(&documents)?;

        tracing::info!(
            "Ingestion complete: {} documents ({} failed), {} chunks embedded ({} failed)",
            report.documents_processed,
            report.documents_failed,
            report.chunks_embedded,
            report.chunks_failed
        );
        Ok(report)
    }

    /// 문서 하나 처리 (기록하지 않음)
    ///
    /// 임베딩에 실패한 청크는 빠지고, 남은 청크의 `chunk_index`는 0부터 다시 매깁니다.
    /// 모든 청크가 실패하면 `chunks`가 빈 채로 반환되며, 기록 여부는 호출자가 정합니다.
    pub async fn ingest_document(&self, path: &Path, name: &str) -> RagResult<IngestedDocument> {
        let text = self.extractor.extract_text(path, name).await?;
        if text.trim().is_empty() {
            return Err(RagError::ExtractionFailed {
                file: name.to_string(),
                reason: "no text content".to_string(),
            });
        }

        let metadata = self.metadata.extract(&text, name);
        let candidates = self.chunker.chunk(&text, name);
        if candidates.is_empty() {
            return Err(RagError::ExtractionFailed {
                file: name.to_string(),
                reason: "text produced no chunks".to_string(),
            });
        }

        let chunks_produced = candidates.len();
        let mut chunks = Vec::with_capacity(chunks_produced);

        for candidate in candidates {
            match self.embedder.embed(&candidate.text).await {
                Ok(embedding) => chunks.push(ChunkRecord {
                    id: candidate.id,
                    text: candidate.text,
                    document_name: name.to_string(),
                    chunk_index: chunks.len(),
                    word_count: candidate.word_count,
                    embedding,
                    processed_at: Utc::now(),
                }),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let err = RagError::EmbeddingFailed(e.to_string());
                    tracing::warn!(
                        "{} chunk {}/{}: {}",
                        name,
                        candidate.chunk_index + 1,
                        chunks_produced,
                        err
                    );
                }
            }
        }

        tracing::debug!(
            "{}: {} words, {} of {} chunks embedded, type {}",
            name,
            metadata.word_count,
            chunks.len(),
            chunks_produced,
            metadata.document_type.as_str()
        );

        Ok(IngestedDocument {
            document: DocumentRecord {
                name: name.to_string(),
                path: path.display().to_string(),
                processed_at: Utc::now(),
                total_chunks: chunks.len(),
                metadata,
            },
            chunks,
            chunks_produced,
        })
    }

    /// 레코드 로그와 요약 파일 작성
    fn persist(&self, documents: &[IngestedDocument]) -> RagResult<()> {
        let mut writer = KnowledgeBaseWriter::create(&self.knowledge_base_path)?;
        for doc in documents {
            writer.write_document(&doc.document)?;
            for chunk in &doc.chunks {
                writer.write_chunk(chunk)?;
            }
        }
        let (document_count, chunk_count) = writer.finish()?;

        let summary = IngestionSummary {
            total_documents: document_count,
            total_chunks: chunk_count,
            total_words: documents.iter().map(|d| d.document.metadata.word_count).sum(),
            completed_at: Some(Utc::now()),
            documents: documents
                .iter()
                .map(|d| DocumentSummary {
                    name: d.document.name.clone(),
                    chunks: d.document.total_chunks,
                    words: d.document.metadata.word_count,
                    document_type: d.document.metadata.document_type,
                })
                .collect(),
        };
        write_summary(&self.summary_path, &summary)?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
