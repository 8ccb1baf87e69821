//! Knowledge Store - JSONL 레코드 로그 기반 지식 저장소
//!
//! 인제스천이 만든 레코드 로그(`knowledge_base.jsonl`)를 한 번만 읽어
//! 메모리에 올리고, 이후에는 읽기 전용으로 공유합니다.
//!
//! - 로그 한 줄 = JSON 레코드 하나 (`"type": "document" | "chunk"`)
//! - 파싱 실패한 줄은 경고 후 건너뜀
//! - 로그가 없으면 "아직 지식베이스 없음" 상태 (에러 아님)
//! - 재인제스천 후에는 `reload()`로 명시적으로 다시 읽어야 함

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::error::{RagError, RagResult};

use super::metadata::{DocumentType, Metadata};

// ============================================================================
// Records
// ============================================================================

/// 청크 레코드 (임베딩 포함)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub document_name: String,
    pub chunk_index: usize,
    pub word_count: usize,
    pub embedding: Vec<f32>,
    pub processed_at: DateTime<Utc>,
}

/// 문서 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    /// 실행 내 고유 (같은 이름이면 나중 것이 덮어씀)
    pub name: String,
    pub path: String,
    pub processed_at: DateTime<Utc>,
    pub total_chunks: usize,
    pub metadata: Metadata,
}

/// 레코드 로그의 한 줄
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KnowledgeRecord {
    Document(DocumentRecord),
    Chunk(ChunkRecord),
}

/// 문서별 인제스천 요약
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub name: String,
    pub chunks: usize,
    pub words: usize,
    pub document_type: DocumentType,
}

/// 인제스천 요약 파일 (실행마다 통째로 재생성)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestionSummary {
    pub total_documents: usize,
    pub total_chunks: usize,
    pub total_words: usize,
    pub completed_at: Option<DateTime<Utc>>,
    pub documents: Vec<DocumentSummary>,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub loaded: bool,
    pub document_count: usize,
    pub chunk_count: usize,
    pub total_words: usize,
    pub last_ingestion: Option<DateTime<Utc>>,
    pub documents: Vec<DocumentSummary>,
    pub knowledge_base_path: PathBuf,
}

// ============================================================================
// KnowledgeBase (in-memory snapshot)
// ============================================================================

/// 메모리에 올라간 지식베이스 (읽기 전용)
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    documents: Vec<DocumentRecord>,
    chunks: Vec<ChunkRecord>,
}

impl KnowledgeBase {
    /// 레코드 목록에서 생성
    ///
    /// 문서 이름이 중복되면 나중 레코드가 이기고, 앞서 읽은 그 문서의 청크도 버립니다.
    pub fn from_records(records: impl IntoIterator<Item = KnowledgeRecord>) -> Self {
        let mut documents: Vec<DocumentRecord> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut chunks: Vec<ChunkRecord> = Vec::new();

        for record in records {
            match record {
                KnowledgeRecord::Document(doc) => match positions.get(&doc.name) {
                    Some(&pos) => {
                        tracing::warn!("Duplicate document record {}, keeping the later one", doc.name);
                        chunks.retain(|c| c.document_name != doc.name);
                        documents[pos] = doc;
                    }
                    None => {
                        positions.insert(doc.name.clone(), documents.len());
                        documents.push(doc);
                    }
                },
                KnowledgeRecord::Chunk(chunk) => chunks.push(chunk),
            }
        }

        Self { documents, chunks }
    }

    pub fn documents(&self) -> &[DocumentRecord] {
        &self.documents
    }

    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.chunks
    }

    pub fn document(&self, name: &str) -> Option<&DocumentRecord> {
        self.documents.iter().find(|d| d.name == name)
    }

    /// 문서의 청크 (chunk_index 순)
    pub fn chunks_for(&self, name: &str) -> Vec<&ChunkRecord> {
        let mut chunks: Vec<&ChunkRecord> = self
            .chunks
            .iter()
            .filter(|c| c.document_name == name)
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        chunks
    }

    /// 임베딩 차원 (첫 청크 기준)
    pub fn dimension(&self) -> Option<usize> {
        self.chunks.first().map(|c| c.embedding.len())
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

// ============================================================================
// KnowledgeStore
// ============================================================================

/// 로드 상태
#[derive(Debug, Clone)]
enum LoadState {
    Unloaded,
    Loading,
    Loaded(Arc<KnowledgeBase>),
    Failed(String),
}

/// 외부에 노출하는 로드 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

/// Knowledge Store - 지연 로드되는 읽기 전용 지식 저장소
///
/// `load()`는 한 번에 하나만 실행되며, 동시에 호출한 나머지는
/// 진행 중인 로드가 끝나기를 기다렸다가 그 결과를 공유합니다.
pub struct KnowledgeStore {
    knowledge_base_path: PathBuf,
    summary_path: PathBuf,
    state: RwLock<LoadState>,
    load_lock: Mutex<()>,
}

impl KnowledgeStore {
    /// 로그/요약 파일 경로로 생성 (아직 읽지 않음)
    pub fn new(knowledge_base_path: impl Into<PathBuf>, summary_path: impl Into<PathBuf>) -> Self {
        Self {
            knowledge_base_path: knowledge_base_path.into(),
            summary_path: summary_path.into(),
            state: RwLock::new(LoadState::Unloaded),
            load_lock: Mutex::new(()),
        }
    }

    /// 설정의 데이터 디렉토리 기준으로 생성
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.knowledge_base_path(), settings.summary_path())
    }

    pub fn knowledge_base_path(&self) -> &Path {
        &self.knowledge_base_path
    }

    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }

    /// 현재 로드 상태
    pub fn status(&self) -> LoadStatus {
        match &*self.read_state() {
            LoadState::Unloaded => LoadStatus::Unloaded,
            LoadState::Loading => LoadStatus::Loading,
            LoadState::Loaded(_) => LoadStatus::Loaded,
            LoadState::Failed(_) => LoadStatus::Failed,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.status() == LoadStatus::Loaded
    }

    /// 로드된 지식베이스 (로드 전이면 None)
    pub fn snapshot(&self) -> Option<Arc<KnowledgeBase>> {
        match &*self.read_state() {
            LoadState::Loaded(kb) => Some(Arc::clone(kb)),
            _ => None,
        }
    }

    /// 지식베이스 로드 (한 번만)
    ///
    /// 이미 로드되었으면 즉시 `true`. 로그 파일이 없거나 읽기에 실패하면
    /// `false`를 반환하며, 다음 호출에서 다시 시도합니다.
    pub async fn load(&self) -> bool {
        if self.is_loaded() {
            return true;
        }

        let _guard = self.load_lock.lock().await;

        // 기다리는 동안 다른 호출자가 로드를 끝냈을 수 있음
        if self.is_loaded() {
            return true;
        }

        self.set_state(LoadState::Loading);

        match self.read_log().await {
            Ok(Some(kb)) => {
                tracing::info!(
                    "Loaded knowledge base: {} documents, {} chunks",
                    kb.documents().len(),
                    kb.chunks().len()
                );
                self.set_state(LoadState::Loaded(Arc::new(kb)));
                true
            }
            Ok(None) => {
                tracing::info!(
                    "No knowledge base at {:?} - run ingestion first",
                    self.knowledge_base_path
                );
                self.set_state(LoadState::Unloaded);
                false
            }
            Err(e) => {
                tracing::error!("Failed to load knowledge base: {}", e);
                self.set_state(LoadState::Failed(e.to_string()));
                false
            }
        }
    }

    /// 메모리 사본을 버리고 다시 로드 (재인제스천 후 사용)
    pub async fn reload(&self) -> bool {
        {
            let _guard = self.load_lock.lock().await;
            self.set_state(LoadState::Unloaded);
        }
        self.load().await
    }

    /// 통계 (요약 파일이 없으면 0 값으로)
    pub async fn stats(&self) -> StoreStats {
        let snapshot = self.snapshot();
        let summary = self.read_summary().await;

        StoreStats {
            loaded: snapshot.is_some(),
            document_count: snapshot.as_ref().map_or(0, |kb| kb.documents().len()),
            chunk_count: snapshot.as_ref().map_or(0, |kb| kb.chunks().len()),
            total_words: summary.total_words,
            last_ingestion: summary.completed_at,
            documents: summary.documents,
            knowledge_base_path: self.knowledge_base_path.clone(),
        }
    }

    /// 로그 파일 읽기 (없으면 None)
    async fn read_log(&self) -> RagResult<Option<KnowledgeBase>> {
        let content = match tokio::fs::read_to_string(&self.knowledge_base_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let kb = KnowledgeBase::from_records(parse_records(&content));

        if let Some(dim) = kb.dimension() {
            let mismatched = kb.chunks().iter().filter(|c| c.embedding.len() != dim).count();
            if mismatched > 0 {
                tracing::warn!(
                    "{} chunks have embedding dimension different from {}",
                    mismatched,
                    dim
                );
            }
        }

        Ok(Some(kb))
    }

    async fn read_summary(&self) -> IngestionSummary {
        let bytes = match tokio::fs::read(&self.summary_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to read ingestion summary: {}", e);
                }
                return IngestionSummary::default();
            }
        };

        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed ingestion summary: {}", e);
            IngestionSummary::default()
        })
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, LoadState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: LoadState) {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        *guard = state;
    }
}

/// 로그 내용을 레코드로 파싱 (잘못된 줄은 건너뜀)
fn parse_records(content: &str) -> Vec<KnowledgeRecord> {
    let mut records = Vec::new();

    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<KnowledgeRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                let err = RagError::MalformedRecord {
                    line: i + 1,
                    reason: e.to_string(),
                };
                tracing::warn!("Skipping record: {}", err);
            }
        }
    }

    records
}

// ============================================================================
// KnowledgeBaseWriter
// ============================================================================

/// 레코드 로그 작성기
///
/// 임시 파일에 쓴 뒤 `finish()`에서 원래 경로로 교체하므로,
/// 기존 지식베이스는 인제스천이 끝날 때까지 그대로 남습니다.
pub struct KnowledgeBaseWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    writer: BufWriter<File>,
    documents: usize,
    chunks: usize,
    finished: bool,
}

impl KnowledgeBaseWriter {
    /// 새 로그 작성 시작
    pub fn create(path: &Path) -> RagResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = path.with_extension("jsonl.tmp");
        let file = File::create(&tmp_path)?;

        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            writer: BufWriter::new(file),
            documents: 0,
            chunks: 0,
            finished: false,
        })
    }

    pub fn write_document(&mut self, doc: &DocumentRecord) -> RagResult<()> {
        self.write_record(&KnowledgeRecord::Document(doc.clone()))?;
        self.documents += 1;
        Ok(())
    }

    pub fn write_chunk(&mut self, chunk: &ChunkRecord) -> RagResult<()> {
        self.write_record(&KnowledgeRecord::Chunk(chunk.clone()))?;
        self.chunks += 1;
        Ok(())
    }

    fn write_record(&mut self, record: &KnowledgeRecord) -> RagResult<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// 기록 완료 후 로그 교체. (문서 수, 청크 수) 반환
    pub fn finish(mut self) -> RagResult<(usize, usize)> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        std::fs::rename(&self.tmp_path, &self.path)?;
        self.finished = true;

        tracing::debug!(
            "Wrote {} documents and {} chunks to {:?}",
            self.documents,
            self.chunks,
            self.path
        );
        Ok((self.documents, self.chunks))
    }
}

impl Drop for KnowledgeBaseWriter {
    /// `finish` 전에 버려지면 임시 파일 삭제
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match std::fs::remove_file(&self.tmp_path) {
            Ok(()) => tracing::debug!("Removed unfinished {:?}", self.tmp_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {:?}: {}", self.tmp_path, e),
        }
    }
}

/// 요약 파일 저장 (통째로 덮어씀)
pub fn write_summary(path: &Path, summary: &IngestionSummary) -> RagResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_vec_pretty(summary)?;
    std::fs::write(path, json)?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
