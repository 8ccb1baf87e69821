//! Knowledge 모듈 - 문서 지식 저장소
//!
//! - Chunker: 문장 단위 텍스트 분할 + 오버랩
//! - Metadata: 단어 수, 키워드, 문서 유형
//! - Store: JSONL 레코드 로그 + 메모리 스냅샷
//! - Retriever: 코사인 유사도 선형 탐색
//! - Ingest: 파일 → 청크 → 임베딩 → 로그

mod chunker;
mod ingest;
mod metadata;
mod retriever;
mod store;

// Re-exports
pub use chunker::{
    sentence_chunker, ChunkCandidate, ChunkConfig, Chunker, SentenceChunker,
};
pub use ingest::{DocumentFailure, IngestedDocument, IngestionReport, Ingestor};
pub use metadata::{DocumentType, KeywordCount, Metadata, MetadataExtractor};
pub use retriever::{cosine_similarity, rank_chunks, Retriever, SearchMatch, TextMatch};
pub use store::{
    write_summary, ChunkRecord, DocumentRecord, DocumentSummary, IngestionSummary, KnowledgeBase,
    KnowledgeBaseWriter, KnowledgeRecord, KnowledgeStore, LoadStatus, StoreStats,
};
