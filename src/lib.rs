//! netdoc-rag - 사내 IT 문서용 로컬 RAG 시스템
//!
//! 문서를 청크로 나눠 Ollama 임베딩과 함께 JSONL 로그에 저장하고,
//! 질의 시 코사인 유사도로 찾은 청크를 컨텍스트로 답변을 생성합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod knowledge;
pub mod ollama;
pub mod query;

// Re-exports
pub use config::{get_data_dir, RetrievalConfig, Settings};
pub use context::RagContext;
pub use embedding::{EmbeddingProvider, OllamaEmbedding};
pub use error::{RagError, RagResult};
pub use generation::{FragmentStream, GenerationProvider, OllamaGeneration, StreamEvent};
pub use knowledge::{
    cosine_similarity, ChunkConfig, Chunker, DocumentType, IngestionReport, Ingestor,
    KnowledgeStore, Metadata, MetadataExtractor, Retriever, SearchMatch, SentenceChunker,
    StoreStats, TextMatch,
};
pub use query::{
    Interaction, QueryMode, QueryOptions, QueryOrchestrator, QueryResponse, SourceCitation,
};
