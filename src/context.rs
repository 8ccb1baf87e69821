//! 애플리케이션 컨텍스트
//!
//! 설정, 지식 저장소, 게이트웨이를 한 번 만들어 공유합니다.
//! 전역 상태 없이 필요한 곳에 명시적으로 넘겨 사용합니다.

use std::sync::Arc;

use crate::config::Settings;
use crate::embedding::{EmbeddingProvider, OllamaEmbedding};
use crate::error::RagResult;
use crate::extractor::FileTextExtractor;
use crate::generation::{GenerationProvider, OllamaGeneration};
use crate::knowledge::{Ingestor, KnowledgeStore, Retriever};
use crate::query::QueryOrchestrator;

/// 공유 컨텍스트 (생성 후 읽기 전용)
#[derive(Clone)]
pub struct RagContext {
    pub settings: Settings,
    pub store: Arc<KnowledgeStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn GenerationProvider>,
}

impl RagContext {
    /// 임의의 게이트웨이로 생성 (테스트용 가짜 구현 포함)
    pub fn new(
        settings: Settings,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            store: Arc::new(KnowledgeStore::from_settings(&settings)),
            settings,
            embedder,
            generator,
        }
    }

    /// Ollama 게이트웨이로 생성
    pub fn from_settings(settings: Settings) -> RagResult<Self> {
        let embedder = Arc::new(OllamaEmbedding::from_settings(&settings)?);
        let generator = Arc::new(OllamaGeneration::from_settings(&settings)?);
        Ok(Self::new(settings, embedder, generator))
    }

    pub fn retriever(&self) -> Retriever {
        Retriever::new(self.store.clone())
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(
            &self.settings,
            Arc::new(FileTextExtractor::new()),
            self.embedder.clone(),
        )
    }

    /// 질의 처리기 (세션 기록은 처리기마다 따로 보관)
    pub fn orchestrator(&self) -> QueryOrchestrator {
        QueryOrchestrator::new(
            &self.settings,
            self.store.clone(),
            self.embedder.clone(),
            self.generator.clone(),
        )
    }
}
