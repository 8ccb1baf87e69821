//! 임베딩 모듈 - Ollama를 통한 텍스트 벡터화
//!
//! 텍스트를 벡터로 변환하는 임베딩 게이트웨이입니다.
//! 시맨틱 검색을 위한 핵심 모듈입니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OllamaEmbedding::from_settings(&settings)?;
//! let embedding = embedder.embed("How do I reset the VPN token?").await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::{RagError, RagResult};
use crate::ollama::OllamaClient;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> RagResult<Vec<f32>>;

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama Embedding
// ============================================================================

/// Ollama 임베딩 구현체 (`/api/embeddings`)
#[derive(Debug, Clone)]
pub struct OllamaEmbedding {
    client: OllamaClient,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// 새 Ollama 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `base_url` - Ollama 서버 주소
    /// * `model` - 임베딩 모델 이름
    /// * `dimension` - 모델 출력 차원
    pub fn new(base_url: &str, model: impl Into<String>, dimension: usize) -> RagResult<Self> {
        Ok(Self {
            client: OllamaClient::new(base_url)?,
            model: model.into(),
            dimension,
        })
    }

    /// 설정에서 생성
    pub fn from_settings(settings: &Settings) -> RagResult<Self> {
        Self::new(
            &settings.ollama_url,
            settings.embed_model.clone(),
            settings.embed_dimension,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> RagResult<Vec<f32>> {
        // 빈 텍스트 처리
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = EmbedRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self.client.post_json("/api/embeddings", &request).await?;
        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::RequestFailed(format!("Failed to parse embedding response: {}", e)))?;

        if parsed.embedding.is_empty() {
            return Err(RagError::RequestFailed(format!(
                "Model {} returned an empty embedding",
                self.model
            )));
        }

        if parsed.embedding.len() != self.dimension {
            tracing::warn!(
                "Unexpected embedding dimensions: got {}, expected {}",
                parsed.embedding.len(),
                self.dimension
            );
        }

        Ok(parsed.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
