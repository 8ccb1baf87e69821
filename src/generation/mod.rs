//! 생성 모듈 - Ollama를 통한 답변 생성
//!
//! 검색된 문서 컨텍스트와 질문을 받아 답변을 생성합니다.
//! 스트리밍 응답은 콜백 대신 채널로 전달되며, 종료(`End`)와 실패(`Failed`)가
//! 명시적인 마지막 이벤트로 옵니다.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::error::{RagError, RagResult};
use crate::ollama::{OllamaClient, ServiceHealth};

/// 스트림 채널 버퍼 크기
const STREAM_BUFFER: usize = 64;

/// 시스템 프롬프트
const SYSTEM_PROMPT: &str = "You are an IT support assistant for an internal network and \
systems team. Answer using the documentation context when it is provided. If the context \
does not contain the answer, say so plainly and give general guidance. Cite document names \
when you rely on them.";

// ============================================================================
// Stream Types
// ============================================================================

/// 스트리밍 생성 이벤트
#[derive(Debug)]
pub enum StreamEvent {
    /// 텍스트 조각 (수신 순서 그대로)
    Fragment(String),
    /// 정상 종료
    End,
    /// 실패로 종료
    Failed(RagError),
}

/// 생성 스트림 수신 측
pub type FragmentStream = mpsc::Receiver<StreamEvent>;

// ============================================================================
// GenerationProvider Trait
// ============================================================================

/// 답변 생성 프로바이더 트레이트
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// 전체 답변 생성
    async fn generate(&self, prompt: &str, context: &str, max_tokens: usize) -> RagResult<String>;

    /// 스트리밍 생성
    ///
    /// 요청이 수락되면 스트림을 반환하고, 이후 실패는 `StreamEvent::Failed`로 전달됩니다.
    async fn generate_stream(
        &self,
        prompt: &str,
        context: &str,
        max_tokens: usize,
    ) -> RagResult<FragmentStream>;

    /// 서비스 가용성 및 모델 설치 여부
    async fn health(&self) -> ServiceHealth;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Prompt
// ============================================================================

/// 컨텍스트와 질문으로 프롬프트 구성
pub fn build_prompt(question: &str, context: &str) -> String {
    if context.trim().is_empty() {
        return format!("Question: {}\n\nAnswer:", question);
    }

    format!(
        "Use the following documentation excerpts to answer the question.\n\n\
         Context:\n{}\n\n\
         Question: {}\n\n\
         Answer:",
        context, question
    )
}

// ============================================================================
// Ollama Generation
// ============================================================================

/// Ollama 생성 구현체 (`/api/generate`)
#[derive(Debug, Clone)]
pub struct OllamaGeneration {
    client: OllamaClient,
    model: String,
    /// 헬스 체크 시 함께 확인할 모델 (임베딩 모델 등)
    required_models: Vec<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: usize,
}

/// `/api/generate` 응답 (스트리밍 시 한 줄)
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaGeneration {
    pub fn new(base_url: &str, model: impl Into<String>) -> RagResult<Self> {
        let model = model.into();
        Ok(Self {
            client: OllamaClient::new(base_url)?,
            required_models: vec![model.clone()],
            model,
        })
    }

    /// 설정에서 생성 (헬스 체크에 임베딩 모델 포함)
    pub fn from_settings(settings: &Settings) -> RagResult<Self> {
        let mut generation = Self::new(&settings.ollama_url, settings.chat_model.clone())?;
        generation.required_models.push(settings.embed_model.clone());
        Ok(generation)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, prompt: &str, context: &str, max_tokens: usize, stream: bool) -> GenerateRequest<'_> {
        GenerateRequest {
            model: &self.model,
            prompt: build_prompt(prompt, context),
            system: SYSTEM_PROMPT,
            stream,
            options: GenerateOptions {
                num_predict: max_tokens,
            },
        }
    }
}

#[async_trait]
impl GenerationProvider for OllamaGeneration {
    async fn generate(&self, prompt: &str, context: &str, max_tokens: usize) -> RagResult<String> {
        let request = self.request(prompt, context, max_tokens, false);
        let response = self.client.post_json("/api/generate", &request).await?;

        let parsed: GenerateChunk = response
            .json()
            .await
            .map_err(|e| RagError::RequestFailed(format!("Failed to parse generation response: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(RagError::RequestFailed(error));
        }

        Ok(parsed.response)
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        context: &str,
        max_tokens: usize,
    ) -> RagResult<FragmentStream> {
        let request = self.request(prompt, context, max_tokens, true);
        let response = self.client.post_streaming("/api/generate", &request).await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut decoder = LineDecoder::default();

            while let Some(next) = body.next().await {
                let bytes = match next {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Failed(client.transport_error(e))).await;
                        return;
                    }
                };

                for line in decoder.push(&bytes) {
                    match parse_stream_line(&line) {
                        Ok(Some(StreamEvent::End)) => {
                            let _ = tx.send(StreamEvent::End).await;
                            return;
                        }
                        Ok(Some(event)) => {
                            // 수신 측이 떠나면 중단
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            let _ = tx.send(StreamEvent::Failed(e)).await;
                            return;
                        }
                    }
                }
            }

            if let Some(line) = decoder.finish() {
                if let Ok(Some(StreamEvent::Fragment(text))) = parse_stream_line(&line) {
                    let _ = tx.send(StreamEvent::Fragment(text)).await;
                }
            }

            tracing::debug!("Generation stream closed without done marker");
            let _ = tx.send(StreamEvent::End).await;
        });

        Ok(rx)
    }

    async fn health(&self) -> ServiceHealth {
        let required: Vec<&str> = self.required_models.iter().map(String::as_str).collect();
        self.client.check_health(&required).await
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// NDJSON decoding
// ============================================================================

/// 바이트 청크를 줄 단위로 모으는 디코더
#[derive(Debug, Default)]
struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// 완성된 줄만 반환하고 나머지는 보관
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// 줄바꿈 없이 끝난 마지막 줄
    fn finish(self) -> Option<String> {
        let line = String::from_utf8_lossy(&self.buffer).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

/// 스트림 한 줄 해석
fn parse_stream_line(line: &str) -> RagResult<Option<StreamEvent>> {
    let chunk: GenerateChunk = serde_json::from_str(line)?;

    if let Some(error) = chunk.error {
        return Err(RagError::RequestFailed(error));
    }
    if chunk.done {
        return Ok(Some(StreamEvent::End));
    }
    if chunk.response.is_empty() {
        return Ok(None);
    }
    Ok(Some(StreamEvent::Fragment(chunk.response)))
}

// ============================================================================
// Tests
// ============================================================================
