//! Ollama HTTP 클라이언트
//!
//! 임베딩/생성 게이트웨이가 공유하는 저수준 클라이언트입니다.
//! 연결 실패는 `ServiceUnavailable`, 타임아웃과 비정상 응답은 `RequestFailed`로 변환합니다.
//!
//! ref: https://github.com/ollama/ollama/blob/main/docs/api.md

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, RagResult};

/// 헬스 체크 타임아웃
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
/// 일반 요청 타임아웃 (스트리밍은 별도 클라이언트 없이 요청 단위로 해제)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// Health
// ============================================================================

/// 서비스 상태 (시작 전 점검용)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    /// 서버 응답 여부
    pub available: bool,
    /// 서버에 설치된 모델
    pub models: Vec<String>,
    /// 설정했지만 설치되지 않은 모델
    pub missing_models: Vec<String>,
}

impl ServiceHealth {
    /// 서버가 살아 있고 필요한 모델이 모두 있는지
    pub fn is_ready(&self) -> bool {
        self.available && self.missing_models.is_empty()
    }
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    name: String,
}

// ============================================================================
// OllamaClient
// ============================================================================

/// Ollama 서버 클라이언트
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> RagResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RagError::RequestFailed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// JSON POST (응답 전체 대기)
    pub async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> RagResult<reqwest::Response> {
        self.send(path, body, Some(REQUEST_TIMEOUT)).await
    }

    /// JSON POST (스트리밍 응답용, 전체 타임아웃 없음)
    pub async fn post_streaming<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> RagResult<reqwest::Response> {
        self.send(path, body, None).await
    }

    async fn send<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> RagResult<reqwest::Response> {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Ollama {} returned {}: {}", path, status, body);
            return Err(RagError::RequestFailed(format!(
                "Ollama {} returned {}: {}",
                path, status, body
            )));
        }

        Ok(response)
    }

    /// reqwest 에러를 파이프라인 에러로 변환
    ///
    /// 연결 자체가 안 될 때만 `ServiceUnavailable`. 연결 후 타임아웃은 `RequestFailed`.
    pub fn transport_error(&self, e: reqwest::Error) -> RagError {
        if e.is_connect() {
            RagError::ServiceUnavailable {
                url: self.base_url.clone(),
                reason: e.to_string(),
            }
        } else {
            RagError::RequestFailed(e.to_string())
        }
    }

    /// 서버 응답 여부
    pub async fn is_available(&self) -> bool {
        match self
            .client
            .get(&self.base_url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// 설치된 모델 목록
    pub async fn list_models(&self) -> Vec<String> {
        match self
            .client
            .get(self.url("/api/tags"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response
                .json::<TagsResponse>()
                .await
                .map(|t| t.models.into_iter().map(|m| m.name).collect())
                .unwrap_or_default(),
            _ => vec![],
        }
    }

    /// 가용성 + 필요한 모델 설치 여부 점검
    pub async fn check_health(&self, required: &[&str]) -> ServiceHealth {
        if !self.is_available().await {
            return ServiceHealth {
                available: false,
                models: vec![],
                missing_models: required.iter().map(|m| m.to_string()).collect(),
            };
        }

        let models = self.list_models().await;
        let missing_models = missing_models(&models, required);

        ServiceHealth {
            available: true,
            models,
            missing_models,
        }
    }
}

/// `llama3.2` 처럼 태그 없이 지정한 모델은 `llama3.2:latest` 와도 일치
fn missing_models(installed: &[String], required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|wanted| {
            !installed
                .iter()
                .any(|m| m == *wanted || m.split(':').next() == Some(**wanted))
        })
        .map(|m| m.to_string())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
