//! 에러 타입
//!
//! 파이프라인 단계별 실패를 구분하는 라이브러리 에러입니다.
//! CLI 계층은 `anyhow`로 감싸서 사용합니다.
//!
//! 문서/청크 단위 실패(`ExtractionFailed`, `EmbeddingFailed`)는 배치를 중단하지 않고
//! 집계되며, 백엔드 장애(`ServiceUnavailable`)는 호출자에게 그대로 전파됩니다.

use thiserror::Error;

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 원본 파일에서 텍스트를 얻지 못함 (문서 단위, 배치는 계속)
    #[error("Failed to extract text from {file}: {reason}")]
    ExtractionFailed { file: String, reason: String },

    /// 지원하지 않는 파일 확장자
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// 청크 하나의 임베딩 실패 (청크 단위, 형제 청크는 계속)
    #[error("Failed to embed chunk: {0}")]
    EmbeddingFailed(String),

    /// 임베딩/생성 백엔드에 연결할 수 없음
    #[error("Model service unavailable at {url}: {reason}\n  Start it with `ollama serve` or set OLLAMA_URL")]
    ServiceUnavailable { url: String, reason: String },

    /// 백엔드가 비정상 응답을 반환
    #[error("Model service request failed: {0}")]
    RequestFailed(String),

    /// 지식베이스 로그의 한 줄을 파싱하지 못함
    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// 현재 작업 전체를 중단해야 하는 에러인지 여부
    pub fn is_fatal(&self) -> bool {
        matches!(self, RagError::ServiceUnavailable { .. })
    }
}

/// 라이브러리 결과 타입
pub type RagResult<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_unavailable_is_fatal() {
        let err = RagError::ServiceUnavailable {
            url: "http://localhost:11434".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("ollama serve"));

        let err = RagError::EmbeddingFailed("bad vector".to_string());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_malformed_record_message() {
        let err = RagError::MalformedRecord {
            line: 3,
            reason: "expected value".to_string(),
        };
        assert_eq!(err.to_string(), "Malformed record at line 3: expected value");
    }
}
