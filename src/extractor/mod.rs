//! 콘텐츠 추출 모듈
//!
//! 문서 파일에서 텍스트를 추출합니다.
//! - 텍스트 파일 (txt, md): 직접 읽기
//! - PDF 파일: pdf-extract로 텍스트 추출
//! - DOCX 파일: word/document.xml 의 텍스트 런 추출

pub mod docx;
pub mod pdf;

use std::path::Path;

use async_trait::async_trait;

use crate::collector::FileType;
use crate::error::{RagError, RagResult};

// ============================================================================
// TextExtractor Trait
// ============================================================================

/// 문서 텍스트 추출 트레이트
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// 파일에서 텍스트 추출
    ///
    /// 지원하지 않는 확장자는 `UnsupportedFormat`, 파싱 실패는 `ExtractionFailed`.
    async fn extract_text(&self, path: &Path, filename: &str) -> RagResult<String>;
}

// ============================================================================
// File Text Extractor
// ============================================================================

/// 확장자 기반 콘텐츠 추출기
#[derive(Debug, Clone, Default)]
pub struct FileTextExtractor;

impl FileTextExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 텍스트 파일에서 추출
    async fn extract_plain(&self, path: &Path, filename: &str) -> RagResult<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| extraction_failed(filename, e))?;

        // UTF-8 이 아닌 바이트는 대체 문자로
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// 바이너리 포맷은 CPU 바운드이므로 spawn_blocking 사용
    async fn extract_blocking<F>(&self, path: &Path, filename: &str, extract: F) -> RagResult<String>
    where
        F: FnOnce(&Path) -> anyhow::Result<String> + Send + 'static,
    {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || extract(&owned))
            .await
            .map_err(|e| extraction_failed(filename, e))?
            .map_err(|e| extraction_failed(filename, format!("{:#}", e)))
    }
}

#[async_trait]
impl TextExtractor for FileTextExtractor {
    async fn extract_text(&self, path: &Path, filename: &str) -> RagResult<String> {
        let file_type = FileType::from_path(path)
            .ok_or_else(|| RagError::UnsupportedFormat(filename.to_string()))?;

        let text = match file_type {
            FileType::Text => self.extract_plain(path, filename).await?,
            FileType::Pdf => {
                self.extract_blocking(path, filename, pdf::extract_text_from_pdf)
                    .await?
            }
            FileType::Docx => {
                self.extract_blocking(path, filename, docx::extract_text_from_docx)
                    .await?
            }
        };

        tracing::debug!("Extracted {} chars from {}", text.len(), filename);
        Ok(text)
    }
}

fn extraction_failed(filename: &str, reason: impl std::fmt::Display) -> RagError {
    RagError::ExtractionFailed {
        file: filename.to_string(),
        reason: reason.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_extract_plain_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Firewall\n\nAllow 443 inbound.").unwrap();

        let text = FileTextExtractor::new()
            .extract_text(&path, "notes.md")
            .await
            .unwrap();
        assert_eq!(text, "# Firewall\n\nAllow 443 inbound.");
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("setup.exe");
        std::fs::write(&path, [0u8, 1, 2]).unwrap();

        let err = FileTextExtractor::new()
            .extract_text(&path, "setup.exe")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFormat(ref f) if f == "setup.exe"));
    }

    #[tokio::test]
    async fn test_corrupt_pdf_is_extraction_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not really a pdf").unwrap();

        let err = FileTextExtractor::new()
            .extract_text(&path, "broken.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ExtractionFailed { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_extraction_failure() {
        let dir = TempDir::new().unwrap();
        let err = FileTextExtractor::new()
            .extract_text(&dir.path().join("gone.txt"), "gone.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ExtractionFailed { .. }));
    }
}
