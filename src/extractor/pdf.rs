//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 텍스트를 추출합니다.

use std::path::Path;

use anyhow::{Context, Result};

/// PDF에서 텍스트 추출
///
/// 페이지 구분(폼피드)은 문단 구분으로 바꿉니다.
pub fn extract_text_from_pdf(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    // pdf-extract 는 손상된 입력에서 패닉할 수 있음
    let text = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes))
        .map_err(|_| anyhow::anyhow!("PDF parser panicked on {:?}", path))?
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
    }

    Ok(join_pages(&text))
}

/// 폼피드로 나뉜 페이지를 빈 줄로 연결
fn join_pages(text: &str) -> String {
    text.split('\x0c')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ============================================================================
// Tests
// ============================================================================
