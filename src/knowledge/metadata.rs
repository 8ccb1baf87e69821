//! Metadata Extractor
//!
//! 문서 텍스트에서 단어/문자 수, 도메인 키워드 빈도, 문서 유형을 추출합니다.
//! 외부 호출 없이 결정적으로 동작합니다.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 분당 읽기 단어 수
const WORDS_PER_MINUTE: usize = 200;
/// 키워드로 인정되는 최소 등장 횟수 (초과)
const MIN_KEYWORD_OCCURRENCES: usize = 2;
/// 보관할 키워드 개수
const MAX_KEYWORDS: usize = 10;
/// 문서 유형 판단에 사용할 앞부분 줄 수
const CLASSIFY_LINES: usize = 10;

// ============================================================================
// Types
// ============================================================================

/// 문서 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// 정책/절차서
    Policy,
    /// 매뉴얼/가이드
    Manual,
    Configuration,
    Troubleshooting,
    Specification,
    General,
}

impl DocumentType {
    /// 우선순위 순서의 판별 규칙 (먼저 매칭된 것이 이김)
    const RULES: [(DocumentType, &'static [&'static str]); 5] = [
        (DocumentType::Policy, &["policy", "procedure"]),
        (DocumentType::Manual, &["manual", "guide", "handbook"]),
        (DocumentType::Configuration, &["configuration", "config", "setup"]),
        (DocumentType::Troubleshooting, &["troubleshoot", "problem", "issue"]),
        (DocumentType::Specification, &["specification", "spec", "requirement"]),
    ];

    /// 문서 앞부분 10줄로 유형 판별
    pub fn classify(text: &str) -> Self {
        let header = text
            .lines()
            .take(CLASSIFY_LINES)
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        Self::RULES
            .iter()
            .find(|(_, triggers)| triggers.iter().any(|t| header.contains(t)))
            .map(|(doc_type, _)| *doc_type)
            .unwrap_or(DocumentType::General)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Policy => "policy",
            DocumentType::Manual => "manual",
            DocumentType::Configuration => "configuration",
            DocumentType::Troubleshooting => "troubleshooting",
            DocumentType::Specification => "specification",
            DocumentType::General => "general",
        }
    }
}

/// 키워드와 등장 횟수
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub count: usize,
}

/// 문서 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub filename: String,
    pub word_count: usize,
    pub character_count: usize,
    /// 예상 읽기 시간 (분)
    pub estimated_reading_time: usize,
    /// 빈도 내림차순, 최대 10개
    pub keywords: Vec<KeywordCount>,
    pub document_type: DocumentType,
}

// ============================================================================
// MetadataExtractor
// ============================================================================

/// 메타데이터 추출기
///
/// 키워드 어휘는 생성 시 정규식으로 컴파일해 둡니다.
pub struct MetadataExtractor {
    vocabulary: Vec<(String, Regex)>,
}

impl MetadataExtractor {
    /// 어휘 목록으로 생성
    pub fn new<S: AsRef<str>>(vocabulary: &[S]) -> Self {
        let vocabulary = vocabulary
            .iter()
            .filter_map(|term| {
                let term = term.as_ref().trim();
                if term.is_empty() {
                    return None;
                }
                let pattern = format!(r"(?i)\b{}\b", regex::escape(term));
                match Regex::new(&pattern) {
                    Ok(re) => Some((term.to_lowercase(), re)),
                    Err(e) => {
                        tracing::warn!("Skipping keyword {:?}: {}", term, e);
                        None
                    }
                }
            })
            .collect();

        Self { vocabulary }
    }

    /// 기본 네트워크/IT 어휘로 생성
    pub fn with_defaults() -> Self {
        Self::new(&crate::config::default_keyword_vocabulary())
    }

    /// 메타데이터 추출
    pub fn extract(&self, text: &str, filename: &str) -> Metadata {
        let word_count = text.split_whitespace().count();

        Metadata {
            filename: filename.to_string(),
            word_count,
            character_count: text.chars().count(),
            estimated_reading_time: word_count.div_ceil(WORDS_PER_MINUTE),
            keywords: self.keywords(text),
            document_type: DocumentType::classify(text),
        }
    }

    /// 어휘 중 3회 이상 등장한 용어를 빈도순으로
    fn keywords(&self, text: &str) -> Vec<KeywordCount> {
        let mut counts: Vec<KeywordCount> = self
            .vocabulary
            .iter()
            .map(|(term, re)| KeywordCount {
                keyword: term.clone(),
                count: re.find_iter(text).count(),
            })
            .filter(|k| k.count > MIN_KEYWORD_OCCURRENCES)
            .collect();

        // 안정 정렬: 동률은 어휘 순서 유지
        counts.sort_by(|a, b| b.count.cmp(&a.count));
        counts.truncate(MAX_KEYWORDS);
        counts
    }
}

// ============================================================================
// Tests
// ============================================================================
