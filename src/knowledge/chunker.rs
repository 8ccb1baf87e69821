//! Text Chunking Module
//!
//! 문장 인식 텍스트 분할을 제공합니다.
//! 문장 경계를 존중하면서 `chunk_size` 이하의 청크로 나누고,
//! 이전 청크의 끝부분을 다음 청크 앞에 붙여 문맥을 이어줍니다.
//!
//! 길이는 모두 문자(char) 단위입니다.

use uuid::Uuid;

/// 이 길이 이하의 문장 조각은 노이즈로 간주하고 버립니다
const MIN_SENTENCE_CHARS: usize = 10;

/// 오버랩 앞부분을 단어 경계로 자를 수 있는 최대 비율
const OVERLAP_TRIM_RATIO: f64 = 0.3;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수, 오버랩 제외)
    pub chunk_size: usize,
    /// 오버랩 크기 (문자 수)
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

// ============================================================================
// Chunk Candidate
// ============================================================================

/// 청커 출력 (임베딩 전 청크)
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkCandidate {
    pub id: String,
    /// 오버랩이 적용된 최종 텍스트
    pub text: String,
    pub document_id: String,
    /// 문서 내 순번 (0부터)
    pub chunk_index: usize,
    pub word_count: usize,
    /// 너무 긴 문장을 단어 단위로 자른 조각인지 여부
    pub partial_sentence: bool,
}

/// 오버랩 적용 전 청크
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawChunk {
    pub text: String,
    pub partial_sentence: bool,
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str, document_id: &str) -> Vec<ChunkCandidate>;
}

// ============================================================================
// SentenceChunker
// ============================================================================

/// 문장 인식 청커
///
/// 1. `.` `!` `?` 경계로 문장 분리 (10자 이하 조각 제거)
/// 2. `chunk_size`를 넘기 전까지 문장을 누적
/// 3. 한 문장이 `chunk_size`보다 길면 단어 단위로 재분할
/// 4. 이전 청크 끝 `chunk_overlap`자를 다음 청크 앞에 추가
pub struct SentenceChunker {
    config: ChunkConfig,
}

impl SentenceChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 오버랩 적용 전 청크 목록
    pub(crate) fn split_raw(&self, text: &str) -> Vec<RawChunk> {
        let sentences = split_sentences(text);
        self.pack_sentences(sentences)
    }

    /// 문장을 크기 제한 안에서 탐욕적으로 누적
    fn pack_sentences(&self, sentences: Vec<String>) -> Vec<RawChunk> {
        let limit = self.config.chunk_size;
        let mut chunks = Vec::new();
        let mut buffer = String::new();
        let mut buffer_len = 0usize;

        for sentence in sentences {
            let sentence_len = char_len(&sentence);

            // 문장 하나가 한도를 넘으면 단어 단위로 분할
            if sentence_len > limit {
                if !buffer.is_empty() {
                    chunks.push(RawChunk::whole(std::mem::take(&mut buffer)));
                    buffer_len = 0;
                }
                chunks.extend(self.split_words(&sentence));
                continue;
            }

            if buffer.is_empty() {
                buffer = sentence;
                buffer_len = sentence_len;
            } else if buffer_len + 1 + sentence_len <= limit {
                buffer.push(' ');
                buffer.push_str(&sentence);
                buffer_len += 1 + sentence_len;
            } else {
                chunks.push(RawChunk::whole(std::mem::replace(&mut buffer, sentence)));
                buffer_len = sentence_len;
            }
        }

        if !buffer.is_empty() {
            chunks.push(RawChunk::whole(buffer));
        }

        chunks
    }

    /// 긴 문장을 단어 경계에서 분할
    fn split_words(&self, sentence: &str) -> Vec<RawChunk> {
        let limit = self.config.chunk_size;
        let mut chunks = Vec::new();
        let mut buffer = String::new();
        let mut buffer_len = 0usize;

        for word in sentence.split_whitespace() {
            let word_len = char_len(word);

            if buffer.is_empty() {
                buffer.push_str(word);
                buffer_len = word_len;
            } else if buffer_len + 1 + word_len <= limit {
                buffer.push(' ');
                buffer.push_str(word);
                buffer_len += 1 + word_len;
            } else {
                chunks.push(RawChunk::partial(std::mem::replace(
                    &mut buffer,
                    word.to_string(),
                )));
                buffer_len = word_len;
            }
        }

        if !buffer.is_empty() {
            chunks.push(RawChunk::partial(buffer));
        }

        chunks
    }

    /// 이전 청크에서 가져올 오버랩 문자열
    ///
    /// 끝 `chunk_overlap`자를 가져오고, 첫 공백이 윈도우 앞 30% 안에 있을 때만
    /// 그 공백 이후부터 사용합니다 (잘린 단어 제거).
    fn overlap_from(&self, previous: &str) -> Option<String> {
        if self.config.chunk_overlap == 0 {
            return None;
        }

        let window = tail_chars(previous, self.config.chunk_overlap);
        let window_len = char_len(window);
        let trim_limit = window_len as f64 * OVERLAP_TRIM_RATIO;

        let overlap = match window
            .char_indices()
            .enumerate()
            .find(|(_, (_, c))| c.is_whitespace())
        {
            Some((char_pos, (byte_pos, _))) if (char_pos as f64) < trim_limit => {
                window[byte_pos..].trim_start()
            }
            _ => window,
        };

        if overlap.trim().is_empty() {
            None
        } else {
            Some(overlap.to_string())
        }
    }

    /// 오버랩 적용 (첫 청크는 변경하지 않음)
    fn apply_overlap(&self, raw: &[RawChunk]) -> Vec<String> {
        raw.iter()
            .enumerate()
            .map(|(i, chunk)| {
                if i == 0 {
                    return chunk.text.clone();
                }
                match self.overlap_from(&raw[i - 1].text) {
                    Some(overlap) => format!("{} {}", overlap, chunk.text),
                    None => chunk.text.clone(),
                }
            })
            .collect()
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, text: &str, document_id: &str) -> Vec<ChunkCandidate> {
        if text.trim().is_empty() {
            return vec![];
        }

        let raw = self.split_raw(text);
        let texts = self.apply_overlap(&raw);

        raw.into_iter()
            .zip(texts)
            .enumerate()
            .map(|(chunk_index, (raw, text))| ChunkCandidate {
                id: Uuid::new_v4().to_string(),
                word_count: text.split_whitespace().count(),
                text,
                document_id: document_id.to_string(),
                chunk_index,
                partial_sentence: raw.partial_sentence,
            })
            .collect()
    }
}

impl RawChunk {
    fn whole(text: String) -> Self {
        Self {
            text,
            partial_sentence: false,
        }
    }

    fn partial(text: String) -> Self {
        Self {
            text,
            partial_sentence: true,
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 문장 분리
///
/// 종결 부호 뒤에 공백이나 텍스트 끝이 올 때만 경계로 봅니다
/// (`192.168.0.1`, `v1.2` 같은 토큰 보존). 문장 내부 공백은 하나로 정규화합니다.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);

        if !is_terminator(c) {
            continue;
        }

        // "..." / "?!" 같은 연속 부호는 한 번에 소비
        while let Some(&next) = chars.peek() {
            if !is_terminator(next) {
                break;
            }
            current.push(next);
            chars.next();
        }

        let at_boundary = chars.peek().map_or(true, |next| next.is_whitespace());
        if at_boundary {
            push_sentence(&mut sentences, &current);
            current.clear();
        }
    }

    push_sentence(&mut sentences, &current);
    sentences
}

#[inline]
fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if char_len(&normalized) > MIN_SENTENCE_CHARS {
        sentences.push(normalized);
    }
}

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 끝에서 `n`자 (UTF-8 안전). 문자열이 더 짧으면 전체.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((byte_pos, _)) => &s[byte_pos..],
        None => s,
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 문장 청커 생성 (설정 지정)
pub fn sentence_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(SentenceChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================
