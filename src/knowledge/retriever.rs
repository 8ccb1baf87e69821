//! Retriever - 코사인 유사도 기반 청크 검색
//!
//! 메모리에 올라간 모든 청크와 질의 벡터를 비교하는 선형 탐색입니다 (O(n)).
//! 소규모 사내 문서 모음 기준이며, 인덱스(ANN)는 사용하지 않습니다.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;

use super::store::{KnowledgeBase, KnowledgeStore};

/// 텍스트 검색 미리보기 길이 (문자)
const PREVIEW_CHARS: usize = 300;

// ============================================================================
// Types
// ============================================================================

/// 벡터 검색 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    pub chunk_id: String,
    pub document_name: String,
    pub chunk_index: usize,
    pub text: String,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub similarity: f32,
}

/// 텍스트(부분 문자열) 검색 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMatch {
    pub chunk_id: String,
    pub document_name: String,
    pub chunk_index: usize,
    /// 앞 300자
    pub preview: String,
    /// 항상 1.0
    pub confidence: f32,
}

// ============================================================================
// Retriever
// ============================================================================

/// 지식 저장소 위의 검색기
#[derive(Clone)]
pub struct Retriever {
    store: Arc<KnowledgeStore>,
}

impl Retriever {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self { store }
    }

    /// 벡터 검색
    ///
    /// 유사도가 `threshold` 이상인 청크를 내림차순으로 최대 `top_k`개 반환합니다.
    /// 저장소가 로드되지 않았으면 빈 결과입니다.
    pub fn search(&self, query_embedding: &[f32], top_k: usize, threshold: f32) -> Vec<SearchMatch> {
        match self.store.snapshot() {
            Some(kb) => rank_chunks(&kb, query_embedding, top_k, threshold),
            None => {
                tracing::debug!("Vector search on unloaded knowledge store");
                vec![]
            }
        }
    }

    /// 텍스트 검색 (대소문자 무시 부분 문자열, 벡터 미사용)
    pub fn search_documents(&self, query: &str, limit: usize) -> Vec<TextMatch> {
        match self.store.snapshot() {
            Some(kb) => find_text(&kb, query, limit),
            None => vec![],
        }
    }
}

/// 모든 청크의 유사도를 계산해 정렬
///
/// 동률은 `chunk_index` 오름차순, 그래도 같으면 로그에 기록된 순서를 유지합니다.
pub fn rank_chunks(
    kb: &KnowledgeBase,
    query_embedding: &[f32],
    top_k: usize,
    threshold: f32,
) -> Vec<SearchMatch> {
    if top_k == 0 {
        return vec![];
    }

    let mut matches: Vec<SearchMatch> = kb
        .chunks()
        .iter()
        .filter_map(|chunk| {
            let similarity = cosine_similarity(query_embedding, &chunk.embedding);
            (similarity >= threshold).then(|| SearchMatch {
                chunk_id: chunk.id.clone(),
                document_name: chunk.document_name.clone(),
                chunk_index: chunk.chunk_index,
                text: chunk.text.clone(),
                similarity,
            })
        })
        .collect();

    // sort_by는 안정 정렬
    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
    matches.truncate(top_k);

    tracing::debug!(
        "Vector search: {} matches over {} chunks",
        matches.len(),
        kb.chunks().len()
    );
    matches
}

fn find_text(kb: &KnowledgeBase, query: &str, limit: usize) -> Vec<TextMatch> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return vec![];
    }

    kb.chunks()
        .iter()
        .filter(|chunk| chunk.text.to_lowercase().contains(&needle))
        .take(limit)
        .map(|chunk| TextMatch {
            chunk_id: chunk.id.clone(),
            document_name: chunk.document_name.clone(),
            chunk_index: chunk.chunk_index,
            preview: chunk.text.chars().take(PREVIEW_CHARS).collect(),
            confidence: 1.0,
        })
        .collect()
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 두 벡터 간의 코사인 유사도를 계산합니다.
/// 결과는 -1.0 ~ 1.0 범위입니다.
/// 벡터가 비었거나 길이가 다르거나 노름이 0이면 0.0입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::store::{ChunkRecord, KnowledgeRecord};
    use chrono::Utc;

    fn chunk(doc: &str, index: usize, text: &str, embedding: Vec<f32>) -> KnowledgeRecord {
        KnowledgeRecord::Chunk(ChunkRecord {
            id: format!("{}#{}", doc, index),
            text: text.to_string(),
            document_name: doc.to_string(),
            chunk_index: index,
            word_count: text.split_whitespace().count(),
            embedding,
            processed_at: Utc::now(),
        })
    }

    fn sample_kb() -> KnowledgeBase {
        KnowledgeBase::from_records(vec![
            chunk("dns.txt", 0, "DNS resolves names to addresses.", vec![1.0, 0.0, 0.0]),
            chunk("dns.txt", 1, "Forwarders point to the ISP resolvers.", vec![0.9, 0.1, 0.0]),
            chunk("vpn.txt", 0, "The VPN concentrator terminates IPsec tunnels.", vec![0.0, 1.0, 0.0]),
            chunk("vpn.txt", 1, "Split tunneling is disabled for dns traffic.", vec![0.5, 0.5, 0.0]),
            chunk("misc.txt", 0, "Unrelated.", vec![-1.0, 0.0, 0.0]),
        ])
    }

    #[test]
    fn test_cosine_similarity_same() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) - -1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_degenerate() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_symmetric_and_bounded() {
        let vectors = [
            vec![0.3, -1.2, 4.0],
            vec![2.5, 0.1, -0.7],
            vec![-3.0, -3.0, 1.0],
            vec![1e-3, 5.0, 2.0],
        ];
        for a in &vectors {
            for b in &vectors {
                let ab = cosine_similarity(a, b);
                assert_eq!(ab, cosine_similarity(b, a));
                assert!((-1.0..=1.0).contains(&ab));
            }
        }
    }

    #[test]
    fn test_rank_respects_top_k_threshold_and_order() {
        let kb = sample_kb();
        let results = rank_chunks(&kb, &[1.0, 0.0, 0.0], 3, 0.1);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk_id, "dns.txt#0");
        assert_eq!(results[1].chunk_id, "dns.txt#1");
        assert_eq!(results[2].chunk_id, "vpn.txt#1");
        assert!(results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        assert!(results.iter().all(|r| r.similarity >= 0.1));

        // 직교/반대 벡터는 threshold에서 걸러짐
        let all = rank_chunks(&kb, &[1.0, 0.0, 0.0], 10, 0.1);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_rank_ties_broken_by_chunk_index() {
        let kb = KnowledgeBase::from_records(vec![
            chunk("b.txt", 2, "same vector later index", vec![1.0, 1.0]),
            chunk("a.txt", 0, "same vector first index", vec![1.0, 1.0]),
            chunk("c.txt", 2, "same vector same index", vec![1.0, 1.0]),
        ]);
        let results = rank_chunks(&kb, &[1.0, 1.0], 5, 0.0);
        let ids: Vec<&str> = results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a.txt#0", "b.txt#2", "c.txt#2"]);
    }

    #[test]
    fn test_rank_zero_top_k() {
        assert!(rank_chunks(&sample_kb(), &[1.0, 0.0, 0.0], 0, 0.0).is_empty());
    }

    #[test]
    fn test_find_text_case_insensitive() {
        let kb = sample_kb();
        let results = find_text(&kb, "dns", 10);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.confidence == 1.0));

        assert_eq!(find_text(&kb, "DNS", 1).len(), 1);
        assert!(find_text(&kb, "   ", 10).is_empty());
    }

    #[test]
    fn test_find_text_preview_length() {
        let long = "firewall ".repeat(100);
        let kb = KnowledgeBase::from_records(vec![chunk("fw.txt", 0, &long, vec![1.0])]);
        let results = find_text(&kb, "FIREWALL", 5);
        assert_eq!(results[0].preview.chars().count(), 300);
    }
}
