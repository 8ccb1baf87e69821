//! 세션별 대화 기록
//!
//! 세션마다 최근 N개만 보관하는 링 버퍼입니다. 프로세스 메모리에만 존재합니다.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 세션당 보관할 최대 기록 수
pub const HISTORY_CAPACITY: usize = 20;

/// 질의/응답 한 건
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub response: String,
    /// 답변에 쓰인 문서 이름 (중복 제거)
    pub context_sources: Vec<String>,
    pub has_context: bool,
}

/// 세션 ID → 기록
#[derive(Debug)]
pub struct SessionHistory {
    sessions: Mutex<HashMap<String, VecDeque<Interaction>>>,
    capacity: usize,
}

impl Default for SessionHistory {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

impl SessionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Interaction>>> {
        // 기록은 보조 데이터라 poison 되어도 계속 사용
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 기록 추가 (용량 초과 시 가장 오래된 것 제거)
    pub fn record(&self, session_id: &str, interaction: Interaction) {
        let mut sessions = self.lock();
        let entries = sessions.entry(session_id.to_string()).or_default();
        entries.push_back(interaction);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// 최근 기록 (오래된 것부터). `limit`이 있으면 마지막 `limit`개만
    pub fn recent(&self, session_id: &str, limit: Option<usize>) -> Vec<Interaction> {
        let sessions = self.lock();
        let Some(entries) = sessions.get(session_id) else {
            return vec![];
        };

        let skip = limit.map_or(0, |n| entries.len().saturating_sub(n));
        entries.iter().skip(skip).cloned().collect()
    }

    /// 세션 기록 삭제. 세션이 있었으면 `true`
    pub fn clear(&self, session_id: &str) -> bool {
        self.lock().remove(session_id).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interaction(query: &str) -> Interaction {
        Interaction {
            timestamp: Utc::now(),
            query: query.to_string(),
            response: format!("answer to {}", query),
            context_sources: vec![],
            has_context: false,
        }
    }

    #[test]
    fn test_capacity_keeps_most_recent() {
        let history = SessionHistory::default();
        for i in 0..21 {
            history.record("s1", interaction(&format!("q{}", i)));
        }

        let entries = history.recent("s1", None);
        assert_eq!(entries.len(), HISTORY_CAPACITY);
        assert_eq!(entries[0].query, "q1");
        assert_eq!(entries[19].query, "q20");
    }

    #[test]
    fn test_recent_with_limit() {
        let history = SessionHistory::new(5);
        for i in 0..4 {
            history.record("s1", interaction(&format!("q{}", i)));
        }

        let last_two: Vec<String> = history
            .recent("s1", Some(2))
            .into_iter()
            .map(|i| i.query)
            .collect();
        assert_eq!(last_two, vec!["q2", "q3"]);
        assert_eq!(history.recent("s1", Some(10)).len(), 4);
        assert!(history.recent("unknown", None).is_empty());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let history = SessionHistory::default();
        history.record("a", interaction("vpn"));
        history.record("b", interaction("dns"));

        assert_eq!(history.session_count(), 2);
        assert!(history.clear("a"));
        assert!(!history.clear("a"));
        assert!(history.recent("a", None).is_empty());
        assert_eq!(history.recent("b", None)[0].query, "dns");
        assert_eq!(history.session_count(), 1);
    }
}
