//! Query 모듈 - 검색 증강 질의 처리
//!
//! 질문 → (임베딩 → 검색) → 컨텍스트 구성 → 답변 생성 → 기록.
//!
//! 지식베이스가 없으면 임베딩/생성 호출 없이 고정 안내 응답을 돌려줍니다.
//! 같은 세션에 동시에 질의하면 기록 순서는 완료 순서를 따릅니다.

mod history;

pub use history::{Interaction, SessionHistory, HISTORY_CAPACITY};

use std::collections::HashMap;
use std::sync::Arc;

use regex::{Captures, Regex};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::{RetrievalConfig, Settings};
use crate::embedding::EmbeddingProvider;
use crate::error::RagResult;
use crate::generation::{GenerationProvider, StreamEvent};
use crate::knowledge::{KnowledgeStore, Retriever, SearchMatch};

/// 지식베이스가 없을 때의 안내 응답
pub const NO_KNOWLEDGE_BASE_MESSAGE: &str = "No documents are available yet. \
Ingest your documentation first (for example `netdoc-rag ingest ./docs`), then ask again.";

/// 컨텍스트 내 청크 구분자
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// 출처 미리보기 길이 (문자)
const CITATION_PREVIEW_CHARS: usize = 200;

pub const DEFAULT_SESSION: &str = "default";

// ============================================================================
// Options / Response
// ============================================================================

/// 질의 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryMode {
    #[default]
    General,
    /// 약어 확장 + 넓은 검색
    It,
}

/// 질의 옵션
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub session_id: String,
    /// false면 검색 없이 바로 생성
    pub use_context: bool,
    pub mode: QueryMode,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            session_id: DEFAULT_SESSION.to_string(),
            use_context: true,
            mode: QueryMode::General,
        }
    }
}

impl QueryOptions {
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub fn it(mut self) -> Self {
        self.mode = QueryMode::It;
        self
    }

    pub fn without_context(mut self) -> Self {
        self.use_context = false;
        self
    }
}

/// 답변 출처
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCitation {
    pub document: String,
    pub chunk_index: usize,
    pub similarity: f32,
    pub preview: String,
}

impl From<&SearchMatch> for SourceCitation {
    fn from(m: &SearchMatch) -> Self {
        Self {
            document: m.document_name.clone(),
            chunk_index: m.chunk_index,
            similarity: m.similarity,
            preview: m.text.chars().take(CITATION_PREVIEW_CHARS).collect(),
        }
    }
}

/// 질의 응답
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    pub has_context: bool,
    /// 지식베이스가 없어 인제스천이 필요함
    pub needs_ingestion: bool,
    pub session_id: String,
}

impl QueryResponse {
    fn no_knowledge_base(session_id: &str) -> Self {
        Self {
            answer: NO_KNOWLEDGE_BASE_MESSAGE.to_string(),
            sources: vec![],
            has_context: false,
            needs_ingestion: true,
            session_id: session_id.to_string(),
        }
    }
}

// ============================================================================
// Query Preprocessing
// ============================================================================

/// IT 질의 전처리 (약어 → 전체 표기, 단어 단위, 대소문자 무시)
///
/// 모든 약어를 한 번에 치환하므로 전체 표기 안의 약어는 다시 확장되지 않습니다.
#[derive(Debug, Clone)]
pub struct QueryPreprocessor {
    pattern: Option<Regex>,
    /// 소문자 약어 → 전체 표기
    expansions: HashMap<String, String>,
}

impl QueryPreprocessor {
    pub fn new(abbreviations: &[(String, String)]) -> Self {
        let mut entries: Vec<&(String, String)> = abbreviations
            .iter()
            .filter(|(short, _)| !short.trim().is_empty())
            .collect();
        // 긴 약어 우선
        entries.sort_by_key(|(short, _)| std::cmp::Reverse(short.len()));

        let expansions = entries
            .iter()
            .map(|(short, full)| (short.to_lowercase(), full.clone()))
            .collect();

        let alternation = entries
            .iter()
            .map(|(short, _)| regex::escape(short))
            .collect::<Vec<_>>()
            .join("|");

        let pattern = if alternation.is_empty() {
            None
        } else {
            match Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!("Abbreviation expansion disabled: {}", e);
                    None
                }
            }
        };

        Self {
            pattern,
            expansions,
        }
    }

    pub fn expand(&self, query: &str) -> String {
        let Some(pattern) = &self.pattern else {
            return query.to_string();
        };

        pattern
            .replace_all(query, |caps: &Captures| {
                let matched = &caps[0];
                self.expansions
                    .get(&matched.to_lowercase())
                    .cloned()
                    .unwrap_or_else(|| matched.to_string())
            })
            .into_owned()
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// 검색 결과로 만든 생성 입력
struct RetrievedContext {
    context: String,
    matches: Vec<SearchMatch>,
}

impl RetrievedContext {
    fn empty() -> Self {
        Self {
            context: String::new(),
            matches: vec![],
        }
    }
}

/// `[Source: 문서]` 머리말을 붙여 청크를 이어 붙임
pub fn build_context(matches: &[SearchMatch]) -> String {
    matches
        .iter()
        .map(|m| format!("[Source: {}]\n{}", m.document_name, m.text))
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

/// 질의 처리기
pub struct QueryOrchestrator {
    store: Arc<KnowledgeStore>,
    retriever: Retriever,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    preprocessor: QueryPreprocessor,
    retrieval: RetrievalConfig,
    it_retrieval: RetrievalConfig,
    max_tokens: usize,
    history: SessionHistory,
}

impl QueryOrchestrator {
    pub fn new(
        settings: &Settings,
        store: Arc<KnowledgeStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            retriever: Retriever::new(store.clone()),
            store,
            embedder,
            generator,
            preprocessor: QueryPreprocessor::new(&settings.abbreviations),
            retrieval: settings.retrieval,
            it_retrieval: settings.it_retrieval,
            max_tokens: settings.max_tokens,
            history: SessionHistory::default(),
        }
    }

    /// 동기 질의 (전체 답변 + 출처)
    pub async fn query(&self, question: &str, options: &QueryOptions) -> RagResult<QueryResponse> {
        let Some(retrieved) = self.retrieve(question, options).await? else {
            return Ok(QueryResponse::no_knowledge_base(&options.session_id));
        };

        let answer = self
            .generator
            .generate(question, &retrieved.context, self.max_tokens)
            .await?;

        Ok(self.complete(question, options, answer, retrieved))
    }

    /// 스트리밍 질의
    ///
    /// 조각은 받은 순서 그대로 `sink`로 즉시 전달되고, 전체 답변은 기록과 반환값에 쓰입니다.
    /// `sink` 수신 측이 먼저 닫혀도 스트림은 끝까지 소비합니다.
    pub async fn query_stream(
        &self,
        question: &str,
        options: &QueryOptions,
        sink: mpsc::Sender<String>,
    ) -> RagResult<QueryResponse> {
        let Some(retrieved) = self.retrieve(question, options).await? else {
            let _ = sink.send(NO_KNOWLEDGE_BASE_MESSAGE.to_string()).await;
            return Ok(QueryResponse::no_knowledge_base(&options.session_id));
        };

        let mut stream = self
            .generator
            .generate_stream(question, &retrieved.context, self.max_tokens)
            .await?;

        let mut answer = String::new();
        let mut forwarding = true;

        while let Some(event) = stream.recv().await {
            match event {
                StreamEvent::Fragment(text) => {
                    answer.push_str(&text);
                    if forwarding && sink.send(text).await.is_err() {
                        tracing::debug!("Stream receiver dropped, accumulating only");
                        forwarding = false;
                    }
                }
                StreamEvent::End => break,
                StreamEvent::Failed(e) => return Err(e),
            }
        }

        Ok(self.complete(question, options, answer, retrieved))
    }

    /// 세션 기록 (오래된 것부터)
    pub fn get_chat_history(&self, session_id: &str, limit: Option<usize>) -> Vec<Interaction> {
        self.history.recent(session_id, limit)
    }

    pub fn clear_history(&self, session_id: &str) -> bool {
        self.history.clear(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.history.session_count()
    }

    /// 컨텍스트 준비. 지식베이스가 필요한데 없으면 `None`
    async fn retrieve(
        &self,
        question: &str,
        options: &QueryOptions,
    ) -> RagResult<Option<RetrievedContext>> {
        if !options.use_context {
            return Ok(Some(RetrievedContext::empty()));
        }

        if !self.store.load().await {
            tracing::info!("Knowledge base unavailable, returning ingestion guidance");
            return Ok(None);
        }

        let (search_text, config) = match options.mode {
            QueryMode::General => (question.to_string(), self.retrieval),
            QueryMode::It => (self.preprocessor.expand(question), self.it_retrieval),
        };

        let query_embedding = self.embedder.embed(&search_text).await?;
        let matches = self
            .retriever
            .search(&query_embedding, config.top_k, config.threshold);

        tracing::debug!(
            "Retrieved {} chunks (top_k={}, threshold={})",
            matches.len(),
            config.top_k,
            config.threshold
        );

        Ok(Some(RetrievedContext {
            context: build_context(&matches),
            matches,
        }))
    }

    /// 기록 후 응답 구성
    fn complete(
        &self,
        question: &str,
        options: &QueryOptions,
        answer: String,
        retrieved: RetrievedContext,
    ) -> QueryResponse {
        let has_context = !retrieved.matches.is_empty();

        let mut context_sources: Vec<String> = Vec::new();
        for m in &retrieved.matches {
            if !context_sources.contains(&m.document_name) {
                context_sources.push(m.document_name.clone());
            }
        }

        self.history.record(
            &options.session_id,
            Interaction {
                timestamp: chrono::Utc::now(),
                query: question.to_string(),
                response: answer.clone(),
                context_sources,
                has_context,
            },
        );

        QueryResponse {
            answer,
            sources: retrieved.matches.iter().map(SourceCitation::from).collect(),
            has_context,
            needs_ingestion: false,
            session_id: options.session_id.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::generation::FragmentStream;
    use crate::knowledge::{
        ChunkRecord, DocumentRecord, KnowledgeBaseWriter, MetadataExtractor,
    };
    use crate::ollama::ServiceHealth;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// 항상 [1, 0]을 돌려주며 받은 텍스트를 기록
    #[derive(Default)]
    struct FakeEmbedder {
        calls: AtomicUsize,
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, text: &str) -> RagResult<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.lock().unwrap().push(text.to_string());
            Ok(vec![1.0, 0.0])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    #[derive(Default)]
    struct FakeGenerator {
        calls: AtomicUsize,
        contexts: Mutex<Vec<String>>,
        fragments: Vec<&'static str>,
        fail_stream: bool,
    }

    #[async_trait]
    impl GenerationProvider for FakeGenerator {
        async fn generate(&self, prompt: &str, context: &str, _max_tokens: usize) -> RagResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.contexts.lock().unwrap().push(context.to_string());
            Ok(format!("answer: {}", prompt))
        }

        async fn generate_stream(
            &self,
            _prompt: &str,
            context: &str,
            _max_tokens: usize,
        ) -> RagResult<FragmentStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.contexts.lock().unwrap().push(context.to_string());

            let (tx, rx) = mpsc::channel(16);
            for fragment in &self.fragments {
                tx.send(StreamEvent::Fragment(fragment.to_string())).await.unwrap();
            }
            if self.fail_stream {
                tx.send(StreamEvent::Failed(RagError::RequestFailed("stream reset".to_string())))
                    .await
                    .unwrap();
            } else {
                tx.send(StreamEvent::End).await.unwrap();
            }
            Ok(rx)
        }

        async fn health(&self) -> ServiceHealth {
            ServiceHealth::default()
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn chunk(doc: &str, index: usize, text: &str, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            id: format!("{}-{}", doc, index),
            text: text.to_string(),
            document_name: doc.to_string(),
            chunk_index: index,
            word_count: text.split_whitespace().count(),
            embedding,
            processed_at: Utc::now(),
        }
    }

    /// vpn.txt: [1,0] 청크, 유사도 0.07 청크, 직교 청크
    fn write_knowledge_base(dir: &TempDir) -> Settings {
        let settings = Settings::default().with_data_dir(dir.path());
        let chunks = vec![
            chunk("vpn.txt", 0, "Connect to the VPN with the corporate client.", vec![1.0, 0.0]),
            chunk("vpn.txt", 1, "Split tunnelling is disabled for contractors.", vec![0.07, 1.0]),
            chunk("vpn.txt", 2, "Printer queues are reset every night.", vec![0.0, 1.0]),
        ];
        let text: String = chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(" ");

        let mut writer = KnowledgeBaseWriter::create(&settings.knowledge_base_path()).unwrap();
        writer
            .write_document(&DocumentRecord {
                name: "vpn.txt".to_string(),
                path: "/docs/vpn.txt".to_string(),
                processed_at: Utc::now(),
                total_chunks: chunks.len(),
                metadata: MetadataExtractor::with_defaults().extract(&text, "vpn.txt"),
            })
            .unwrap();
        for c in &chunks {
            writer.write_chunk(c).unwrap();
        }
        writer.finish().unwrap();
        settings
    }

    fn orchestrator(
        settings: &Settings,
        embedder: Arc<FakeEmbedder>,
        generator: Arc<FakeGenerator>,
    ) -> QueryOrchestrator {
        let store = Arc::new(KnowledgeStore::from_settings(settings));
        QueryOrchestrator::new(settings, store, embedder, generator)
    }

    #[tokio::test]
    async fn test_empty_knowledge_base_makes_no_gateway_calls() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::default().with_data_dir(dir.path());
        let embedder = Arc::new(FakeEmbedder::default());
        let generator = Arc::new(FakeGenerator::default());
        let orch = orchestrator(&settings, embedder.clone(), generator.clone());

        let response = orch.query("How do I join the VPN?", &QueryOptions::default()).await.unwrap();
        assert!(response.needs_ingestion);
        assert_eq!(response.answer, NO_KNOWLEDGE_BASE_MESSAGE);

        let (tx, mut rx) = mpsc::channel(4);
        let streamed = orch
            .query_stream("How do I join the VPN?", &QueryOptions::default(), tx)
            .await
            .unwrap();
        assert!(streamed.needs_ingestion);
        assert_eq!(rx.recv().await.as_deref(), Some(NO_KNOWLEDGE_BASE_MESSAGE));

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert!(orch.get_chat_history(DEFAULT_SESSION, None).is_empty());
    }

    #[tokio::test]
    async fn test_query_builds_context_and_citations() {
        let dir = TempDir::new().unwrap();
        let settings = write_knowledge_base(&dir);
        let generator = Arc::new(FakeGenerator::default());
        let orch = orchestrator(&settings, Arc::new(FakeEmbedder::default()), generator.clone());

        let response = orch.query("How do I join the VPN?", &QueryOptions::default()).await.unwrap();

        assert!(response.has_context);
        assert!(!response.needs_ingestion);
        assert_eq!(response.answer, "answer: How do I join the VPN?");
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].document, "vpn.txt");
        assert_eq!(response.sources[0].chunk_index, 0);

        let contexts = generator.contexts.lock().unwrap();
        assert_eq!(
            contexts[0],
            "[Source: vpn.txt]\nConnect to the VPN with the corporate client."
        );

        let history = orch.get_chat_history(DEFAULT_SESSION, None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].context_sources, vec!["vpn.txt".to_string()]);
        assert!(history[0].has_context);
    }

    #[tokio::test]
    async fn test_it_mode_expands_and_widens_retrieval() {
        let dir = TempDir::new().unwrap();
        let settings = write_knowledge_base(&dir);
        let embedder = Arc::new(FakeEmbedder::default());
        let generator = Arc::new(FakeGenerator::default());
        let orch = orchestrator(&settings, embedder.clone(), generator.clone());

        let response = orch
            .query("Is vpn split tunnelling allowed?", &QueryOptions::default().it())
            .await
            .unwrap();

        // 0.07 유사도 청크는 IT 임계값(0.05)에서만 포함
        assert_eq!(response.sources.len(), 2);
        assert_eq!(response.sources[1].chunk_index, 1);
        assert_eq!(
            embedder.texts.lock().unwrap()[0],
            "Is Virtual Private Network split tunnelling allowed?"
        );
        assert!(generator.contexts.lock().unwrap()[0].contains(CONTEXT_DELIMITER));
    }

    #[tokio::test]
    async fn test_without_context_skips_retrieval() {
        let dir = TempDir::new().unwrap();
        let settings = write_knowledge_base(&dir);
        let embedder = Arc::new(FakeEmbedder::default());
        let orch = orchestrator(&settings, embedder.clone(), Arc::new(FakeGenerator::default()));

        let response = orch
            .query("hello", &QueryOptions::for_session("s1").without_context())
            .await
            .unwrap();

        assert!(!response.has_context);
        assert!(response.sources.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(!orch.get_chat_history("s1", None)[0].has_context);
    }

    #[tokio::test]
    async fn test_stream_forwards_fragments_in_order() {
        let dir = TempDir::new().unwrap();
        let settings = write_knowledge_base(&dir);
        let generator = Arc::new(FakeGenerator {
            fragments: vec!["Open", " the", " client", "."],
            ..Default::default()
        });
        let orch = orchestrator(&settings, Arc::new(FakeEmbedder::default()), generator);

        let (tx, mut rx) = mpsc::channel(16);
        let response = orch
            .query_stream("How do I join the VPN?", &QueryOptions::for_session("s1"), tx)
            .await
            .unwrap();

        let mut received = Vec::new();
        while let Some(fragment) = rx.recv().await {
            received.push(fragment);
        }
        assert_eq!(received, vec!["Open", " the", " client", "."]);
        assert_eq!(response.answer, "Open the client.");
        assert_eq!(orch.get_chat_history("s1", None)[0].response, "Open the client.");
    }

    #[tokio::test]
    async fn test_stream_failure_is_returned_without_history() {
        let dir = TempDir::new().unwrap();
        let settings = write_knowledge_base(&dir);
        let generator = Arc::new(FakeGenerator {
            fragments: vec!["partial"],
            fail_stream: true,
            ..Default::default()
        });
        let orch = orchestrator(&settings, Arc::new(FakeEmbedder::default()), generator);

        let (tx, _rx) = mpsc::channel(16);
        let err = orch
            .query_stream("vpn?", &QueryOptions::for_session("s1"), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::RequestFailed(_)));
        assert!(orch.get_chat_history("s1", None).is_empty());
    }

    #[tokio::test]
    async fn test_history_keeps_last_twenty() {
        let dir = TempDir::new().unwrap();
        let settings = write_knowledge_base(&dir);
        let orch = orchestrator(
            &settings,
            Arc::new(FakeEmbedder::default()),
            Arc::new(FakeGenerator::default()),
        );
        let options = QueryOptions::for_session("s1");

        for i in 0..21 {
            orch.query(&format!("question {}", i), &options).await.unwrap();
        }

        let history = orch.get_chat_history("s1", None);
        assert_eq!(history.len(), 20);
        assert_eq!(history[0].query, "question 1");
        assert_eq!(orch.get_chat_history("s1", Some(3)).len(), 3);
        assert!(orch.clear_history("s1"));
        assert_eq!(orch.session_count(), 0);
    }

    #[test]
    fn test_preprocessor_whole_word_case_insensitive() {
        let pre = QueryPreprocessor::new(&[
            ("DNS".to_string(), "Domain Name System".to_string()),
            ("LAN".to_string(), "Local Area Network".to_string()),
        ]);
        assert_eq!(
            pre.expand("dns fails on the lan"),
            "Domain Name System fails on the Local Area Network"
        );
        // 단어 일부는 바꾸지 않음
        assert_eq!(pre.expand("VLAN plan"), "VLAN plan");
    }

    #[test]
    fn test_preprocessor_does_not_reexpand_full_forms() {
        let pre = QueryPreprocessor::new(&[
            ("NAT".to_string(), "Network Address Translation".to_string()),
            ("PAT".to_string(), "Port Address Translation over NAT".to_string()),
        ]);
        assert_eq!(
            pre.expand("pat or nat?"),
            "Port Address Translation over NAT or Network Address Translation?"
        );
        assert_eq!(QueryPreprocessor::new(&[]).expand("dns"), "dns");
    }

    #[test]
    fn test_build_context_delimiter() {
        let matches = vec![
            SearchMatch {
                chunk_id: "a".to_string(),
                document_name: "a.txt".to_string(),
                chunk_index: 0,
                text: "first".to_string(),
                similarity: 0.9,
            },
            SearchMatch {
                chunk_id: "b".to_string(),
                document_name: "b.txt".to_string(),
                chunk_index: 3,
                text: "second".to_string(),
                similarity: 0.5,
            },
        ];
        assert_eq!(
            build_context(&matches),
            "[Source: a.txt]\nfirst\n\n---\n\n[Source: b.txt]\nsecond"
        );
        assert_eq!(build_context(&[]), "");
    }
}
