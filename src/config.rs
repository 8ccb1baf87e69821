//! 설정 모듈
//!
//! 환경변수에서 읽는 런타임 설정입니다. 모든 값은 기본값을 가지므로
//! 환경변수 없이도 동작합니다.
//!
//! | 환경변수 | 기본값 |
//! |---|---|
//! | `NETDOC_DATA_DIR` | `<data_local_dir>/.netdoc-rag` |
//! | `OLLAMA_URL` | `http://localhost:11434` |
//! | `NETDOC_EMBED_MODEL` | `nomic-embed-text` |
//! | `NETDOC_CHAT_MODEL` | `llama3.2` |
//! | `NETDOC_CHUNK_SIZE` | `1000` |
//! | `NETDOC_CHUNK_OVERLAP` | `200` |
//! | `NETDOC_MAX_TOKENS` | `1024` |

use std::path::PathBuf;
use std::str::FromStr;

use crate::knowledge::ChunkConfig;

/// 지식베이스 레코드 로그 파일 이름
pub const KNOWLEDGE_BASE_FILE: &str = "knowledge_base.jsonl";

/// 인제스천 요약 파일 이름
pub const SUMMARY_FILE: &str = "ingestion_summary.json";

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_CHAT_MODEL: &str = "llama3.2";
/// nomic-embed-text 출력 차원
pub const DEFAULT_EMBED_DIMENSION: usize = 768;
pub const DEFAULT_MAX_TOKENS: usize = 1024;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.netdoc-rag/)
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("NETDOC_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".netdoc-rag")
}

// ============================================================================
// Retrieval Configuration
// ============================================================================

/// 검색 파라미터 (top-K, 최소 유사도)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::general()
    }
}

impl RetrievalConfig {
    /// 일반 질의
    pub fn general() -> Self {
        Self {
            top_k: 5,
            threshold: 0.1,
        }
    }

    /// IT 질의 (더 넓게 검색)
    pub fn it() -> Self {
        Self {
            top_k: 7,
            threshold: 0.05,
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// 전체 런타임 설정
#[derive(Debug, Clone)]
pub struct Settings {
    /// 지식베이스/요약 파일 저장 위치
    pub data_dir: PathBuf,
    /// Ollama 서버 주소
    pub ollama_url: String,
    /// 임베딩 모델 이름
    pub embed_model: String,
    /// 임베딩 차원 (빈 텍스트용 제로 벡터 크기)
    pub embed_dimension: usize,
    /// 답변 생성 모델 이름
    pub chat_model: String,
    /// 생성 최대 토큰 수
    pub max_tokens: usize,
    pub chunk: ChunkConfig,
    pub retrieval: RetrievalConfig,
    pub it_retrieval: RetrievalConfig,
    /// 키워드 추출용 도메인 용어 목록
    pub keyword_vocabulary: Vec<String>,
    /// IT 질의 전처리용 약어 사전 (약어, 전체 표기)
    pub abbreviations: Vec<(String, String)>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            embed_dimension: DEFAULT_EMBED_DIMENSION,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            chunk: ChunkConfig::default(),
            retrieval: RetrievalConfig::general(),
            it_retrieval: RetrievalConfig::it(),
            keyword_vocabulary: default_keyword_vocabulary(),
            abbreviations: default_abbreviations(),
        }
    }
}

impl Settings {
    /// 환경변수를 반영한 설정 로드
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Some(url) = env_string("OLLAMA_URL") {
            settings.ollama_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = env_string("NETDOC_EMBED_MODEL") {
            settings.embed_model = model;
        }
        if let Some(model) = env_string("NETDOC_CHAT_MODEL") {
            settings.chat_model = model;
        }
        if let Some(size) = env_parse::<usize>("NETDOC_CHUNK_SIZE") {
            settings.chunk.chunk_size = size;
        }
        if let Some(overlap) = env_parse::<usize>("NETDOC_CHUNK_OVERLAP") {
            settings.chunk.chunk_overlap = overlap;
        }
        if let Some(tokens) = env_parse::<usize>("NETDOC_MAX_TOKENS") {
            settings.max_tokens = tokens;
        }

        tracing::debug!("Loaded settings: {:?}", settings);
        settings
    }

    /// 지정된 데이터 디렉토리를 사용 (테스트/CLI 옵션용)
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// 지식베이스 로그 경로
    pub fn knowledge_base_path(&self) -> PathBuf {
        self.data_dir.join(KNOWLEDGE_BASE_FILE)
    }

    /// 인제스천 요약 파일 경로
    pub fn summary_path(&self) -> PathBuf {
        self.data_dir.join(SUMMARY_FILE)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

// ============================================================================
// Domain Vocabulary
// ============================================================================

/// 기본 키워드 어휘 (네트워크/IT 용어)
pub fn default_keyword_vocabulary() -> Vec<String> {
    [
        "network", "server", "router", "switch", "firewall", "vpn", "dns", "dhcp", "ip",
        "tcp", "udp", "http", "https", "ssl", "tls", "ssh", "vlan", "subnet", "gateway",
        "bandwidth", "latency", "protocol", "ethernet", "wireless", "wifi", "lan", "wan",
        "backup", "security", "authentication", "password", "database", "cloud",
        "virtualization", "storage", "monitoring", "cisco", "windows", "linux", "active directory",
        "ldap", "snmp", "ntp", "smtp", "ftp", "port", "proxy", "load balancer", "nat", "qos",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// 기본 약어 사전
pub fn default_abbreviations() -> Vec<(String, String)> {
    [
        ("DNS", "Domain Name System"),
        ("DHCP", "Dynamic Host Configuration Protocol"),
        ("VPN", "Virtual Private Network"),
        ("VLAN", "Virtual Local Area Network"),
        ("LAN", "Local Area Network"),
        ("WAN", "Wide Area Network"),
        ("NAT", "Network Address Translation"),
        ("QoS", "Quality of Service"),
        ("SNMP", "Simple Network Management Protocol"),
        ("NTP", "Network Time Protocol"),
        ("SMTP", "Simple Mail Transfer Protocol"),
        ("FTP", "File Transfer Protocol"),
        ("SSH", "Secure Shell"),
        ("TCP", "Transmission Control Protocol"),
        ("UDP", "User Datagram Protocol"),
        ("LDAP", "Lightweight Directory Access Protocol"),
    ]
    .iter()
    .map(|(short, full)| (short.to_string(), full.to_string()))
    .collect()
}

// ============================================================================
// Tests
// ============================================================================
