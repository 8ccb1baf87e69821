//! 파일 수집 모듈
//!
//! 인제스천 대상 문서(txt, md, pdf, docx)를 경로에서 찾습니다.
//! 폴더는 `ignore` 워커로 재귀 탐색하며 .gitignore 를 따릅니다.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ignore::WalkBuilder;

/// 기본 최대 파일 크기 (10MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 문서 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// txt, md
    Text,
    Pdf,
    Docx,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" | "md" | "markdown" => Some(FileType::Text),
            "pdf" => Some(FileType::Pdf),
            "docx" => Some(FileType::Docx),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// 진행 표시용 라벨
    pub fn label(&self) -> &'static str {
        match self {
            FileType::Text => "TXT",
            FileType::Pdf => "PDF",
            FileType::Docx => "DOC",
        }
    }
}

/// 인제스천 대상 파일
#[derive(Debug, Clone)]
pub struct CollectedFile {
    pub path: PathBuf,
    /// 파일 이름 (문서 이름으로 사용)
    pub name: String,
    pub file_type: FileType,
    pub size: u64,
}

// ============================================================================
// Collector
// ============================================================================

/// 수집 옵션
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore / .ignore 규칙 적용
    pub respect_ignore_files: bool,
    /// 숨김 파일/폴더 포함
    pub include_hidden: bool,
    /// 이보다 큰 파일은 건너뜀 (0이면 제한 없음)
    pub max_file_size: u64,
    pub skip_pdfs: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_ignore_files: true,
            include_hidden: false,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            skip_pdfs: false,
        }
    }
}

/// 문서 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 파일 하나 또는 폴더 전체 수집
    ///
    /// 결과는 경로 순으로 정렬되어 실행마다 같은 순서로 처리됩니다.
    pub fn collect(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        let root = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let mut files = if root.is_file() {
            self.inspect(root.clone())?.into_iter().collect()
        } else if root.is_dir() {
            self.walk(&root)
        } else {
            bail!("Path not found: {:?}", root);
        };

        files.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::info!("Collected {} files from {:?}", files.len(), root);
        Ok(files)
    }

    fn walk(&self, root: &Path) -> Vec<CollectedFile> {
        let ignore_files = self.config.respect_ignore_files;
        let walker = WalkBuilder::new(root)
            .hidden(!self.config.include_hidden)
            .ignore(ignore_files)
            .git_ignore(ignore_files)
            .git_global(ignore_files)
            .git_exclude(ignore_files)
            .build();

        walker
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(|entry| match self.inspect(entry.into_path()) {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!("{:#}", e);
                    None
                }
            })
            .collect()
    }

    /// 지원 형식이고 필터를 통과하면 `Some`
    fn inspect(&self, path: PathBuf) -> Result<Option<CollectedFile>> {
        let Some(file_type) = FileType::from_path(&path) else {
            return Ok(None);
        };
        if self.config.skip_pdfs && file_type == FileType::Pdf {
            return Ok(None);
        }

        let size = std::fs::metadata(&path)
            .with_context(|| format!("Failed to read metadata: {:?}", path))?
            .len();
        if self.config.max_file_size > 0 && size > self.config.max_file_size {
            tracing::debug!("Skipping large file: {:?} ({} bytes)", path, size);
            return Ok(None);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Some(CollectedFile {
            path,
            name,
            file_type,
            size,
        }))
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// 형식별 파일 수와 전체 크기
#[derive(Debug, Default)]
pub struct CollectionStats {
    pub total_files: usize,
    pub text_files: usize,
    pub pdf_files: usize,
    pub docx_files: usize,
    pub total_size: u64,
}

impl CollectionStats {
    pub fn from_files(files: &[CollectedFile]) -> Self {
        files.iter().fold(Self::default(), |mut stats, file| {
            stats.total_files += 1;
            stats.total_size += file.size;
            match file.file_type {
                FileType::Text => stats.text_files += 1,
                FileType::Pdf => stats.pdf_files += 1,
                FileType::Docx => stats.docx_files += 1,
            }
            stats
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn docs_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "dns").unwrap();
        std::fs::write(dir.path().join("a.md"), "vpn").unwrap();
        std::fs::write(dir.path().join("logo.png"), [0u8; 4]).unwrap();
        std::fs::write(dir.path().join(".draft.md"), "wip").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("c.pdf"), "%PDF").unwrap();
        dir
    }

    fn names(files: &[CollectedFile]) -> Vec<&str> {
        files.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(FileType::from_extension("md"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("TXT"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("docx"), Some(FileType::Docx));
        assert_eq!(FileType::from_extension("png"), None);
    }

    #[test]
    fn test_collect_directory_filters_and_sorts() {
        let dir = docs_dir();
        let files = FileCollector::with_defaults().collect(dir.path()).unwrap();
        assert_eq!(names(&files), vec!["a.md", "b.txt", "c.pdf"]);

        let stats = CollectionStats::from_files(&files);
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.text_files, 2);
        assert_eq!(stats.pdf_files, 1);
        assert_eq!(stats.total_size, 10);
    }

    #[test]
    fn test_collector_options() {
        let dir = docs_dir();

        let skip_pdfs = FileCollector::new(CollectorConfig {
            skip_pdfs: true,
            ..Default::default()
        });
        assert_eq!(names(&skip_pdfs.collect(dir.path()).unwrap()), vec!["a.md", "b.txt"]);

        let hidden = FileCollector::new(CollectorConfig {
            include_hidden: true,
            ..Default::default()
        });
        assert_eq!(
            names(&hidden.collect(dir.path()).unwrap()),
            vec![".draft.md", "a.md", "b.txt", "c.pdf"]
        );

        let small = FileCollector::new(CollectorConfig {
            max_file_size: 3,
            ..Default::default()
        });
        assert_eq!(names(&small.collect(dir.path()).unwrap()), vec!["a.md", "b.txt"]);
    }

    #[test]
    fn test_ignore_files_respected() {
        let dir = docs_dir();
        std::fs::write(dir.path().join(".ignore"), "sub/\n").unwrap();

        let files = FileCollector::with_defaults().collect(dir.path()).unwrap();
        assert_eq!(names(&files), vec!["a.md", "b.txt"]);

        let all = FileCollector::new(CollectorConfig {
            respect_ignore_files: false,
            ..Default::default()
        });
        assert_eq!(names(&all.collect(dir.path()).unwrap()), vec!["a.md", "b.txt", "c.pdf"]);
    }

    #[test]
    fn test_collect_single_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runbook.txt");
        std::fs::write(&path, "restart the switch").unwrap();

        let files = FileCollector::with_defaults().collect(&path).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "runbook.txt");
        assert_eq!(files[0].file_type, FileType::Text);

        assert!(FileCollector::with_defaults()
            .collect(&dir.path().join("missing"))
            .is_err());
    }
}
