//! DOCX 텍스트 추출 모듈
//!
//! DOCX 는 ZIP 컨테이너이며 본문은 `word/document.xml` 에 있습니다.
//! `<w:t>` 텍스트 런을 모으고 `</w:p>` 마다 줄을 바꿉니다.

use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;

const DOCUMENT_XML: &str = "word/document.xml";

/// DOCX에서 텍스트 추출
pub fn extract_text_from_docx(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open DOCX: {:?}", path))?;
    let mut archive =
        zip::ZipArchive::new(file).with_context(|| format!("Not a valid DOCX archive: {:?}", path))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_XML)
        .with_context(|| format!("{} missing in {:?}", DOCUMENT_XML, path))?
        .read_to_string(&mut xml)
        .context("Failed to read document.xml")?;

    Ok(text_from_document_xml(&xml))
}

/// document.xml 에서 본문 텍스트 추출
pub fn text_from_document_xml(xml: &str) -> String {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    let re = TOKEN_RE.get_or_init(|| {
        Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|</w:p>|<w:tab/>|<w:br/>")
            .expect("valid docx token regex")
    });

    let mut text = String::new();
    for caps in re.captures_iter(xml) {
        match caps.get(1) {
            Some(run) => text.push_str(&unescape_xml(run.as_str())),
            None => match caps.get(0).map(|m| m.as_str()) {
                Some("<w:tab/>") => text.push('\t'),
                _ => text.push('\n'),
            },
        }
    }

    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_XML: &str = r#"<w:document><w:body>
<w:p><w:r><w:t>VPN Access Policy</w:t></w:r></w:p>
<w:p><w:r><w:t xml:space="preserve">Use MFA </w:t></w:r><w:r><w:t>&amp; rotate tokens.</w:t></w:r></w:p>
<w:p><w:r><w:t>Port</w:t></w:r><w:r><w:tab/></w:r><w:r><w:t>443</w:t></w:r></w:p>
</w:body></w:document>"#;

    #[test]
    fn test_text_from_document_xml() {
        assert_eq!(
            text_from_document_xml(SAMPLE_XML),
            "VPN Access Policy\nUse MFA & rotate tokens.\nPort\t443"
        );
    }

    #[test]
    fn test_extract_from_archive() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("policy.docx");

        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file(DOCUMENT_XML, zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(SAMPLE_XML.as_bytes()).unwrap();
        zip.finish().unwrap();

        let text = extract_text_from_docx(&path).unwrap();
        assert!(text.starts_with("VPN Access Policy"));
    }

    #[test]
    fn test_invalid_archive() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fake.docx");
        std::fs::write(&path, b"plain text").unwrap();
        assert!(extract_text_from_docx(&path).is_err());
    }
}
