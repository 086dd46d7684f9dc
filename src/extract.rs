//! Text extraction from stored document files.
//!
//! Dispatches on file extension: plain text and Markdown are read
//! directly, PDFs go through `pdf-extract`, and `.docx` archives are
//! unpacked with `zip` and their `w:t` runs pulled out of
//! `word/document.xml` with `quick-xml`. Image formats are recognized but
//! rejected — OCR is not part of this pipeline — so ingestion can skip
//! them with a clear error instead of indexing garbage.

use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// File extensions the extractor understands.
pub fn is_supported(path: &Path) -> bool {
    matches!(
        extension(path).as_deref(),
        Some("txt") | Some("md") | Some("pdf") | Some("docx")
    )
}

/// Extract plain text from the file at `path`.
pub fn extract_text(path: &Path) -> Result<String> {
    match extension(path).as_deref() {
        Some("txt") | Some("md") => std::fs::read_to_string(path).map_err(|e| Error::Extraction {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
        Some("pdf") => extract_pdf(path),
        Some("docx") => extract_docx(path),
        Some("png") | Some("jpg") | Some("jpeg") => Err(Error::Extraction {
            path: path.to_path_buf(),
            reason: "image files require OCR, which is not supported".to_string(),
        }),
        other => Err(Error::Extraction {
            path: path.to_path_buf(),
            reason: format!(
                "unsupported file type: {}",
                other.unwrap_or("(no extension)")
            ),
        }),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}

fn extract_pdf(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| Error::Extraction {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    pdf_extract::extract_text_from_mem(&bytes).map_err(|e| Error::Extraction {
        path: path.to_path_buf(),
        reason: format!("PDF extraction failed: {}", e),
    })
}

fn extract_docx(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| Error::Extraction {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let ooxml = |reason: String| Error::Extraction {
        path: path.to_path_buf(),
        reason,
    };

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.as_slice()))
        .map_err(|e| ooxml(e.to_string()))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| ooxml("word/document.xml not found".to_string()))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| ooxml(e.to_string()))?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(ooxml("word/document.xml exceeds size limit".to_string()));
        }
    }

    text_runs(&doc_xml).map_err(|reason| ooxml(reason))
}

/// Collect the contents of every `<w:t>` element, paragraph-separated.
fn text_runs(xml: &[u8]) -> std::result::Result<String, String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_run = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text_run => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"t" => in_text_run = false,
                    // Paragraph boundaries become newlines so the chunker
                    // can use them as natural breaks.
                    b"p" => out.push('\n'),
                    _ => {}
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn supported_extensions() {
        assert!(is_supported(&PathBuf::from("notes.txt")));
        assert!(is_supported(&PathBuf::from("README.md")));
        assert!(is_supported(&PathBuf::from("report.PDF")));
        assert!(is_supported(&PathBuf::from("contract.docx")));
        assert!(!is_supported(&PathBuf::from("photo.jpg")));
        assert!(!is_supported(&PathBuf::from("archive.zip")));
    }

    #[test]
    fn plain_text_roundtrips() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "line one\nline two").unwrap();
        assert_eq!(extract_text(&path).unwrap(), "line one\nline two");
    }

    #[test]
    fn image_is_rejected_with_extraction_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, [0u8; 8]).unwrap();
        let err = extract_text(&path).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
        assert!(err.to_string().contains("OCR"));
    }

    #[test]
    fn invalid_pdf_is_an_extraction_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, "not a pdf").unwrap();
        assert!(matches!(
            extract_text(&path).unwrap_err(),
            Error::Extraction { .. }
        ));
    }

    #[test]
    fn invalid_docx_is_an_extraction_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, "not a zip").unwrap();
        assert!(matches!(
            extract_text(&path).unwrap_err(),
            Error::Extraction { .. }
        ));
    }

    #[test]
    fn docx_text_runs_are_joined_with_paragraph_breaks() {
        let xml = br#"<w:document xmlns:w="ns"><w:body>
            <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t> world</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second paragraph</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let text = text_runs(xml).unwrap();
        assert!(text.contains("Hello world"));
        assert!(text.contains("\nSecond paragraph") || text.contains("Second paragraph"));
    }
}
