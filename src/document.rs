use crate::error::{RagError, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text_by_pages;
use std::fs;
use std::path::Path;

/// Separator placed between pages when a document is flattened to one text.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Represents a loaded document: its label and the text of every non-empty page
#[derive(Debug, Clone)]
pub struct Document {
    /// The document's file name, used as the source label of its chunks
    pub label: String,
    /// Non-empty page texts, in page order
    pub pages: Vec<String>,
    /// The document's MIME type
    pub mime_type: String,
}

impl Document {
    /// Create a new document from a file path
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let path = file_path.as_ref();
        let label = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| document_error(path, "invalid file name"))?;

        // Detect MIME type
        let mime = from_path(path).first_or_octet_stream();
        let mime_type = mime.to_string();
        debug!("Detected MIME type: {}", mime_type);

        let pages = read_document_pages(path, &mime_type)?;

        Ok(Document::from_pages(label, pages, mime_type))
    }

    /// Build a document from raw page texts, skipping pages with no text
    pub fn from_pages<I, S>(label: impl Into<String>, pages: I, mime_type: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let label = label.into();
        let mut skipped = 0;
        let pages = pages
            .into_iter()
            .filter_map(|page| {
                let cleaned = normalize_whitespace(page.as_ref());
                if cleaned.is_empty() {
                    skipped += 1;
                    None
                } else {
                    Some(cleaned)
                }
            })
            .collect::<Vec<_>>();

        if skipped > 0 {
            debug!("Skipped {} empty page(s) in {}", skipped, label);
        }

        Document {
            label,
            pages,
            mime_type: mime_type.into(),
        }
    }

    /// The full text of the document, pages separated by a blank line
    pub fn text(&self) -> String {
        self.pages.join(PAGE_SEPARATOR)
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Read the page texts of a document based on its MIME type
pub fn read_document_pages<P: AsRef<Path>>(file_path: P, mime_type: &str) -> Result<Vec<String>> {
    let path = file_path.as_ref();

    match mime_type {
        mime if mime.starts_with("application/pdf") => {
            info!("Processing PDF document: {}", path.display());
            let pages = extract_text_by_pages(path).map_err(|e| document_error(path, e))?;

            if pages.iter().all(|page| page.trim().is_empty()) {
                warn!("Extracted PDF content is empty or contains only whitespace");
            }

            Ok(pages)
        }

        mime if mime.starts_with("text/") => {
            info!("Processing text document: {}", path.display());
            let content = fs::read_to_string(path).map_err(|e| document_error(path, e))?;
            Ok(vec![content])
        }

        _ => Err(document_error(
            path,
            format!(
                "unsupported document format: {}. Only text and PDF files are supported",
                mime_type
            ),
        )),
    }
}

fn document_error(path: &Path, message: impl ToString) -> RagError {
    RagError::Document {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

/// Normalize whitespace in text (collapse runs of spaces, cap blank lines at one)
fn normalize_whitespace(text: &str) -> String {
    let result = text.replace('\r', "");

    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
        } else {
            if newline_count > 0 {
                if newline_count >= 2 {
                    normalized.push_str("\n\n");
                } else {
                    normalized.push('\n');
                }
                newline_count = 0;
                prev_char = '\n';
            }

            if !(c == ' ' && (prev_char == ' ' || prev_char == '\n')) {
                normalized.push(c);
            }

            prev_char = c;
        }
    }

    normalized.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_normalize_whitespace() {
        let text = "This  has   multiple    spaces.\n\n\nAnd multiple newlines.\r\nAnd Windows line endings.";
        let expected =
            "This has multiple spaces.\n\nAnd multiple newlines.\nAnd Windows line endings.";
        assert_eq!(normalize_whitespace(text), expected);
    }

    #[test]
    fn test_normalize_whitespace_drops_indent_after_newline() {
        assert_eq!(normalize_whitespace("Header\n   body  text\n\n"), "Header\nbody text");
    }

    #[test]
    fn test_from_pages_skips_empty_pages() {
        let doc = Document::from_pages(
            "manual.pdf",
            ["First page text.", "   \n ", "Third page text."],
            "application/pdf",
        );
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.text(), "First page text.\n\nThird page text.");
        assert_eq!(doc.label, "manual.pdf");
    }

    #[test]
    fn test_from_file_reads_text_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "Refunds are processed  within five days.").unwrap();

        let doc = Document::from_file(&path).unwrap();
        assert_eq!(doc.label, "notes.txt");
        assert!(doc.mime_type.starts_with("text/"));
        assert_eq!(doc.pages, vec!["Refunds are processed within five days."]);
    }

    #[test]
    fn test_from_file_rejects_unsupported_formats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.zip");
        fs::write(&path, b"PK").unwrap();

        let err = Document::from_file(&path).unwrap_err();
        assert!(matches!(err, RagError::Document { .. }));
    }
}
