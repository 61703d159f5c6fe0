//! Uploaded documents and their per-page text.
//!
//! A [`Document`] only lives for the duration of an ingest; the chunker
//! turns its pages into chunks and the document is dropped.

use std::path::Path;

use crate::core::errors::RagError;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Text of one page plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Document {
    /// Source identifier, the uploaded filename.
    pub source: String,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn new(source: impl Into<String>, pages: Vec<Page>) -> Self {
        Self {
            source: source.into(),
            pages,
        }
    }

    /// Builds a single-page document from plain text.
    pub fn from_text(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            source,
            vec![Page {
                number: 1,
                text: text.into(),
            }],
        )
    }

    /// Extracts per-page text from uploaded bytes.
    ///
    /// PDFs are detected by magic bytes or extension; anything else must be
    /// UTF-8 text and becomes a single page.
    pub fn from_upload(filename: &str, bytes: &[u8]) -> Result<Self, RagError> {
        if bytes.is_empty() {
            return Err(RagError::Document(format!("{} is empty", filename)));
        }

        let document = if is_pdf(filename, bytes) {
            Self::new(filename, extract_pdf_pages(bytes)?)
        } else {
            let text = std::str::from_utf8(bytes).map_err(|_| {
                RagError::Document(format!(
                    "{} is neither a PDF nor UTF-8 text",
                    filename
                ))
            })?;
            Self::from_text(filename, text)
        };

        if document.pages.iter().all(|p| p.text.trim().is_empty()) {
            return Err(RagError::Document(format!(
                "no text could be extracted from {}",
                filename
            )));
        }

        Ok(document)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn total_chars(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }
}

fn is_pdf(filename: &str, bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
        || Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false)
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<Page>, RagError> {
    let pdf = lopdf::Document::load_mem(bytes)
        .map_err(|e| RagError::Document(format!("invalid PDF: {}", e)))?;

    let mut pages = Vec::new();
    for page_number in pdf.get_pages().keys().copied() {
        match pdf.extract_text(&[page_number]) {
            Ok(text) => pages.push(Page {
                number: page_number,
                text,
            }),
            Err(e) => {
                tracing::warn!(page = page_number, "Failed to extract page text: {}", e);
            }
        }
    }

    if pages.is_empty() {
        return Err(RagError::Document("PDF has no readable pages".to_string()));
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_becomes_one_page() {
        let doc = Document::from_upload("notes.txt", b"Rust is a systems language.").unwrap();
        assert_eq!(doc.source, "notes.txt");
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.pages[0].number, 1);
        assert_eq!(doc.total_chars(), 27);
    }

    #[test]
    fn empty_upload_is_rejected() {
        let err = Document::from_upload("empty.txt", b"").unwrap_err();
        assert_eq!(err.kind(), "document_error");
    }

    #[test]
    fn whitespace_only_upload_is_rejected() {
        assert!(Document::from_upload("blank.txt", b"  \n\t ").is_err());
    }

    #[test]
    fn binary_garbage_is_rejected() {
        let err = Document::from_upload("blob.bin", &[0xff, 0xfe, 0x00, 0x81]).unwrap_err();
        assert!(err.to_string().contains("neither a PDF nor UTF-8"));
    }

    #[test]
    fn malformed_pdf_is_a_document_error() {
        let err = Document::from_upload("resume.pdf", b"%PDF-1.7 truncated").unwrap_err();
        assert_eq!(err.kind(), "document_error");
    }
}
