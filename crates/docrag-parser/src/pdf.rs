//! PDF document parser using pdf-extract
//!
//! Extracts text content from PDF files page by page. Pages without
//! extractable text (scanned images) are skipped and the remaining pages
//! are joined with newlines.

use std::path::Path;

use crate::{DocumentParser, FileType, ParsedDocument, ParserError, Result};

/// Page separator emitted by pdf-extract
const FORM_FEED: char = '\x0C';

/// PDF document parser
pub struct PdfParser {
    /// Whether to keep pages whose text is only whitespace
    pub keep_blank_pages: bool,
}

impl PdfParser {
    /// Create a new PDF parser with default settings
    pub fn new() -> Self {
        Self {
            keep_blank_pages: false,
        }
    }

    /// Keep or drop pages without text
    pub fn with_blank_pages(mut self, keep: bool) -> Self {
        self.keep_blank_pages = keep;
        self
    }

    /// Extract text from a PDF file
    fn extract_text(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ParserError::PdfError(e.to_string()))
    }

    /// Join page texts, dropping pages without text unless configured otherwise
    fn join_pages(&self, raw: &str) -> (String, u32) {
        let pages: Vec<&str> = raw.split(FORM_FEED).collect();
        let page_count = pages.len() as u32;

        let text = pages
            .into_iter()
            .filter(|page| self.keep_blank_pages || !page.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        (text, page_count)
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for PdfParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let raw = self.extract_text(path)?;
        let (text, page_count) = self.join_pages(&raw);

        let mut doc =
            ParsedDocument::new(path.display().to_string(), FileType::Pdf).with_content(text);
        doc.page_count = Some(page_count);

        Ok(doc)
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Pdf]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_parser_creation() {
        let parser = PdfParser::new();
        assert!(!parser.keep_blank_pages);

        let parser = parser.with_blank_pages(true);
        assert!(parser.keep_blank_pages);
    }

    #[test]
    fn test_join_pages_skips_blank_pages() {
        let parser = PdfParser::new();
        let (text, pages) = parser.join_pages("Page one\x0C  \n\x0CPage three");

        assert_eq!(pages, 3);
        assert_eq!(text, "Page one\nPage three");
    }

    #[test]
    fn test_join_pages_single_page() {
        let parser = PdfParser::new();
        let (text, pages) = parser.join_pages("Only page");

        assert_eq!(pages, 1);
        assert_eq!(text, "Only page");
    }

    #[test]
    fn test_missing_file() {
        let parser = PdfParser::new();
        let err = parser.parse(Path::new("/no/such/file.pdf")).unwrap_err();
        assert!(matches!(err, ParserError::IoError { .. }));
    }

    #[test]
    fn test_supported_types() {
        let parser = PdfParser::new();
        assert!(parser.can_parse(FileType::Pdf));
        assert!(!parser.can_parse(FileType::PlainText));
    }
}
