//! docrag Parser - Document loading and chunking
//!
//! Supports loading of:
//! - PDF documents
//! - Markdown files
//! - Plain text files
//!
//! Each parser implements the `DocumentParser` trait and produces a
//! `ParsedDocument`, which converts into the `Document` record consumed by
//! the [`chunker`].

pub mod chunker;
pub mod pdf;

pub use chunker::{chunk, Chunker};
pub use pdf::PdfParser;

use docrag_core::Document;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during document loading
#[derive(Error, Debug)]
pub enum ParserError {
    /// File format is not supported
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// IO error while reading the file
    #[error("IO error reading file: {path}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// PDF parsing error
    #[error("PDF parsing error: {0}")]
    PdfError(String),

    /// The document directory does not exist
    #[error("Directory {0} does not exist")]
    DirectoryNotFound(String),

    /// The document directory holds no supported files
    #[error("No supported documents found in directory {0}")]
    EmptyDirectory(String),
}

pub type Result<T> = std::result::Result<T, ParserError>;

// ============================================================================
// Parsed Document Types
// ============================================================================

/// A parsed document with extracted content
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Original file path
    pub file_path: String,

    /// Detected file type
    pub file_type: FileType,

    /// Extracted text content
    pub content: String,

    /// Number of pages (if the format has pages)
    pub page_count: Option<u32>,
}

impl ParsedDocument {
    /// Create a new parsed document
    pub fn new(file_path: impl Into<String>, file_type: FileType) -> Self {
        Self {
            file_path: file_path.into(),
            file_type,
            content: String::new(),
            page_count: None,
        }
    }

    /// Set content
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// File name component of the path, used as the document ID
    pub fn file_name(&self) -> &str {
        Path::new(&self.file_path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(self.file_path.as_str())
    }

    /// Get total character count
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }

    /// Convert into the record the chunker consumes
    pub fn into_document(self) -> Document {
        let doc_id = self.file_name().to_string();
        Document::new(doc_id, self.content)
    }
}

/// Supported file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Markdown,
    PlainText,
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "md" | "markdown" => Self::Markdown,
            "txt" => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Markdown => write!(f, "markdown"),
            Self::PlainText => write!(f, "text"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// Parser Trait
// ============================================================================

/// Trait for document parsers
pub trait DocumentParser: Send + Sync {
    /// Parse a document from a file path
    fn parse(&self, path: &Path) -> Result<ParsedDocument>;

    /// Get supported file types
    fn supported_types(&self) -> &[FileType];

    /// Check if this parser can handle a file type
    fn can_parse(&self, file_type: FileType) -> bool {
        self.supported_types().contains(&file_type)
    }
}

// ============================================================================
// Parser Registry
// ============================================================================

/// Registry of available parsers
pub struct ParserRegistry {
    parsers: Vec<Box<dyn DocumentParser>>,
}

impl ParserRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Registry with the plain-text and PDF parsers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PlainTextParser);
        registry.register(PdfParser::new());
        registry
    }

    /// Register a parser
    pub fn register<P: DocumentParser + 'static>(&mut self, parser: P) {
        self.parsers.push(Box::new(parser));
    }

    /// Find a parser for a file type
    pub fn find_parser(&self, file_type: FileType) -> Option<&dyn DocumentParser> {
        self.parsers
            .iter()
            .find(|p| p.can_parse(file_type))
            .map(|p| p.as_ref())
    }

    /// Parse a file using the appropriate parser
    pub fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let file_type = FileType::from_path(path);

        if file_type == FileType::Unknown {
            return Err(ParserError::UnsupportedFormat(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("none")
                    .to_string(),
            ));
        }

        let parser = self
            .find_parser(file_type)
            .ok_or_else(|| ParserError::UnsupportedFormat(file_type.to_string()))?;

        parser.parse(path)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// Directory Loader
// ============================================================================

/// Read every supported file directly inside `dir` into a `Document`
///
/// The directory is not searched recursively. Files are visited in file-name
/// order so repeated builds see the same document sequence, and files whose
/// type no registered parser handles are skipped.
pub fn load_documents(dir: &Path, registry: &ParserRegistry) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        return Err(ParserError::DirectoryNotFound(dir.display().to_string()));
    }

    let entries = std::fs::read_dir(dir).map_err(|e| ParserError::IoError {
        path: dir.display().to_string(),
        source: e,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ParserError::IoError {
            path: dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_file() && registry.find_parser(FileType::from_path(&path)).is_some() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in &paths {
        let parsed = registry.parse(path)?;
        tracing::debug!(
            "Loaded {} ({}, {} chars)",
            parsed.file_path,
            parsed.file_type,
            parsed.char_count()
        );
        documents.push(parsed.into_document());
    }

    if documents.is_empty() {
        return Err(ParserError::EmptyDirectory(dir.display().to_string()));
    }

    tracing::info!("Loaded {} documents from {}", documents.len(), dir.display());
    Ok(documents)
}

// ============================================================================
// Plain Text Parser
// ============================================================================

/// Plain text parser
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let content = std::fs::read_to_string(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        let file_type = FileType::from_path(path);
        Ok(ParsedDocument::new(path.display().to_string(), file_type).with_content(content))
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::PlainText, FileType::Markdown]
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_extension("pdf"), FileType::Pdf);
        assert_eq!(FileType::from_extension("PDF"), FileType::Pdf);
        assert_eq!(FileType::from_extension("md"), FileType::Markdown);
        assert_eq!(FileType::from_extension("txt"), FileType::PlainText);
        assert_eq!(FileType::from_extension("docx"), FileType::Unknown);
    }

    #[test]
    fn test_into_document_uses_file_name() {
        let parsed = ParsedDocument::new("/data/pdf/report.txt", FileType::PlainText)
            .with_content("body");
        let doc = parsed.into_document();
        assert_eq!(doc.doc_id, "report.txt");
        assert_eq!(doc.text, "body");
    }

    #[test]
    fn test_load_documents_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "second").unwrap();
        std::fs::write(dir.path().join("a.md"), "# first").unwrap();
        std::fs::write(dir.path().join("ignored.bin"), [0u8, 1, 2]).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let docs = load_documents(dir.path(), &ParserRegistry::with_defaults()).unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["a.md", "b.txt"]);
        assert_eq!(docs[0].text, "# first");
    }

    #[test]
    fn test_load_documents_missing_dir() {
        let err = load_documents(
            Path::new("/no/such/docrag/dir"),
            &ParserRegistry::with_defaults(),
        )
        .unwrap_err();
        assert!(matches!(err, ParserError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_load_documents_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.bin"), "x").unwrap();

        let err = load_documents(dir.path(), &ParserRegistry::with_defaults()).unwrap_err();
        assert!(matches!(err, ParserError::EmptyDirectory(_)));
    }

    #[test]
    fn test_registry_rejects_unknown() {
        let registry = ParserRegistry::with_defaults();
        let err = registry.parse(Path::new("file.xyz")).unwrap_err();
        assert!(matches!(err, ParserError::UnsupportedFormat(_)));
    }
}
