//! Recursive separator-priority chunking
//!
//! A span longer than `max_chars` is split on the coarsest separator that
//! occurs in it (paragraph, line, sentence end, space), and every resulting
//! piece that is still too long is split again with the finer separators
//! only. Runs with no separator at all are hard-cut at `max_chars`. The
//! minimal pieces are then merged greedily back into fragments of at most
//! `max_chars` characters, and each fragment after the first is prefixed
//! with the tail of the one before it.
//!
//! All lengths are counted in `char`s. No input character is dropped:
//! concatenating [`Chunk::fresh_text`] over a document's chunks gives back
//! the original text.

use docrag_core::{Chunk, ChunkingConfig, Document, RagError, Result};

/// Separators in priority order, coarsest first
const SEPARATORS: [Separator; 5] = [
    Separator::Paragraph,
    Separator::Line,
    Separator::Sentence,
    Separator::Word,
    Separator::Char,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    /// `"\n\n"`, kept at the start of the following piece
    Paragraph,
    /// `"\n"`, kept at the start of the following piece
    Line,
    /// `.`, `!` or `?`, kept at the end of the sentence it closes
    Sentence,
    /// `" "`, kept at the start of the following piece
    Word,
    /// Hard character cut
    Char,
}

impl Separator {
    fn occurs_in(self, text: &str) -> bool {
        match self {
            Self::Paragraph => text.contains("\n\n"),
            Self::Line => text.contains('\n'),
            Self::Sentence => text.contains(is_sentence_end),
            Self::Word => text.contains(' '),
            Self::Char => true,
        }
    }

    fn split(self, text: &str, max_chars: usize) -> Vec<&str> {
        match self {
            Self::Paragraph => split_leading(text, "\n\n"),
            Self::Line => split_leading(text, "\n"),
            Self::Sentence => text.split_inclusive(is_sentence_end).collect(),
            Self::Word => split_leading(text, " "),
            Self::Char => hard_cut(text, max_chars),
        }
    }
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Split before every occurrence of `pattern`, keeping it on the next piece
fn split_leading<'a>(text: &'a str, pattern: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(pattern) {
        if idx > start {
            pieces.push(&text[start..idx]);
            start = idx;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Cut into pieces of exactly `max_chars` characters (the last may be shorter)
fn hard_cut(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (count, (idx, _)) in text.char_indices().enumerate() {
        if count > 0 && count % max_chars == 0 {
            pieces.push(&text[start..idx]);
            start = idx;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// The last `n` characters of `text`
fn tail_chars(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// A merged fragment before it is tagged with its document
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fragment {
    text: String,
    overlap: usize,
}

/// Deterministic document chunker
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_chars: usize,
    overlap_chars: usize,
}

impl Chunker {
    /// Create a chunker, rejecting `max_chars == 0` and `overlap_chars >= max_chars`
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate().map_err(RagError::from)?;
        Ok(Self {
            max_chars: config.max_chars,
            overlap_chars: config.overlap_chars,
        })
    }

    /// The configuration this chunker was built with
    pub fn config(&self) -> ChunkingConfig {
        ChunkingConfig {
            max_chars: self.max_chars,
            overlap_chars: self.overlap_chars,
        }
    }

    /// Split a document into ordered chunks
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.fragments(&document.text)
            .into_iter()
            .enumerate()
            .map(|(i, fragment)| Chunk {
                doc_id: document.doc_id.clone(),
                text: fragment.text,
                sequence: i as u32,
                overlap: fragment.overlap,
            })
            .collect()
    }

    /// Chunk every document, keeping document order
    pub fn chunk_all(&self, documents: &[Document]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = documents.iter().flat_map(|doc| self.chunk(doc)).collect();
        tracing::debug!(
            "Chunked {} documents into {} chunks",
            documents.len(),
            chunks.len()
        );
        chunks
    }

    /// Split raw text into fragment strings (overlap prefixes included)
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.fragments(text).into_iter().map(|f| f.text).collect()
    }

    fn fragments(&self, text: &str) -> Vec<Fragment> {
        let mut pieces = Vec::new();
        self.split_recursive(text, &SEPARATORS, &mut pieces);
        self.merge(&pieces)
    }

    fn split_recursive<'a>(
        &self,
        text: &'a str,
        separators: &[Separator],
        out: &mut Vec<&'a str>,
    ) {
        if text.is_empty() {
            return;
        }
        if char_len(text) <= self.max_chars {
            out.push(text);
            return;
        }

        match separators.iter().position(|sep| sep.occurs_in(text)) {
            Some(pos) if separators[pos] != Separator::Char => {
                let finer = &separators[pos + 1..];
                for piece in separators[pos].split(text, self.max_chars) {
                    self.split_recursive(piece, finer, out);
                }
            }
            _ => out.extend(Separator::Char.split(text, self.max_chars)),
        }
    }

    /// Greedy merge of minimal pieces, with the overlap prefix counted
    /// against each fragment's budget
    fn merge(&self, pieces: &[&str]) -> Vec<Fragment> {
        let mut fragments = Vec::new();
        let mut prefix = String::new();
        let mut prefix_len = 0;
        let mut body = String::new();
        let mut body_len = 0;

        for piece in pieces {
            let piece_len = char_len(piece);

            if body_len > 0 && prefix_len + body_len + piece_len > self.max_chars {
                // Shrink the overlap when the next piece would not fit beside it
                let take = self
                    .overlap_chars
                    .min(body_len)
                    .min(self.max_chars - piece_len);
                let next_prefix = tail_chars(&body, take).to_string();

                fragments.push(Fragment {
                    text: std::mem::take(&mut prefix) + &body,
                    overlap: prefix_len,
                });

                prefix = next_prefix;
                prefix_len = take;
                body.clear();
                body_len = 0;
            }

            body.push_str(piece);
            body_len += piece_len;
        }

        if body_len > 0 {
            fragments.push(Fragment {
                text: prefix + &body,
                overlap: prefix_len,
            });
        }

        fragments
    }
}

/// Chunk a single document with the given limits
///
/// Fails with a configuration error when `overlap_chars >= max_chars` or
/// `max_chars == 0`.
pub fn chunk(document: &Document, max_chars: usize, overlap_chars: usize) -> Result<Vec<Chunk>> {
    let chunker = Chunker::new(ChunkingConfig {
        max_chars,
        overlap_chars,
    })?;
    Ok(chunker.chunk(document))
}
