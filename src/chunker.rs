//! Overlapping fixed-size text windows for embedding.
//!
//! Text is split on the coarsest boundary present (paragraph, line, sentence, word) and
//! the pieces are packed greedily into windows of at most `chunk_size` characters. When a
//! window is flushed, its tail (up to `chunk_overlap` characters of whole pieces) seeds the
//! next one. Pieces that are still too long are split again on the next finer boundary,
//! down to single characters.

use crate::corpus::CorpusDocument;
use std::collections::VecDeque;

/// Default maximum characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 600;
/// Default characters shared between neighbouring chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Where a chunk came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Page URL when the corpus record named one.
    pub source_url: Option<String>,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
}

/// Embedding-ready text segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk body; never empty.
    pub text: String,
    /// Provenance carried into the index.
    pub source_metadata: ChunkMetadata,
}

/// Recursive boundary-aware splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Builds a splitter; the overlap is clamped below the chunk size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Maximum characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters carried from one chunk into the next.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits every document, tagging chunks with their source.
    pub fn chunk_documents(&self, documents: &[CorpusDocument]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.text)
                    .into_iter()
                    .enumerate()
                    .map(|(chunk_index, text)| Chunk {
                        text,
                        source_metadata: ChunkMetadata {
                            source_url: doc.source_url.clone(),
                            chunk_index,
                        },
                    })
            })
            .collect()
    }

    /// Splits one text into trimmed, non-empty windows.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, finer) = pick_separator(text, separators);
        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keeping(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                push_trimmed(&mut chunks, piece);
            } else {
                chunks.extend(self.split_with(piece, finer));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }
        chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &window.iter().copied().collect::<String>());
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    let Some(dropped) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(dropped);
                }
            }
            window.push_back(piece);
            total += len;
        }
        if !window.is_empty() {
            push_trimmed(&mut chunks, &window.iter().copied().collect::<String>());
        }
        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

fn pick_separator<'s>(text: &str, separators: &'s [&'s str]) -> (&'s str, &'s [&'s str]) {
    for (idx, &separator) in separators.iter().enumerate() {
        if separator.is_empty() || text.contains(separator) {
            return (separator, &separators[idx + 1..]);
        }
    }
    ("", &[])
}

/// Splits after each separator occurrence so no characters are lost; `""` splits per char.
fn split_keeping<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        text.char_indices()
            .map(|(idx, ch)| &text[idx..idx + ch.len_utf8()])
            .collect()
    } else {
        text.split_inclusive(separator).collect()
    }
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
