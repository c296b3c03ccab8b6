//! The flat-text knowledge corpus written by the crawl engine and read back for chunking.
//!
//! Each record is a blank line, a rule of 90 `=`, `URL: <canonical url>`, another rule,
//! then the extracted text. Records are flushed as they are appended, so a file cut short
//! by an interrupted crawl is still valid up to its last complete record.

use crate::extract::normalize_for_dedup;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

/// Width of the `=` rule framing each record header.
pub const RULE_WIDTH: usize = 90;
const URL_PREFIX: &str = "URL: ";

/// SHA-256 of a page's normalized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Digest of `text` after lowercasing and collapsing whitespace.
    pub fn of(text: &str) -> Self {
        let normalized = normalize_for_dedup(text);
        let mut out = [0u8; 32];
        out.copy_from_slice(&Sha256::digest(normalized.as_bytes()));
        Self(out)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// One unique page in the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    /// Canonical URL the text was extracted from.
    pub canonical_url: String,
    /// Extracted text, newline-joined blocks.
    pub text: String,
    /// Digest of the normalized text.
    pub content_hash: ContentDigest,
}

impl PageRecord {
    /// Builds a record, computing its digest.
    pub fn new(canonical_url: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let content_hash = ContentDigest::of(&text);
        Self {
            canonical_url: canonical_url.into(),
            text,
            content_hash,
        }
    }
}

/// A raw document loaded back from a corpus file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusDocument {
    /// Source URL when the file used record headers.
    pub source_url: Option<String>,
    /// Document body.
    pub text: String,
}

/// Corpus read/write failures.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// Underlying file I/O failed.
    #[error("corpus i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// Append-only corpus writer that flushes after every record.
pub struct CorpusWriter<W: Write> {
    inner: W,
    written: usize,
}

impl CorpusWriter<File> {
    /// Creates (or truncates) the corpus file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> CorpusWriter<W> {
    /// Wraps an arbitrary sink.
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Writes one framed record and flushes it.
    pub fn append(&mut self, record: &PageRecord) -> Result<(), CorpusError> {
        let rule = "=".repeat(RULE_WIDTH);
        write!(
            self.inner,
            "\n{rule}\n{URL_PREFIX}{url}\n{rule}\n{text}\n",
            url = record.canonical_url,
            text = record.text
        )?;
        self.inner.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Number of records appended so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Returns the wrapped sink.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads a corpus file from disk.
pub fn load_documents(path: impl AsRef<Path>) -> Result<Vec<CorpusDocument>, CorpusError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(parse_documents(&raw))
}

/// Splits corpus text into documents.
///
/// Text with no record headers is returned whole as a single document.
pub fn parse_documents(raw: &str) -> Vec<CorpusDocument> {
    let lines: Vec<&str> = raw.lines().collect();
    let mut documents = Vec::new();
    let mut current: Option<(Option<String>, Vec<&str>)> = None;
    let mut idx = 0;

    while idx < lines.len() {
        if let Some(url) = header_at(&lines, idx) {
            if let Some((source_url, body)) = current.take() {
                push_document(&mut documents, source_url, &body);
            }
            current = Some((Some(url.to_string()), Vec::new()));
            idx += 3;
            continue;
        }
        current
            .get_or_insert_with(|| (None, Vec::new()))
            .1
            .push(lines[idx]);
        idx += 1;
    }
    if let Some((source_url, body)) = current {
        push_document(&mut documents, source_url, &body);
    }
    documents
}

/// Reads the framed records of a corpus file back into [`PageRecord`]s.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<PageRecord>, CorpusError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(parse_records(&raw))
}

/// Framed records in `raw`; text outside any record is ignored.
pub fn parse_records(raw: &str) -> Vec<PageRecord> {
    parse_documents(raw)
        .into_iter()
        .filter_map(|doc| doc.source_url.map(|url| PageRecord::new(url, doc.text)))
        .collect()
}

fn header_at<'a>(lines: &[&'a str], idx: usize) -> Option<&'a str> {
    let is_rule = |line: &str| line.len() == RULE_WIDTH && line.bytes().all(|b| b == b'=');
    let first = lines.get(idx).copied()?;
    let url_line = lines.get(idx + 1).copied()?;
    let closing = lines.get(idx + 2).copied()?;
    if is_rule(first) && is_rule(closing) {
        url_line.strip_prefix(URL_PREFIX).map(str::trim)
    } else {
        None
    }
}

fn push_document(documents: &mut Vec<CorpusDocument>, source_url: Option<String>, body: &[&str]) {
    let text = body.join("\n").trim().to_string();
    if !text.is_empty() {
        documents.push(CorpusDocument { source_url, text });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn writes_framed_records() {
        let mut writer = CorpusWriter::new(Vec::new());
        writer
            .append(&PageRecord::new("https://revnix.com/about", "Line one\nLine two"))
            .unwrap();
        assert_eq!(writer.written(), 1);
        let out = String::from_utf8(writer.into_inner()).unwrap();
        let rule = "=".repeat(90);
        assert_eq!(
            out,
            format!("\n{rule}\nURL: https://revnix.com/about\n{rule}\nLine one\nLine two\n")
        );
    }

    #[test]
    fn reads_back_what_it_writes() {
        let mut writer = CorpusWriter::new(Vec::new());
        writer
            .append(&PageRecord::new("https://x.com", "Home page text"))
            .unwrap();
        writer
            .append(&PageRecord::new("https://x.com/team", "Team\nMore team"))
            .unwrap();
        let raw = String::from_utf8(writer.into_inner()).unwrap();
        let docs = parse_documents(&raw);
        assert_eq!(
            docs,
            vec![
                CorpusDocument {
                    source_url: Some("https://x.com".into()),
                    text: "Home page text".into(),
                },
                CorpusDocument {
                    source_url: Some("https://x.com/team".into()),
                    text: "Team\nMore team".into(),
                },
            ]
        );
    }

    #[test]
    fn records_skip_unframed_preamble() {
        let rule = "=".repeat(90);
        let raw = format!("stray notes\n\n{rule}\nURL: https://x.com/a\n{rule}\nAlpha page\n");
        let records = parse_records(&raw);
        assert_eq!(records, vec![PageRecord::new("https://x.com/a", "Alpha page")]);
    }

    #[test]
    fn headerless_text_is_one_document() {
        let docs = parse_documents("just some notes\n\nabout the site\n");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_url, None);
        assert_eq!(docs[0].text, "just some notes\n\nabout the site");
    }

    #[test]
    fn digest_ignores_case_and_spacing() {
        assert_eq!(
            ContentDigest::of("Revnix  builds\nSoftware"),
            ContentDigest::of("revnix builds software")
        );
        assert_ne!(ContentDigest::of("a"), ContentDigest::of("b"));
        assert_eq!(ContentDigest::of("x").to_string().len(), 64);
    }
}
