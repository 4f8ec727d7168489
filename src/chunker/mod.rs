//! Syntax-aware code chunking
//!
//! Two strategies are available per invocation: `ast` (default) parses the
//! file with a language grammar and cuts at top-level declarations;
//! `langchain` is a size-based fallback with character overlap. Both
//! produce chunks in source order with 1-based line spans.

mod ast;
mod markdown;
mod splitter;

pub mod language;

pub use splitter::SizeSplitter;

use crate::error::{ChunkError, Error, Result};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Mutex;

/// A contiguous, line-bounded piece of a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk text (never empty)
    pub content: String,
    /// Detected language tag, e.g. "rust" or "typescript"
    pub language: String,
    /// 1-based first line of the chunk in the source file
    pub start_line: usize,
    /// 1-based last line of the chunk in the source file
    pub end_line: usize,
    /// Grammar node that produced the chunk, for observability only
    pub node_kind: Option<String>,
}

/// Chunking strategy selected per invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitStrategy {
    /// Grammar-driven chunking with a size-bounded fallback
    #[default]
    Ast,
    /// Size-based splitting with character overlap
    Langchain,
}

impl SplitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitStrategy::Ast => "ast",
            SplitStrategy::Langchain => "langchain",
        }
    }
}

impl FromStr for SplitStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ast" => Ok(SplitStrategy::Ast),
            "langchain" => Ok(SplitStrategy::Langchain),
            other => Err(Error::InvalidSplitter(other.to_string())),
        }
    }
}

/// Byte span of a prospective chunk within normalised source
#[derive(Debug, Clone)]
pub(crate) struct Segment {
    pub start: usize,
    pub end: usize,
    pub kind: Option<String>,
}

/// Turns file contents into ordered, non-overlapping chunks
#[derive(Debug)]
pub struct Chunker {
    strategy: SplitStrategy,
    max_chunk_chars: usize,
    min_chunk_chars: usize,
    splitter: SizeSplitter,
    /// Languages already warned about this run (missing or failing grammar)
    warned_languages: Mutex<HashSet<String>>,
}

impl Chunker {
    pub fn new(
        strategy: SplitStrategy,
        max_chunk_chars: usize,
        min_chunk_chars: usize,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Self> {
        if max_chunk_chars == 0 {
            return Err(ChunkError::InvalidConfig("max_chunk_chars must be > 0".into()).into());
        }
        Ok(Self {
            strategy,
            max_chunk_chars,
            min_chunk_chars,
            splitter: SizeSplitter::new(chunk_size, chunk_overlap)?,
            warned_languages: Mutex::new(HashSet::new()),
        })
    }

    /// Chunker with the default parameters
    pub fn with_defaults(strategy: SplitStrategy) -> Self {
        Self::new(strategy, 2500, 200, 1000, 200).expect("default chunker config is valid")
    }

    /// Chunk one file given its contents and extension.
    ///
    /// Never fails: grammar problems degrade to the size-based strategy for
    /// the file, with one WARN per language per run.
    pub fn chunk_file(&self, content: &str, extension: &str) -> Vec<Chunk> {
        // Line numbers must be stable across platforms
        let normalised = normalise_newlines(content);
        let source = normalised.as_ref();
        if source.trim().is_empty() {
            return Vec::new();
        }

        let lang = language::detect_language(extension);

        let segments = match self.strategy {
            SplitStrategy::Langchain => self.splitter.split_spans(source),
            SplitStrategy::Ast => self.ast_segments(source, lang),
        };

        let merged = merge_small_segments(segments, self.min_chunk_chars, self.max_chunk_chars);
        segments_to_chunks(merged, source, lang)
    }

    fn ast_segments(&self, source: &str, lang: &str) -> Vec<Segment> {
        if lang == "markdown" {
            return markdown::section_segments(source, self.max_chunk_chars, &self.splitter);
        }

        match language::grammar(lang) {
            Some(grammar) => {
                match ast::node_segments(
                    source,
                    &grammar,
                    language::splittable_kinds(lang),
                    self.max_chunk_chars,
                    &self.splitter,
                ) {
                    Ok(segments) => segments,
                    Err(e) => {
                        self.warn_once(lang, &e.to_string());
                        self.splitter.split_spans(source)
                    }
                }
            }
            None => {
                self.warn_once(lang, "no grammar available");
                self.splitter.split_spans(source)
            }
        }
    }

    fn warn_once(&self, lang: &str, reason: &str) {
        let mut warned = self
            .warned_languages
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        if warned.insert(lang.to_string()) {
            tracing::warn!(
                "Falling back to size-based chunking for {}: {}",
                lang,
                reason
            );
        }
    }
}

/// Normalise CRLF to LF; borrows when nothing changes
fn normalise_newlines(content: &str) -> std::borrow::Cow<'_, str> {
    if content.contains('\r') {
        std::borrow::Cow::Owned(content.replace("\r\n", "\n"))
    } else {
        std::borrow::Cow::Borrowed(content)
    }
}

/// Greedily merge runs of consecutive small segments while the combined
/// size stays under the maximum
pub(crate) fn merge_small_segments(
    segments: Vec<Segment>,
    min_chars: usize,
    max_chars: usize,
) -> Vec<Segment> {
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());

    for segment in segments {
        let seg_len = segment.end - segment.start;
        if let Some(last) = merged.last_mut() {
            let last_len = last.end - last.start;
            let combined = segment.end - last.start;
            if last_len < min_chars && seg_len < min_chars && combined < max_chars {
                last.end = segment.end;
                last.kind = None;
                continue;
            }
        }
        merged.push(segment);
    }

    merged
}

/// Shape byte spans into chunks with trimmed content and 1-based line spans
pub(crate) fn segments_to_chunks(segments: Vec<Segment>, source: &str, lang: &str) -> Vec<Chunk> {
    let mut chunks = Vec::with_capacity(segments.len());

    for segment in segments {
        let raw = &source[segment.start..segment.end];
        let trimmed = raw.trim_matches('\n');
        if trimmed.trim().is_empty() {
            continue;
        }

        let leading = raw.len() - raw.trim_start_matches('\n').len();
        let start = segment.start + leading;
        let end = start + trimmed.len();

        let start_line = 1 + count_newlines(&source[..start]);
        let end_line = 1 + count_newlines(&source[..end]);

        chunks.push(Chunk {
            content: trimmed.to_string(),
            language: lang.to_string(),
            start_line,
            end_line,
            node_kind: segment.kind.clone(),
        });
    }

    chunks
}

fn count_newlines(s: &str) -> usize {
    s.bytes().filter(|&b| b == b'\n').count()
}
