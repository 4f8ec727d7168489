//! Size-based splitting with character overlap
//!
//! Breaks text at the highest-priority separator available inside the
//! size window: paragraph break, then newline, then space, then a hard
//! cut. Adjacent spans share exactly `chunk_overlap` characters.

use super::Segment;
use crate::error::{ChunkError, Result};

const SEPARATORS: &[&str] = &["\n\n", "\n", " "];

#[derive(Debug, Clone)]
pub struct SizeSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SizeSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ChunkError::InvalidConfig("chunk_size must be > 0".into()).into());
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkError::InvalidConfig(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            ))
            .into());
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split `text` into byte spans of at most `chunk_size`
    pub(crate) fn split_spans(&self, text: &str) -> Vec<Segment> {
        let len = text.len();
        if len == 0 {
            return Vec::new();
        }

        let mut spans = Vec::new();
        let mut start = 0usize;

        loop {
            let hard_limit = (start + self.chunk_size).min(len);
            let end = if hard_limit == len {
                len
            } else {
                self.break_point(text, start, hard_limit)
            };

            spans.push(Segment {
                start,
                end,
                kind: None,
            });

            if end >= len {
                break;
            }

            let mut next = end.saturating_sub(self.chunk_overlap);
            while !text.is_char_boundary(next) {
                next += 1;
            }
            if next <= start {
                // Guarantee forward progress even with degenerate overlap
                next = end;
            }
            start = next;
        }

        spans
    }

    /// Best break position in `(start, limit]`, preferring high-priority
    /// separators and keeping the separator with the preceding span
    fn break_point(&self, text: &str, start: usize, limit: usize) -> usize {
        let mut limit = limit;
        while !text.is_char_boundary(limit) {
            limit -= 1;
        }

        let window = &text[start..limit];
        for sep in SEPARATORS {
            if let Some(idx) = window.rfind(sep) {
                let candidate = start + idx + sep.len();
                if candidate > start {
                    return candidate;
                }
            }
        }

        if limit > start {
            limit
        } else {
            let mut end = start + 1;
            while end < text.len() && !text.is_char_boundary(end) {
                end += 1;
            }
            end
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_span() {
        let splitter = SizeSplitter::new(100, 20).unwrap();
        let spans = splitter.split_spans("short text");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans[0].end, 10);
    }

    #[test]
    fn test_spans_respect_chunk_size() {
        let text = "lorem ipsum dolor sit amet ".repeat(50);
        let splitter = SizeSplitter::new(100, 20).unwrap();
        for span in splitter.split_spans(&text) {
            assert!(span.end - span.start <= 100);
        }
    }

    #[test]
    fn test_adjacent_spans_share_exact_overlap() {
        let text = "alpha beta gamma delta epsilon zeta eta theta ".repeat(20);
        let splitter = SizeSplitter::new(120, 30).unwrap();
        let spans = splitter.split_spans(&text);
        assert!(spans.len() > 2);
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, 30);
        }
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let splitter = SizeSplitter::new(100, 10).unwrap();
        let spans = splitter.split_spans(&text);
        // First span ends right after the paragraph break
        assert_eq!(spans[0].end, 62);
    }

    #[test]
    fn test_hard_cut_without_separators() {
        let text = "x".repeat(250);
        let splitter = SizeSplitter::new(100, 10).unwrap();
        let spans = splitter.split_spans(&text);
        assert!(spans.len() >= 3);
        assert_eq!(spans[0].end - spans[0].start, 100);
        // Full coverage despite hard cuts
        assert_eq!(spans.last().unwrap().end, 250);
    }

    #[test]
    fn test_multibyte_safety() {
        let text = "héllo wörld ünïcode ".repeat(30);
        let splitter = SizeSplitter::new(64, 16).unwrap();
        for span in splitter.split_spans(&text) {
            // Slicing must not panic on char boundaries
            let _ = &text[span.start..span.end];
        }
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(SizeSplitter::new(100, 100).is_err());
        assert!(SizeSplitter::new(0, 0).is_err());
        assert!(SizeSplitter::new(100, 99).is_ok());
    }
}
