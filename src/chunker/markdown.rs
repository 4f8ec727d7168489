//! Markdown sectioning
//!
//! Markdown is chunked at headings of any level rather than through a
//! grammar. Headings inside fenced code blocks do not open sections.

use super::splitter::SizeSplitter;
use super::Segment;

const SECTION: &str = "section";

/// Split markdown into heading-bounded section segments
pub(crate) fn section_segments(
    source: &str,
    max_chunk_chars: usize,
    splitter: &SizeSplitter,
) -> Vec<Segment> {
    let mut boundaries = Vec::new();
    let mut in_fence = false;
    let mut offset = 0usize;

    for line in source.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        } else if !in_fence && is_heading(trimmed) {
            boundaries.push(offset);
        }
        offset += line.len();
    }

    let mut sections = Vec::new();
    let mut start = 0usize;
    for boundary in boundaries {
        if boundary > start {
            sections.push((start, boundary));
        }
        start = boundary;
    }
    if source.len() > start {
        sections.push((start, source.len()));
    }

    let mut segments = Vec::new();
    for (start, end) in sections {
        if source[start..end].trim().is_empty() {
            continue;
        }
        if end - start <= max_chunk_chars {
            segments.push(Segment {
                start,
                end,
                kind: Some(SECTION.to_string()),
            });
        } else {
            for span in splitter.split_spans(&source[start..end]) {
                segments.push(Segment {
                    start: start + span.start,
                    end: start + span.end,
                    kind: Some(SECTION.to_string()),
                });
            }
        }
    }

    segments
}

fn is_heading(line: &str) -> bool {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    (1..=6).contains(&hashes)
        && line
            .as_bytes()
            .get(hashes)
            .is_some_and(|&b| b == b' ' || b == b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections(source: &str) -> Vec<String> {
        let splitter = SizeSplitter::new(1000, 200).unwrap();
        section_segments(source, 2500, &splitter)
            .into_iter()
            .map(|s| source[s.start..s.end].to_string())
            .collect()
    }

    #[test]
    fn test_splits_on_headings() {
        let md = "intro text\n\n# First\nbody one\n\n## Nested\nbody two\n\n# Second\nbody three\n";
        let got = sections(md);
        assert_eq!(got.len(), 4);
        assert!(got[0].starts_with("intro text"));
        assert!(got[1].starts_with("# First"));
        assert!(got[2].starts_with("## Nested"));
        assert!(got[3].starts_with("# Second"));
    }

    #[test]
    fn test_hash_in_code_fence_is_not_heading() {
        let md = "# Title\n\n```sh\n# this is a comment\necho hi\n```\n\nmore text\n";
        let got = sections(md);
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn test_no_heading_single_section() {
        let md = "just a paragraph\nwith two lines\n";
        let got = sections(md);
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn test_hashes_without_space_are_not_headings() {
        let md = "#tag line\n\n####### seven hashes\n\n# Real\nbody\n";
        let got = sections(md);
        assert_eq!(got.len(), 2);
        assert!(got[1].starts_with("# Real"));
    }
}
