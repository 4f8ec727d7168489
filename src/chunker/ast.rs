//! Grammar-driven chunk segmentation
//!
//! Chunk boundaries are the top-level splittable declarations of the
//! language. Everything between them (imports, constants, loose
//! statements) accumulates into synthetic `module_statements` segments so
//! that, concatenated in order, the segments cover the whole file.

use super::splitter::SizeSplitter;
use super::Segment;
use crate::error::ChunkError;
use tree_sitter::{Language, Node, Parser};

const MODULE_STATEMENTS: &str = "module_statements";

/// Segment `source` along the splittable nodes of `grammar`.
///
/// Oversized nodes are split recursively at the next grammatical level;
/// nodes with no further structure fall back to the size-based splitter.
pub(crate) fn node_segments(
    source: &str,
    grammar: &Language,
    splittable: &[&str],
    max_chunk_chars: usize,
    splitter: &SizeSplitter,
) -> Result<Vec<Segment>, ChunkError> {
    let mut parser = Parser::new();
    parser
        .set_language(grammar)
        .map_err(|e| ChunkError::ParseFailed {
            language: "unknown".to_string(),
            reason: e.to_string(),
        })?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ChunkError::ParseFailed {
            language: "unknown".to_string(),
            reason: "parser returned no tree".to_string(),
        })?;

    let mut segments = Vec::new();
    segment_children(
        tree.root_node(),
        source,
        splittable,
        max_chunk_chars,
        splitter,
        &mut segments,
    );
    Ok(segments)
}

/// Segment the region covered by `node`, emitting its topmost splittable
/// descendants as their own segments and grouping the text between them
/// into gap segments.
///
/// Splittable nodes often sit behind non-splittable wrappers (a Rust
/// `impl_item` keeps its methods in a `declaration_list`, a Python class
/// keeps them in a `block`), so boundary collection looks through those
/// wrappers rather than stopping at direct children.
fn segment_children(
    node: Node,
    source: &str,
    splittable: &[&str],
    max_chunk_chars: usize,
    splitter: &SizeSplitter,
    out: &mut Vec<Segment>,
) {
    let region_start = node.start_byte();
    let region_end = node.end_byte();

    let mut boundaries = Vec::new();
    collect_boundaries(node, splittable, &mut boundaries);

    let mut cursor = region_start;
    for child in boundaries {
        if child.start_byte() > cursor {
            push_gap(cursor, child.start_byte(), source, max_chunk_chars, splitter, out);
        }

        push_node(child, source, splittable, max_chunk_chars, splitter, out);
        cursor = child.end_byte();
    }

    if region_end > cursor {
        push_gap(cursor, region_end, source, max_chunk_chars, splitter, out);
    }
}

/// Depth-first, source-ordered collection of the topmost splittable
/// nodes under `node`. Recursion stops at a splittable node; it does not
/// descend into one.
fn collect_boundaries<'tree>(
    node: Node<'tree>,
    splittable: &[&str],
    out: &mut Vec<Node<'tree>>,
) {
    let mut walker = node.walk();
    for child in node.named_children(&mut walker) {
        if splittable.contains(&child.kind()) {
            out.push(child);
        } else {
            collect_boundaries(child, splittable, out);
        }
    }
}

/// Emit one splittable node, recursing when it exceeds the size bound
fn push_node(
    node: Node,
    source: &str,
    splittable: &[&str],
    max_chunk_chars: usize,
    splitter: &SizeSplitter,
    out: &mut Vec<Segment>,
) {
    let len = node.end_byte() - node.start_byte();
    if len <= max_chunk_chars {
        out.push(Segment {
            start: node.start_byte(),
            end: node.end_byte(),
            kind: Some(node.kind().to_string()),
        });
        return;
    }

    if has_splittable_descendant(node, splittable) {
        // Split at the next grammatical level
        segment_children(node, source, splittable, max_chunk_chars, splitter, out);
    } else {
        // No further structure: size-based fallback for this node only
        for span in splitter.split_spans(&source[node.start_byte()..node.end_byte()]) {
            out.push(Segment {
                start: node.start_byte() + span.start,
                end: node.start_byte() + span.end,
                kind: span.kind,
            });
        }
    }
}

/// Emit the text between splittable nodes as module-statement segments
fn push_gap(
    start: usize,
    end: usize,
    source: &str,
    max_chunk_chars: usize,
    splitter: &SizeSplitter,
    out: &mut Vec<Segment>,
) {
    if source[start..end].trim().is_empty() {
        return;
    }

    if end - start <= max_chunk_chars {
        out.push(Segment {
            start,
            end,
            kind: Some(MODULE_STATEMENTS.to_string()),
        });
        return;
    }

    for span in splitter.split_spans(&source[start..end]) {
        out.push(Segment {
            start: start + span.start,
            end: start + span.end,
            kind: Some(MODULE_STATEMENTS.to_string()),
        });
    }
}

fn has_splittable_descendant(node: Node, splittable: &[&str]) -> bool {
    let mut walker = node.walk();
    for child in node.named_children(&mut walker) {
        if splittable.contains(&child.kind()) || has_splittable_descendant(child, splittable) {
            return true;
        }
    }
    false
}
