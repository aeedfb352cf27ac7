//! Cursor/selection position mapping across representation switches.
//!
//! The caret (or selection) is encoded as invisible marker tokens inserted
//! into the *source* representation, the real conversion runs, the markers
//! are located in the *target* representation and removed. A marker must be
//! invisible, must not collide with content, and must survive re-rendering
//! without being read as syntax; six zero-width non-joiners (start) and six
//! zero-width joiners (end) satisfy all three.
//!
//! In the Markdown → rich-text direction a verification gate decides
//! whether an insertion point is safe before committing: the marked text
//! and the clean text are both round-tripped and canonicalized, and any
//! difference means the marker would have split syntax. The mapper then
//! retries at an adjusted offset, and finally falls back to placing the
//! caret at the start of the containing top-level block.

pub mod descriptor;

use std::ops::Range;

use log::{debug, warn};

use crate::render::{RendererBackend, render_document};
use crate::serialize::{serialize, tidy};
use crate::tree::{NodeId, NodeKind, RichTextTree, Tag};

/// Selection-start marker token.
pub const MARKER_START: &str = "\u{200c}\u{200c}\u{200c}\u{200c}\u{200c}\u{200c}";
/// Selection-end marker token, distinct so a range survives as a range.
pub const MARKER_END: &str = "\u{200d}\u{200d}\u{200d}\u{200d}\u{200d}\u{200d}";

/// Progress of one mapping run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperState {
    Idle,
    MarkerInjected,
    Converted,
    MarkerLocated,
    Cleaned,
}

#[derive(Debug, Default)]
pub struct PositionMapper {
    state: MapperState,
}

impl Default for MapperState {
    fn default() -> Self {
        MapperState::Idle
    }
}

impl PositionMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MapperState {
        self.state
    }

    fn advance(&mut self, to: MapperState) {
        self.state = to;
    }
}

/// A concrete position inside the rich-text tree.
#[derive(Debug, Clone, PartialEq)]
pub enum TreePoint {
    Text { node: NodeId, offset: usize },
    /// A structural element absorbed the marker into an attribute value
    /// (e.g. a code block title); the offset indexes that string.
    Attribute {
        node: NodeId,
        name: String,
        offset: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeSelection {
    pub start: TreePoint,
    pub end: Option<TreePoint>,
}

/// Where the selection ended up after a switch.
#[derive(Debug, Clone, PartialEq)]
pub enum MappedSelection {
    Tree(TreeSelection),
    /// Marker mapping was judged unsafe; the caret goes to the start of the
    /// n-th top-level content block instead.
    BlockStart(usize),
    DocStart,
    Markdown { start: usize, end: usize },
    None,
}

/// Markdown → rich-text direction: returns the rendered tree and the mapped
/// selection.
pub(crate) fn map_markdown_to_tree(
    backend: &dyn RendererBackend,
    markdown: &str,
    selection: Range<usize>,
) -> (RichTextTree, MappedSelection) {
    let mut mapper = PositionMapper::new();
    let len = markdown.len();
    let mut start = clamp_boundary(markdown, selection.start.min(len));
    let mut end = clamp_boundary(markdown, selection.end.min(len)).max(start);

    if start == 0 {
        return (render_document(backend, markdown), MappedSelection::DocStart);
    }

    // A caret sitting right after a newline belongs to the previous line's
    // end; a selection ending right after one shrinks by it.
    if start == end {
        if markdown.as_bytes()[start - 1] == b'\n' {
            start -= 1;
            end -= 1;
        }
    } else if markdown.as_bytes()[end - 1] == b'\n' {
        end -= 1;
    }

    let mut attempts: Vec<(usize, usize)> = vec![(start, end)];
    if start != end {
        // A failing selection collapses to a caret at its start.
        attempts.push((start, start));
    }
    if let Some(alt) = retry_offset(markdown, start)
        && alt != start
        && alt > 0
    {
        attempts.push((alt, alt));
    }

    let base_structure = structure_fingerprint(&render_document(backend, markdown));
    for (s, e) in attempts {
        let marked = inject_markers(markdown, s, e);
        mapper.advance(MapperState::MarkerInjected);
        let mut tree = render_document(backend, &marked);
        // The text comparison alone cannot catch a marker that collapses a
        // construct whose canonical serialization matches its source lines
        // (a table row, say): the marked render must also keep its shape.
        let accepted = is_reversible_edit(
            markdown,
            &marked,
            |text| roundtrip(backend, text),
            |text| tidy(&strip_markers(text)),
        ) && structure_fingerprint(&tree) == base_structure;
        mapper.advance(MapperState::Converted);
        if !accepted {
            debug!("marker insertion at {s} judged unsafe; trying the next candidate");
            continue;
        }
        if let Some(found) = locate_and_clean(&mut tree) {
            mapper.advance(MapperState::MarkerLocated);
            mapper.advance(MapperState::Cleaned);
            return (tree, MappedSelection::Tree(found));
        }
        warn!("cursor markers vanished during render; using block placement");
        break;
    }

    let tree = render_document(backend, markdown);
    let block = block_index_for_offset(markdown, selection.start.min(len));
    (tree, MappedSelection::BlockStart(block))
}

/// Rich-text → Markdown direction: serialize through `restore` (the full
/// ledger pipeline), locate and strip the markers, return the adjusted
/// byte range.
pub(crate) fn map_tree_to_markdown(
    tree: &mut RichTextTree,
    selection: Option<&TreeSelection>,
    restore: impl Fn(&str) -> String,
) -> (String, Option<(usize, usize)>) {
    let mut mapper = PositionMapper::new();
    if let Some(sel) = selection && inject_tree_markers(tree, sel) {
        mapper.advance(MapperState::MarkerInjected);
    }

    let restored = restore(&serialize(tree));
    mapper.advance(MapperState::Converted);

    let start_idx = restored.find(MARKER_START);
    let end_idx = restored.find(MARKER_END);
    let cleaned = strip_markers(&restored);
    strip_tree_markers(tree);

    let selection = start_idx.map(|s| {
        mapper.advance(MapperState::MarkerLocated);
        let (mut start, mut end) = (s, s);
        if let Some(e) = end_idx {
            if e > s {
                end = e - MARKER_START.len();
            } else if e < s {
                // The end marker drifted in front of the start; collapse.
                start = s - MARKER_END.len();
                end = start;
            }
        }
        let start = start.min(cleaned.len());
        (start, end.clamp(start, cleaned.len()))
    });
    mapper.advance(MapperState::Cleaned);
    (cleaned, selection)
}

fn roundtrip(backend: &dyn RendererBackend, markdown: &str) -> String {
    serialize(&render_document(backend, markdown))
}

/// Speculative-edit check: a candidate edit to one representation is
/// accepted only when mapping it through the opposing representation and
/// back is a no-op under `normalize`. The marker gate uses it with a
/// marker-stripping normalizer; any pass that rewrites surface syntax can
/// test its own rewrites the same way.
pub fn is_reversible_edit<R, N>(baseline: &str, candidate: &str, roundtrip: R, normalize: N) -> bool
where
    R: Fn(&str) -> String,
    N: Fn(&str) -> String,
{
    normalize(&roundtrip(candidate)) == normalize(&roundtrip(baseline))
}

/// Element tags in document order, text ignored. Two renders with the same
/// fingerprint have the same block/inline shape.
fn structure_fingerprint(tree: &RichTextTree) -> Vec<Tag> {
    tree.walk(tree.root())
        .into_iter()
        .filter_map(|id| tree.tag(id).cloned())
        .collect()
}

pub(crate) fn strip_markers(text: &str) -> String {
    text.replace(MARKER_START, "").replace(MARKER_END, "")
}

fn inject_markers(markdown: &str, start: usize, end: usize) -> String {
    let mut out = String::with_capacity(markdown.len() + MARKER_START.len() + MARKER_END.len());
    if start == end {
        out.push_str(&markdown[..start]);
        out.push_str(MARKER_START);
        out.push_str(&markdown[start..]);
    } else {
        out.push_str(&markdown[..start]);
        out.push_str(MARKER_START);
        out.push_str(&markdown[start..end]);
        out.push_str(MARKER_END);
        out.push_str(&markdown[end..]);
    }
    out
}

/// Find the markers in the rendered tree, remove them, and return the
/// selection they encode.
fn locate_and_clean(tree: &mut RichTextTree) -> Option<TreeSelection> {
    let root = tree.root();
    let flat = tree.flattened_text(root);

    if let Some(start_idx) = flat.find(MARKER_START) {
        let end_idx = flat.find(MARKER_END);
        let (final_start, final_end) = match end_idx {
            Some(e) if e > start_idx => {
                remove_flattened_range(tree, e, MARKER_END.len());
                remove_flattened_range(tree, start_idx, MARKER_START.len());
                (start_idx, Some(e - MARKER_START.len()))
            }
            Some(e) => {
                remove_flattened_range(tree, start_idx, MARKER_START.len());
                remove_flattened_range(tree, e, MARKER_END.len());
                (start_idx - MARKER_END.len(), None)
            }
            None => {
                remove_flattened_range(tree, start_idx, MARKER_START.len());
                (start_idx, None)
            }
        };
        scrub_attribute_markers(tree);
        let start = tree
            .locate_flattened_offset(root, final_start)
            .map(|(node, offset)| TreePoint::Text { node, offset })?;
        let end = final_end.and_then(|e| {
            tree.locate_flattened_offset(root, e)
                .map(|(node, offset)| TreePoint::Text { node, offset })
        });
        return Some(TreeSelection { start, end });
    }

    // Not in any text leaf: a structural element may have absorbed the
    // marker as an attribute value.
    for node in tree.walk(root) {
        let attrs = match tree.get(node) {
            Some(n) => n.attrs.clone(),
            None => continue,
        };
        for (name, value) in attrs {
            if let Some(offset) = value.find(MARKER_START) {
                tree.set_attr(node, &name, strip_markers(&value));
                scrub_attribute_markers(tree);
                return Some(TreeSelection {
                    start: TreePoint::Attribute { node, name, offset },
                    end: None,
                });
            }
        }
    }
    None
}

/// Remove `len` bytes starting at flattened offset `start`, even when the
/// range spans several text leaves.
fn remove_flattened_range(tree: &mut RichTextTree, start: usize, len: usize) {
    let root = tree.root();
    let end = start + len;
    let edits: Vec<(NodeId, usize, usize)> = tree
        .text_segments(root)
        .iter()
        .filter_map(|segment| {
            let s = start.max(segment.start);
            let e = end.min(segment.start + segment.len);
            (s < e).then(|| (segment.node, s - segment.start, e - segment.start))
        })
        .collect();
    for (node, s, e) in edits {
        let _ = tree.remove_text_range(node, s, e);
    }
}

fn scrub_attribute_markers(tree: &mut RichTextTree) {
    for node in tree.walk(tree.root()) {
        let attrs = match tree.get(node) {
            Some(n) => n.attrs.clone(),
            None => continue,
        };
        for (name, value) in attrs {
            if value.contains(MARKER_START) || value.contains(MARKER_END) {
                tree.set_attr(node, &name, strip_markers(&value));
            }
        }
    }
}

/// Inject selection markers into the tree: end first so the start offset
/// stays valid when both land in the same node. On failure the selection
/// collapses and the caret alone is retried once.
fn inject_tree_markers(tree: &mut RichTextTree, selection: &TreeSelection) -> bool {
    let mut ok = true;
    if let Some(end) = &selection.end {
        ok &= inject_tree_point(tree, end, MARKER_END);
    }
    if ok {
        ok &= inject_tree_point(tree, &selection.start, MARKER_START);
    }
    if ok {
        return true;
    }
    warn!("selection marker injection failed; collapsing the selection");
    strip_tree_markers(tree);
    if inject_tree_point(tree, &selection.start, MARKER_START) {
        return true;
    }
    strip_tree_markers(tree);
    false
}

fn inject_tree_point(tree: &mut RichTextTree, point: &TreePoint, marker: &str) -> bool {
    match point {
        TreePoint::Text { node, offset } => tree.insert_into_text(*node, *offset, marker).is_ok(),
        TreePoint::Attribute { node, name, offset } => {
            let Some(value) = tree.attr(*node, name).map(str::to_string) else {
                return false;
            };
            if *offset > value.len() || !value.is_char_boundary(*offset) {
                return false;
            }
            let mut patched = value;
            patched.insert_str(*offset, marker);
            tree.set_attr(*node, name, patched);
            true
        }
    }
}

/// Remove any marker tokens left in text leaves or attribute values.
pub(crate) fn strip_tree_markers(tree: &mut RichTextTree) {
    for node in tree.walk(tree.root()) {
        if let Some(n) = tree.get_mut(node)
            && let NodeKind::Text(ref mut text) = n.kind
            && (text.contains(MARKER_START) || text.contains(MARKER_END))
        {
            *text = strip_markers(text);
        }
    }
    scrub_attribute_markers(tree);
}

/// An alternate insertion point to try when the gate rejects the first:
/// empty lines and bare quote-continuation lines hop back to the previous
/// line's end, everything else moves to the line's content start.
fn retry_offset(markdown: &str, start: usize) -> Option<usize> {
    let line_start = markdown[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = markdown[start..]
        .find('\n')
        .map(|i| start + i)
        .unwrap_or(markdown.len());
    let line = &markdown[line_start..line_end];
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed == ">" {
        return Some(line_start.saturating_sub(1));
    }
    let content_start =
        line_start + (line.len() - line.trim_start_matches([' ', '\t', '>']).len());
    (content_start != start).then_some(content_start)
}

/// Index of the top-level content block containing the given offset:
/// blocks are runs of non-blank lines.
pub(crate) fn block_index_for_offset(markdown: &str, offset: usize) -> usize {
    let clamped = offset.min(markdown.len());
    let line_index = markdown[..clamped].matches('\n').count();
    let mut block: isize = -1;
    let mut in_block = false;
    for (index, line) in markdown.split('\n').enumerate() {
        if index > line_index {
            break;
        }
        if line.trim().is_empty() {
            in_block = false;
        } else if !in_block {
            block += 1;
            in_block = true;
        }
    }
    block.max(0) as usize
}

fn clamp_boundary(text: &str, mut offset: usize) -> usize {
    while offset > 0 && !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
