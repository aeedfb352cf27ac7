//! Structural selection descriptor.
//!
//! When the rich-text tree is replaced wholesale without going through the
//! marker protocol (an external content refresh), the marker tokens are
//! gone with the old tree. The descriptor re-locates the same logical
//! selection structurally: nearest block ancestor's class and text, the
//! caret's offset within that text, and the ancestor's ordinal among
//! same-class nodes. When nothing matches, the selection is simply not
//! restored.

use serde::{Deserialize, Serialize};

use super::{TreePoint, TreeSelection};
use crate::tree::{NodeId, RichTextTree, Tag};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionDescriptor {
    /// Class name of the nearest block-level ancestor.
    pub ancestor_class: String,
    /// That ancestor's flattened text at capture time.
    pub ancestor_text: String,
    /// Byte offset of the caret within the ancestor's flattened text.
    pub local_offset: usize,
    /// Position among all nodes of the same class, in document order.
    pub ordinal: usize,
    /// Whether the ancestor sits inside a nested editable region (a table
    /// cell or a callout body).
    pub nested_editable: bool,
}

/// Tags that count as "nearest structural ancestor" for descriptors.
fn is_block_ancestor(tag: &Tag) -> bool {
    matches!(
        tag,
        Tag::Paragraph
            | Tag::Heading(_)
            | Tag::ListItem
            | Tag::CodeBlock
            | Tag::BlockQuote
            | Tag::TableCell { .. }
            | Tag::Admonition
            | Tag::HtmlBlock
    )
}

fn tag_class(tag: &Tag) -> String {
    match tag {
        Tag::Paragraph => "paragraph".to_string(),
        Tag::Heading(level) => format!("heading{level}"),
        Tag::ListItem => "list-item".to_string(),
        Tag::CodeBlock => "code-block".to_string(),
        Tag::BlockQuote => "block-quote".to_string(),
        Tag::TableCell { .. } => "table-cell".to_string(),
        Tag::Admonition => "admonition".to_string(),
        Tag::HtmlBlock => "html-block".to_string(),
        _ => "block".to_string(),
    }
}

impl SelectionDescriptor {
    /// Describe the selection start structurally. Returns `None` when the
    /// point does not sit under a recognizable block ancestor.
    pub fn capture(tree: &RichTextTree, selection: &TreeSelection) -> Option<Self> {
        let TreePoint::Text { node, offset } = &selection.start else {
            return None;
        };
        let ancestor = find_block_ancestor(tree, *node)?;
        let ancestor_tag = tree.tag(ancestor)?.clone();

        // The caret's offset inside the ancestor's flattened text.
        let local_offset = tree
            .text_segments(ancestor)
            .iter()
            .find(|segment| segment.node == *node)
            .map(|segment| segment.start + offset)?;

        let class = tag_class(&ancestor_tag);
        let ordinal = same_class_nodes(tree, &class)
            .iter()
            .position(|&candidate| candidate == ancestor)?;

        Some(Self {
            ancestor_class: class,
            ancestor_text: tree.flattened_text(ancestor),
            local_offset,
            ordinal,
            nested_editable: matches!(ancestor_tag, Tag::TableCell { .. } | Tag::Admonition)
                || has_nested_editable_ancestor(tree, ancestor),
        })
    }

    /// Re-locate the selection in a fresh tree. Prefers the candidate with
    /// the captured ordinal when its text still matches, then any node of
    /// the same class with identical text.
    pub fn resolve(&self, tree: &RichTextTree) -> Option<TreePoint> {
        let candidates = same_class_nodes(tree, &self.ancestor_class);
        let by_ordinal = candidates
            .get(self.ordinal)
            .copied()
            .filter(|&node| tree.flattened_text(node) == self.ancestor_text);
        let target = by_ordinal.or_else(|| {
            candidates
                .iter()
                .copied()
                .find(|&node| tree.flattened_text(node) == self.ancestor_text)
        })?;

        let text_len = tree.flattened_text(target).len();
        let offset = self.local_offset.min(text_len);
        tree.locate_flattened_offset(target, offset)
            .map(|(node, local)| TreePoint::Text {
                node,
                offset: local,
            })
    }
}

fn find_block_ancestor(tree: &RichTextTree, node: NodeId) -> Option<NodeId> {
    let mut current = Some(node);
    while let Some(id) = current {
        if let Some(tag) = tree.tag(id)
            && is_block_ancestor(tag)
        {
            return Some(id);
        }
        current = tree.parent(id);
    }
    None
}

fn has_nested_editable_ancestor(tree: &RichTextTree, node: NodeId) -> bool {
    let mut current = tree.parent(node);
    while let Some(id) = current {
        if matches!(
            tree.tag(id),
            Some(Tag::TableCell { .. }) | Some(Tag::Admonition)
        ) {
            return true;
        }
        current = tree.parent(id);
    }
    false
}

fn same_class_nodes(tree: &RichTextTree, class: &str) -> Vec<NodeId> {
    tree.walk(tree.root())
        .into_iter()
        .filter(|&id| tree.tag(id).map(tag_class).as_deref() == Some(class))
        .collect()
}
