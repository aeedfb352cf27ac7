//! Owned-arena rich-text tree.
//!
//! The tree is the structured representation the visual editing surface
//! displays and mutates. Nodes live in one `Vec` and address each other by
//! index, children are ordered index lists, and every structural edit is a
//! local splice. The tree is replaced wholesale on every mode switch; only
//! the active mode's representation is ever authoritative.

use thiserror::Error;

/// Index of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Element categories the conversion core understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    Root,
    Paragraph,
    Heading(u8),
    Emphasis,
    Strong,
    Strikethrough,
    Link,
    Image,
    InlineCode,
    CodeBlock,
    List { ordered: bool },
    ListItem,
    BlockQuote,
    Table,
    TableHead,
    TableRow,
    TableCell { header: bool },
    Admonition,
    HardBreak,
    Rule,
    HtmlBlock,
    InlineHtml,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Text(String),
    Element(Tag),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Ordered attribute pairs (`href`, `src`, `lang`, `title`, ...).
    pub attrs: Vec<(String, String)>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

#[derive(Debug, Error, PartialEq)]
pub enum TreeError {
    #[error("node {0:?} does not exist")]
    NoSuchNode(NodeId),
    #[error("node {0:?} is not a text node")]
    NotAText(NodeId),
    #[error("offset {offset} is out of bounds or not a char boundary in node {node:?}")]
    BadOffset { node: NodeId, offset: usize },
}

/// A text-bearing leaf with its byte position in the flattened document text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSegment {
    pub node: NodeId,
    /// Byte offset of this segment's first byte in the flattened text.
    pub start: usize,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RichTextTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for RichTextTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RichTextTree {
    pub fn new() -> Self {
        let root = Node {
            kind: NodeKind::Element(Tag::Root),
            attrs: Vec::new(),
            children: Vec::new(),
            parent: None,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn tag(&self, id: NodeId) -> Option<&Tag> {
        match self.get(id)?.kind {
            NodeKind::Element(ref tag) => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.get(id)?.kind {
            NodeKind::Text(ref t) => Some(t),
            NodeKind::Element(_) => None,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.parent
    }

    pub fn create_element(&mut self, tag: Tag) -> NodeId {
        self.push_node(NodeKind::Element(tag))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push_node(NodeKind::Text(text.into()))
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            attrs: Vec::new(),
            children: Vec::new(),
            parent: None,
        });
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.nodes.get_mut(child.0) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(parent.0) {
            node.children.push(child);
        }
    }

    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        if let Some(node) = self.nodes.get_mut(child.0) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(parent.0) {
            let index = index.min(node.children.len());
            node.children.insert(index, child);
        }
    }

    /// Remove `child` from `parent`'s child list. The node itself stays in
    /// the arena (ids are never reused within one tree's lifetime).
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if let Some(node) = self.nodes.get_mut(parent.0)
            && let Some(pos) = node.children.iter().position(|c| *c == child)
        {
            node.children.remove(pos);
            if let Some(c) = self.nodes.get_mut(child.0) {
                c.parent = None;
            }
            return true;
        }
        false
    }

    /// Append text under `parent`, merging into a trailing text sibling so
    /// adjacent runs stay contiguous for offset math.
    pub fn push_text(&mut self, parent: NodeId, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(&last) = self.children(parent).last()
            && let Some(node) = self.nodes.get_mut(last.0)
            && let NodeKind::Text(ref mut existing) = node.kind
        {
            existing.push_str(text);
            return;
        }
        let id = self.create_text(text);
        self.append_child(parent, id);
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            let value = value.into();
            if let Some(pair) = node.attrs.iter_mut().find(|(n, _)| n == name) {
                pair.1 = value;
            } else {
                node.attrs.push((name.to_string(), value));
            }
        }
    }

    pub fn attr<'a>(&'a self, id: NodeId, name: &str) -> Option<&'a str> {
        self.get(id)?
            .attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Insert `s` into the text node `id` at byte `offset`.
    pub fn insert_into_text(
        &mut self,
        id: NodeId,
        offset: usize,
        s: &str,
    ) -> Result<(), TreeError> {
        let node = self.nodes.get_mut(id.0).ok_or(TreeError::NoSuchNode(id))?;
        let NodeKind::Text(ref mut text) = node.kind else {
            return Err(TreeError::NotAText(id));
        };
        if offset > text.len() || !text.is_char_boundary(offset) {
            return Err(TreeError::BadOffset { node: id, offset });
        }
        text.insert_str(offset, s);
        Ok(())
    }

    /// Remove the byte range `start..end` from the text node `id`.
    pub fn remove_text_range(
        &mut self,
        id: NodeId,
        start: usize,
        end: usize,
    ) -> Result<(), TreeError> {
        let node = self.nodes.get_mut(id.0).ok_or(TreeError::NoSuchNode(id))?;
        let NodeKind::Text(ref mut text) = node.kind else {
            return Err(TreeError::NotAText(id));
        };
        if start > end
            || end > text.len()
            || !text.is_char_boundary(start)
            || !text.is_char_boundary(end)
        {
            return Err(TreeError::BadOffset { node: id, offset: end });
        }
        text.replace_range(start..end, "");
        Ok(())
    }

    /// Pre-order walk of `id` and every descendant.
    pub fn walk(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            for &child in self.children(next).iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// The concatenated text of every text leaf under `id`, in document order.
    pub fn flattened_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.get(id) {
            Some(node) => match node.kind {
                NodeKind::Text(ref t) => out.push_str(t),
                NodeKind::Element(_) => {
                    for &child in &node.children {
                        self.collect_text(child, out);
                    }
                }
            },
            None => {}
        }
    }

    /// Text leaves under `id` with their byte positions in the flattened
    /// text, so a flat offset can be mapped back to a node + local offset.
    pub fn text_segments(&self, id: NodeId) -> Vec<TextSegment> {
        let mut segments = Vec::new();
        let mut cursor = 0usize;
        self.collect_segments(id, &mut cursor, &mut segments);
        segments
    }

    fn collect_segments(&self, id: NodeId, cursor: &mut usize, out: &mut Vec<TextSegment>) {
        let Some(node) = self.get(id) else { return };
        match node.kind {
            NodeKind::Text(ref t) => {
                out.push(TextSegment {
                    node: id,
                    start: *cursor,
                    len: t.len(),
                });
                *cursor += t.len();
            }
            NodeKind::Element(_) => {
                for &child in &node.children {
                    self.collect_segments(child, cursor, out);
                }
            }
        }
    }

    /// Map a byte offset in the flattened text of `root` back to the text
    /// leaf that contains it and the local byte offset inside that leaf.
    pub fn locate_flattened_offset(&self, root: NodeId, offset: usize) -> Option<(NodeId, usize)> {
        let segments = self.text_segments(root);
        for segment in &segments {
            if offset >= segment.start && offset < segment.start + segment.len {
                return Some((segment.node, offset - segment.start));
            }
        }
        // An offset at the very end of the text lands after the last leaf.
        if let Some(last) = segments.last()
            && offset == last.start + last.len
        {
            return Some((last.node, last.len));
        }
        None
    }
}
