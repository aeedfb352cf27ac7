//! Markdown → rich-text tree rendering.
//!
//! The real parser is pulldown-cmark; the engine only walks its event stream
//! into the arena tree. The backend sits behind a trait so a degraded
//! fixed-rule renderer can stand in when the full parser is unavailable, and
//! the admonition block rule is layered around whichever backend is active by
//! pre-splitting the document (see [`admonition`]).

pub mod admonition;
pub mod fallback;

pub use fallback::FallbackBackend;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag as CmTag};

use crate::tree::{NodeId, RichTextTree, Tag};

/// Seam between the conversion pipeline and the actual Markdown parser.
///
/// Implementations append the rendered form of `markdown` under `parent`.
/// They do not need to know about admonitions or frontmatter; both are
/// handled before a backend ever sees the text.
pub trait RendererBackend {
    fn render_into(&self, markdown: &str, tree: &mut RichTextTree, parent: NodeId);
}

/// Render a document body into a fresh tree, applying the admonition block
/// rule around `backend`.
pub fn render_document(backend: &dyn RendererBackend, markdown: &str) -> RichTextTree {
    let mut tree = RichTextTree::new();
    let root = tree.root();
    render_segments(backend, markdown, &mut tree, root);
    tree
}

pub(crate) fn render_segments(
    backend: &dyn RendererBackend,
    markdown: &str,
    tree: &mut RichTextTree,
    parent: NodeId,
) {
    for segment in admonition::split_segments(markdown) {
        match segment {
            admonition::Segment::Markdown(text) => {
                if !text.trim().is_empty() {
                    backend.render_into(&text, tree, parent);
                }
            }
            admonition::Segment::Admonition(block) => {
                let node = tree.create_element(Tag::Admonition);
                tree.append_child(parent, node);
                tree.set_attr(node, "type", block.kind.clone());
                if let Some(title) = &block.title {
                    tree.set_attr(node, "title", title.clone());
                }
                // The body is ordinary Markdown, admonitions included.
                render_segments(backend, &block.body, tree, node);
            }
        }
    }
}

/// The standard backend: pulldown-cmark with tables and strikethrough.
#[derive(Debug, Default)]
pub struct PulldownBackend;

impl PulldownBackend {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn options() -> Options {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options
    }
}

impl RendererBackend for PulldownBackend {
    fn render_into(&self, markdown: &str, tree: &mut RichTextTree, parent: NodeId) {
        let parser = Parser::new_ext(markdown, Self::options());
        let mut stack: Vec<NodeId> = vec![parent];

        for event in parser {
            let top = stack.last().copied().unwrap_or(parent);
            match event {
                Event::Start(tag) => {
                    let id = start_element(tree, top, tag);
                    stack.push(id);
                }
                Event::End(_) => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                Event::Text(text) => tree.push_text(top, &text),
                Event::Code(text) => {
                    let code = tree.create_element(Tag::InlineCode);
                    tree.append_child(top, code);
                    tree.push_text(code, &text);
                }
                Event::Html(html) => tree.push_text(top, &html),
                Event::InlineHtml(html) => {
                    let node = tree.create_element(Tag::InlineHtml);
                    tree.append_child(top, node);
                    tree.push_text(node, &html);
                }
                Event::SoftBreak => tree.push_text(top, "\n"),
                Event::HardBreak => {
                    let node = tree.create_element(Tag::HardBreak);
                    tree.append_child(top, node);
                }
                Event::Rule => {
                    let node = tree.create_element(Tag::Rule);
                    tree.append_child(top, node);
                }
                _ => {}
            }
        }
    }
}

fn start_element(tree: &mut RichTextTree, parent: NodeId, tag: CmTag) -> NodeId {
    let id = match tag {
        CmTag::Paragraph => tree.create_element(Tag::Paragraph),
        CmTag::Heading { level, .. } => tree.create_element(Tag::Heading(heading_level(level))),
        CmTag::BlockQuote(_) => tree.create_element(Tag::BlockQuote),
        CmTag::CodeBlock(kind) => {
            let node = tree.create_element(Tag::CodeBlock);
            if let CodeBlockKind::Fenced(info) = kind {
                apply_fence_info(tree, node, &info);
            }
            node
        }
        CmTag::List(start) => tree.create_element(Tag::List {
            ordered: start.is_some(),
        }),
        CmTag::Item => tree.create_element(Tag::ListItem),
        CmTag::Emphasis => tree.create_element(Tag::Emphasis),
        CmTag::Strong => tree.create_element(Tag::Strong),
        CmTag::Strikethrough => tree.create_element(Tag::Strikethrough),
        CmTag::Link {
            dest_url, title, ..
        } => {
            let node = tree.create_element(Tag::Link);
            tree.set_attr(node, "href", dest_url.to_string());
            if !title.is_empty() {
                tree.set_attr(node, "title", title.to_string());
            }
            node
        }
        CmTag::Image {
            dest_url, title, ..
        } => {
            let node = tree.create_element(Tag::Image);
            tree.set_attr(node, "src", dest_url.to_string());
            if !title.is_empty() {
                tree.set_attr(node, "title", title.to_string());
            }
            node
        }
        CmTag::Table(_) => tree.create_element(Tag::Table),
        CmTag::TableHead => tree.create_element(Tag::TableHead),
        CmTag::TableRow => tree.create_element(Tag::TableRow),
        CmTag::TableCell => {
            let header = matches!(tree.tag(parent), Some(Tag::TableHead));
            tree.create_element(Tag::TableCell { header })
        }
        CmTag::HtmlBlock => tree.create_element(Tag::HtmlBlock),
        _ => tree.create_element(Tag::Unknown),
    };
    tree.append_child(parent, id);
    id
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Split a fence info string into a language tag and `key="value"` pairs.
///
/// `python title="x.py" linenums="1"` carries the language plus attributes
/// the editing surface may show and update; everything lands in node attrs
/// so the serializer can rebuild the info string.
pub(crate) fn apply_fence_info(tree: &mut RichTextTree, node: NodeId, info: &str) {
    use regex::Regex;
    use std::sync::OnceLock;

    static ATTR_REGEX: OnceLock<Regex> = OnceLock::new();
    let attr_regex = ATTR_REGEX.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][A-Za-z0-9_-]*)="([^"]*)""#).expect("Invalid fence attr regex")
    });

    let mut rest = info.trim().to_string();
    let mut attrs: Vec<(String, String)> = Vec::new();
    for caps in attr_regex.captures_iter(info) {
        attrs.push((caps[1].to_string(), caps[2].to_string()));
    }
    // Remove attr spans, what is left first is the language tag.
    rest = attr_regex.replace_all(&rest, "").to_string();
    let lang = rest.split_whitespace().next().unwrap_or("");
    if !lang.is_empty() {
        tree.set_attr(node, "lang", lang);
    }
    for (name, value) in attrs {
        tree.set_attr(node, &name, value);
    }
}
