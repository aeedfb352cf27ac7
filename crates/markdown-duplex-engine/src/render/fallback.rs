//! Fixed-rule degraded renderer.
//!
//! Stands in when the real Markdown parser is unavailable: ATX headings up
//! to level three, bold/italic/strikethrough, inline links and images, one
//! level of lists, and block quotes. Fidelity-ledger and cursor-mapping
//! guarantees are not claimed on this path.

use regex::Regex;
use std::sync::OnceLock;

use super::RendererBackend;
use crate::tree::{NodeId, RichTextTree, Tag};

#[derive(Debug, Default)]
pub struct FallbackBackend;

impl FallbackBackend {
    pub fn new() -> Self {
        Self
    }
}

impl RendererBackend for FallbackBackend {
    fn render_into(&self, markdown: &str, tree: &mut RichTextTree, parent: NodeId) {
        for block in markdown.split("\n\n") {
            let block = block.trim_matches('\n');
            if block.trim().is_empty() {
                continue;
            }
            render_block(block, tree, parent);
        }
    }
}

fn render_block(block: &str, tree: &mut RichTextTree, parent: NodeId) {
    let lines: Vec<&str> = block.lines().collect();

    if let Some(rest) = block.strip_prefix("### ") {
        let node = tree.create_element(Tag::Heading(3));
        tree.append_child(parent, node);
        render_inline(rest.trim(), tree, node);
    } else if let Some(rest) = block.strip_prefix("## ") {
        let node = tree.create_element(Tag::Heading(2));
        tree.append_child(parent, node);
        render_inline(rest.trim(), tree, node);
    } else if let Some(rest) = block.strip_prefix("# ") {
        let node = tree.create_element(Tag::Heading(1));
        tree.append_child(parent, node);
        render_inline(rest.trim(), tree, node);
    } else if lines.iter().all(|l| is_bullet_line(l)) {
        let list = tree.create_element(Tag::List { ordered: false });
        tree.append_child(parent, list);
        for line in &lines {
            let item = tree.create_element(Tag::ListItem);
            tree.append_child(list, item);
            render_inline(bullet_content(line), tree, item);
        }
    } else if lines.iter().all(|l| is_numbered_line(l)) {
        let list = tree.create_element(Tag::List { ordered: true });
        tree.append_child(parent, list);
        for line in &lines {
            let item = tree.create_element(Tag::ListItem);
            tree.append_child(list, item);
            render_inline(numbered_content(line), tree, item);
        }
    } else if lines.iter().all(|l| l.starts_with('>')) {
        let quote = tree.create_element(Tag::BlockQuote);
        tree.append_child(parent, quote);
        let para = tree.create_element(Tag::Paragraph);
        tree.append_child(quote, para);
        let text = lines
            .iter()
            .map(|l| l.trim_start_matches('>').trim())
            .collect::<Vec<_>>()
            .join("\n");
        render_inline(&text, tree, para);
    } else {
        let para = tree.create_element(Tag::Paragraph);
        tree.append_child(parent, para);
        render_inline(block, tree, para);
    }
}

fn is_bullet_line(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("- ") || t.starts_with("* ") || t.starts_with("+ ")
}

fn bullet_content(line: &str) -> &str {
    &line.trim_start()[2..]
}

fn is_numbered_line(line: &str) -> bool {
    static NUMBERED: OnceLock<Regex> = OnceLock::new();
    NUMBERED
        .get_or_init(|| Regex::new(r"^\s*\d+\.\s+").expect("Invalid numbered-line regex"))
        .is_match(line)
}

fn numbered_content(line: &str) -> &str {
    let t = line.trim_start();
    match t.find(". ") {
        Some(pos) => &t[pos + 2..],
        None => t,
    }
}

/// One-pass, non-nesting inline scan: bold, italic, strikethrough, images,
/// links, the rest plain text.
fn render_inline(text: &str, tree: &mut RichTextTree, parent: NodeId) {
    static INLINE: OnceLock<Regex> = OnceLock::new();
    let inline = INLINE.get_or_init(|| {
        Regex::new(
            r"(?x)
            (?P<strong>\*\*[^*]+\*\*)
            | (?P<strike>~~[^~]+~~)
            | (?P<em>\*[^*]+\*)
            | (?P<image>!\[[^\]]*\]\([^)\s]+\))
            | (?P<link>\[[^\]]*\]\([^)\s]+\))
            ",
        )
        .expect("Invalid inline regex")
    });

    let mut cursor = 0;
    for m in inline.find_iter(text) {
        if m.start() > cursor {
            tree.push_text(parent, &text[cursor..m.start()]);
        }
        let piece = m.as_str();
        if let Some(inner) = piece
            .strip_prefix("**")
            .and_then(|p| p.strip_suffix("**"))
        {
            let node = tree.create_element(Tag::Strong);
            tree.append_child(parent, node);
            tree.push_text(node, inner);
        } else if let Some(inner) = piece.strip_prefix("~~").and_then(|p| p.strip_suffix("~~")) {
            let node = tree.create_element(Tag::Strikethrough);
            tree.append_child(parent, node);
            tree.push_text(node, inner);
        } else if let Some(inner) = piece.strip_prefix('*').and_then(|p| p.strip_suffix('*')) {
            let node = tree.create_element(Tag::Emphasis);
            tree.append_child(parent, node);
            tree.push_text(node, inner);
        } else if piece.starts_with("![") {
            if let Some((alt, src)) = split_link_piece(&piece[1..]) {
                let node = tree.create_element(Tag::Image);
                tree.append_child(parent, node);
                tree.set_attr(node, "src", src);
                tree.push_text(node, alt);
            }
        } else if let Some((label, href)) = split_link_piece(piece) {
            let node = tree.create_element(Tag::Link);
            tree.append_child(parent, node);
            tree.set_attr(node, "href", href);
            tree.push_text(node, label);
        }
        cursor = m.end();
    }
    if cursor < text.len() {
        tree.push_text(parent, &text[cursor..]);
    }
}

/// Split `[label](target)` into its two halves.
fn split_link_piece(piece: &str) -> Option<(&str, &str)> {
    let close = piece.find("](")?;
    let label = &piece[1..close];
    let target = &piece[close + 2..piece.len().saturating_sub(1)];
    Some((label, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::render_document;

    fn render(markdown: &str) -> RichTextTree {
        render_document(&FallbackBackend::new(), markdown)
    }

    #[test]
    fn test_fallback_heading() {
        let tree = render("## Section");
        let node = tree.children(tree.root())[0];
        assert_eq!(tree.tag(node), Some(&Tag::Heading(2)));
        assert_eq!(tree.flattened_text(node), "Section");
    }

    #[test]
    fn test_fallback_list_single_level() {
        let tree = render("- one\n- two");
        let list = tree.children(tree.root())[0];
        assert_eq!(tree.tag(list), Some(&Tag::List { ordered: false }));
        assert_eq!(tree.children(list).len(), 2);
    }

    #[test]
    fn test_fallback_blockquote() {
        let tree = render("> quoted words");
        let quote = tree.children(tree.root())[0];
        assert_eq!(tree.tag(quote), Some(&Tag::BlockQuote));
        assert_eq!(tree.flattened_text(quote), "quoted words");
    }

    #[test]
    fn test_fallback_inline_marks() {
        let tree = render("plain **bold** and *em* end");
        let para = tree.children(tree.root())[0];
        let tags: Vec<_> = tree
            .children(para)
            .iter()
            .filter_map(|&c| tree.tag(c).cloned())
            .collect();
        assert!(tags.contains(&Tag::Strong));
        assert!(tags.contains(&Tag::Emphasis));
    }

    #[test]
    fn test_fallback_link_and_image() {
        let tree = render("see [docs](http://d.io) and ![pic](i.png)");
        let para = tree.children(tree.root())[0];
        let link = tree
            .children(para)
            .iter()
            .find(|&&c| tree.tag(c) == Some(&Tag::Link))
            .copied()
            .unwrap();
        assert_eq!(tree.attr(link, "href"), Some("http://d.io"));
        let image = tree
            .children(para)
            .iter()
            .find(|&&c| tree.tag(c) == Some(&Tag::Image))
            .copied()
            .unwrap();
        assert_eq!(tree.attr(image, "src"), Some("i.png"));
    }

    #[test]
    fn test_fallback_admonitions_still_split() {
        // The admonition rule sits above the backend, so even the degraded
        // renderer produces callout containers.
        let tree = render("!!! note\n    body here\n");
        let node = tree.children(tree.root())[0];
        assert_eq!(tree.tag(node), Some(&Tag::Admonition));
    }
}
