//! Rich-text tree → Markdown serializer.
//!
//! Walks the tree and emits the *canonical* surface form for every
//! construct: inline links, `-` bullets, three-backtick fences, ` --- `
//! table rules. Original surface syntax is restored afterwards by the
//! fidelity ledger, never here. After the walk a post-pass collapses runs
//! of blank lines and strips line-trailing spaces, with already-emitted
//! code fences protected so their interior is never touched.

mod table;

use regex::Regex;
use std::sync::OnceLock;

use crate::render::admonition;
use crate::tree::{NodeId, NodeKind, RichTextTree, Tag};

/// Serialization context. Table cells switch the text rules (pipe escaping,
/// `<br>` line breaks) for everything below them.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Ctx {
    pub in_table_cell: bool,
}

/// Serialize a whole tree to canonical Markdown.
pub fn serialize(tree: &RichTextTree) -> String {
    tidy(&serialize_block_children(tree, tree.root(), Ctx::default()))
}

/// Serialize the block children of a container in order. Directly adjacent
/// lists (a bullet-glyph change splits one visual list into two parsed
/// lists) stay adjacent: the blank line between them is dropped so the
/// original line layout survives a round trip.
pub(crate) fn serialize_block_children(tree: &RichTextTree, id: NodeId, ctx: Ctx) -> String {
    let children = tree.children(id);
    let mut out = String::new();
    for (index, &child) in children.iter().enumerate() {
        let mut piece = node_to_markdown(tree, child, ctx);
        let next_is_list = children
            .get(index + 1)
            .is_some_and(|&n| matches!(tree.tag(n), Some(Tag::List { .. })));
        if matches!(tree.tag(child), Some(Tag::List { .. }))
            && next_is_list
            && piece.ends_with("\n\n")
        {
            piece.truncate(piece.len() - 1);
        }
        out.push_str(&piece);
    }
    out
}

pub(crate) fn node_to_markdown(tree: &RichTextTree, id: NodeId, ctx: Ctx) -> String {
    let Some(node) = tree.get(id) else {
        return String::new();
    };
    match &node.kind {
        NodeKind::Text(text) => text_to_markdown(text, ctx),
        NodeKind::Element(tag) => match tag {
            Tag::Root | Tag::Unknown => inline_children(tree, id, ctx),
            Tag::Paragraph => paragraph_to_markdown(tree, id, ctx),
            Tag::Heading(level) => heading_to_markdown(tree, id, *level, ctx),
            Tag::Emphasis => format!("*{}*", inline_children(tree, id, ctx).trim()),
            Tag::Strong => format!("**{}**", inline_children(tree, id, ctx).trim()),
            Tag::Strikethrough => format!("~~{}~~", inline_children(tree, id, ctx).trim()),
            Tag::Link => {
                let text = inline_children(tree, id, ctx);
                let href = tree.attr(id, "href").unwrap_or("");
                format!("[{}]({})", text.trim(), href)
            }
            Tag::Image => image_to_markdown(tree, id, ctx),
            Tag::InlineCode => {
                let content = tree.flattened_text(id);
                let mut content = content.trim().to_string();
                if ctx.in_table_cell {
                    content = content.replace('|', "\\|");
                }
                format!("`{content}`")
            }
            Tag::CodeBlock => code_block_to_markdown(tree, id, ctx),
            Tag::List { ordered } => list_block_to_markdown(tree, id, *ordered, ctx),
            Tag::ListItem => inline_children(tree, id, ctx).trim().to_string(),
            Tag::BlockQuote => blockquote_to_markdown(tree, id, ctx),
            Tag::Table => table::table_to_markdown(tree, id, ctx),
            Tag::TableHead | Tag::TableRow | Tag::TableCell { .. } => {
                inline_children(tree, id, ctx)
            }
            Tag::Admonition => admonition_to_markdown(tree, id, ctx),
            Tag::HardBreak => {
                if ctx.in_table_cell {
                    "<br>".to_string()
                } else {
                    "\n".to_string()
                }
            }
            Tag::Rule => {
                if ctx.in_table_cell {
                    "---".to_string()
                } else {
                    "\n---\n\n".to_string()
                }
            }
            Tag::HtmlBlock => {
                let raw = tree.flattened_text(id);
                let trimmed = raw.trim_end();
                if trimmed.is_empty() {
                    String::new()
                } else {
                    format!("{trimmed}\n\n")
                }
            }
            Tag::InlineHtml => tree.flattened_text(id),
        },
    }
}

pub(crate) fn inline_children(tree: &RichTextTree, id: NodeId, ctx: Ctx) -> String {
    let mut out = String::new();
    for &child in tree.children(id) {
        out.push_str(&node_to_markdown(tree, child, ctx));
    }
    out
}

fn text_to_markdown(text: &str, ctx: Ctx) -> String {
    static SPACE_RUNS: OnceLock<Regex> = OnceLock::new();
    if ctx.in_table_cell {
        return text.replace('|', "\\|").replace('\n', "<br>");
    }
    let space_runs =
        SPACE_RUNS.get_or_init(|| Regex::new(r"  +").expect("Invalid space-run regex"));
    space_runs.replace_all(text, " ").to_string()
}

fn paragraph_to_markdown(tree: &RichTextTree, id: NodeId, ctx: Ctx) -> String {
    let content = inline_children(tree, id, ctx);
    if ctx.in_table_cell {
        return content;
    }
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    // Paragraphs inside list items join the item as continuation lines;
    // block quotes keep full paragraph separation so interior blank quote
    // lines survive.
    let parent_tag = tree.parent(id).and_then(|p| tree.tag(p));
    if matches!(parent_tag, Some(Tag::ListItem)) {
        static BLANKS: OnceLock<Regex> = OnceLock::new();
        let blanks =
            BLANKS.get_or_init(|| Regex::new(r"\n\s*\n").expect("Invalid blank-run regex"));
        let collapsed = blanks.replace_all(trimmed, "\n");
        return format!("{}\n", collapsed.trim());
    }
    format!("{trimmed}\n\n")
}

fn heading_to_markdown(tree: &RichTextTree, id: NodeId, level: u8, ctx: Ctx) -> String {
    let content = inline_children(tree, id, ctx);
    if ctx.in_table_cell {
        return content;
    }
    let level = level.clamp(1, 6) as usize;
    format!("{} {}\n\n", "#".repeat(level), content.trim())
}

fn image_to_markdown(tree: &RichTextTree, id: NodeId, ctx: Ctx) -> String {
    let src = tree.attr(id, "src").unwrap_or("");
    let alt = tree.flattened_text(id);
    if ctx.in_table_cell {
        // Cells cannot hold block images; keep them as inline HTML.
        return format!(
            "<img src=\"{}\" alt=\"{}\">",
            html_escape::encode_double_quoted_attribute(src),
            html_escape::encode_double_quoted_attribute(&alt)
        );
    }
    let inline = format!("![{alt}]({src})");
    // A bare image sitting directly at the top level is its own block.
    if tree.parent(id) == Some(tree.root()) {
        return format!("{inline}\n\n");
    }
    inline
}

fn code_block_to_markdown(tree: &RichTextTree, id: NodeId, ctx: Ctx) -> String {
    if ctx.in_table_cell {
        let content = tree.flattened_text(id);
        return format!("`{}`", content.trim().replace('|', "\\|"));
    }
    let children = tree.children(id);
    // The editing surface can fragment one block into several sibling nodes
    // (interactive line splitting); join every child's text with explicit
    // newlines instead of relying on a single well-formed child.
    let mut content = if children.len() > 1 {
        children
            .iter()
            .map(|&c| tree.flattened_text(c))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        tree.flattened_text(id)
    };
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    let mut parts: Vec<String> = Vec::new();
    if let Some(lang) = tree.attr(id, "lang")
        && !lang.is_empty()
    {
        parts.push(lang.to_string());
    }
    if let Some(node) = tree.get(id) {
        for (name, value) in &node.attrs {
            if name == "lang" {
                continue;
            }
            parts.push(format!("{name}=\"{value}\""));
        }
    }
    let info = parts.join(" ");
    format!("```{info}\n{content}```\n\n")
}

fn list_block_to_markdown(tree: &RichTextTree, id: NodeId, ordered: bool, ctx: Ctx) -> String {
    if ctx.in_table_cell {
        let items: Vec<String> = tree
            .children(id)
            .iter()
            .map(|&li| inline_children(tree, li, ctx).trim().to_string())
            .collect();
        return items.join("<br>");
    }
    let mut md = list_to_markdown(tree, id, "", ordered, ctx);
    if md.trim().is_empty() {
        return String::new();
    }
    if !md.ends_with('\n') {
        md.push('\n');
    }
    md.push('\n');
    md
}

fn list_to_markdown(
    tree: &RichTextTree,
    list: NodeId,
    indent: &str,
    ordered: bool,
    ctx: Ctx,
) -> String {
    let mut out = String::new();
    let mut counter = 1usize;
    for &li in tree.children(list) {
        if tree.tag(li) != Some(&Tag::ListItem) {
            continue;
        }
        let mut text_content = String::new();
        let mut nested: Vec<String> = Vec::new();
        for &child in tree.children(li) {
            if let Some(Tag::List {
                ordered: nested_ordered,
            }) = tree.tag(child)
            {
                let nested_ordered = *nested_ordered;
                let child_indent = format!("{indent}  ");
                nested.push(list_to_markdown(
                    tree,
                    child,
                    &child_indent,
                    nested_ordered,
                    ctx,
                ));
            } else {
                text_content.push_str(&node_to_markdown(tree, child, ctx));
            }
        }
        // First line goes after the marker; further content lines are
        // re-indented under the item. Sub-lists keep their own indentation.
        let trimmed = text_content.trim().to_string();
        let mut lines = trimmed.split('\n');
        let mut processed = lines.next().unwrap_or("").trim_end().to_string();
        for line in lines {
            if !line.trim().is_empty() {
                processed.push('\n');
                processed.push_str(indent);
                processed.push_str("  ");
                processed.push_str(line.trim_start());
            }
        }
        let marker = if ordered {
            format!("{counter}. ")
        } else {
            "- ".to_string()
        };
        out.push_str(indent);
        out.push_str(&marker);
        out.push_str(processed.trim_end());
        out.push('\n');
        for n in &nested {
            out.push_str(n);
        }
        counter += 1;
    }
    out
}

fn blockquote_to_markdown(tree: &RichTextTree, id: NodeId, ctx: Ctx) -> String {
    if ctx.in_table_cell {
        return inline_children(tree, id, ctx);
    }
    let inner = serialize_block_children(tree, id, ctx);
    let mut lines: Vec<&str> = inner.split('\n').collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        return String::new();
    }
    let quoted: Vec<String> = lines
        .iter()
        .map(|l| {
            let t = l.trim();
            if t.is_empty() {
                ">".to_string()
            } else {
                format!("> {t}")
            }
        })
        .collect();
    format!("{}\n\n", quoted.join("\n"))
}

fn admonition_to_markdown(tree: &RichTextTree, id: NodeId, ctx: Ctx) -> String {
    let kind = tree.attr(id, "type").unwrap_or("").to_string();
    if ctx.in_table_cell {
        return inline_children(tree, id, ctx);
    }
    let body = serialize_block_children(tree, id, ctx);
    if !admonition::is_known_type(&kind) {
        // Unrecognized callout kinds fall through to their block content.
        return body;
    }
    let body = body.trim().to_string();
    let mut out = format!("!!! {kind}");
    match tree.attr(id, "title") {
        Some("") => out.push_str(" \"\""),
        Some(title) if title != admonition::default_title(&kind) => {
            out.push_str(&format!(" \"{}\"", title.replace('"', "\\\"")));
        }
        _ => {}
    }
    out.push('\n');
    if !body.is_empty() {
        for line in body.split('\n') {
            if line.is_empty() {
                out.push('\n');
            } else {
                out.push_str("    ");
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out.push('\n');
    out
}

/// Post-pass: protect emitted code fences, collapse runs of blank lines to
/// one, strip trailing spaces at line ends, unprotect, trim.
pub(crate) fn tidy(markdown: &str) -> String {
    static CODE_BLOCKS: OnceLock<Regex> = OnceLock::new();
    static BLANK_RUNS: OnceLock<Regex> = OnceLock::new();
    static TRAILING_SPACES: OnceLock<Regex> = OnceLock::new();

    let code_blocks = CODE_BLOCKS
        .get_or_init(|| Regex::new(r"(?s)```[^\n]*\n.*?```").expect("Invalid code-span regex"));
    let blank_runs = BLANK_RUNS
        .get_or_init(|| Regex::new(r"\n\s*\n\s*\n+").expect("Invalid blank-run regex"));
    let trailing_spaces = TRAILING_SPACES
        .get_or_init(|| Regex::new(r" +\n").expect("Invalid trailing-space regex"));

    let mut protected: Vec<String> = Vec::new();
    let shielded = code_blocks.replace_all(markdown, |caps: &regex::Captures| {
        let index = protected.len();
        protected.push(caps[0].to_string());
        format!("\u{0}__CODEBLOCK_{index}__\u{0}")
    });

    let collapsed = blank_runs.replace_all(&shielded, "\n\n");
    let mut result = trailing_spaces.replace_all(&collapsed, "\n").to_string();

    for (index, block) in protected.iter().enumerate() {
        result = result.replace(&format!("\u{0}__CODEBLOCK_{index}__\u{0}"), block);
    }
    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{PulldownBackend, render_document};
    use pretty_assertions::assert_eq;

    fn roundtrip(markdown: &str) -> String {
        serialize(&render_document(&PulldownBackend::new(), markdown))
    }

    // ============ Canonical idempotence ============

    #[test]
    fn test_heading_paragraph_list_roundtrip() {
        let md = "# Title\n\nPara here.\n\n- item one\n- item two";
        assert_eq!(roundtrip(md), md);
    }

    #[test]
    fn test_nested_list_keeps_depth() {
        let md = "- a\n  - b\n    - c";
        assert_eq!(roundtrip(md), md);
    }

    #[test]
    fn test_ordered_list_renumbers_from_one() {
        assert_eq!(roundtrip("3. three\n4. four"), "1. three\n2. four");
    }

    #[test]
    fn test_adjacent_lists_stay_adjacent() {
        // A glyph change splits one visual list into two parsed lists; the
        // canonical form keeps them on consecutive lines.
        assert_eq!(roundtrip("- a\n* b"), "- a\n- b");
    }

    #[test]
    fn test_blockquote_roundtrip() {
        assert_eq!(roundtrip("> quoted line"), "> quoted line");
        assert_eq!(roundtrip("> a\n>\n> b"), "> a\n>\n> b");
    }

    #[test]
    fn test_code_fence_with_metadata_roundtrip() {
        let md = "```python title=\"x.py\"\nprint(1)\n```";
        assert_eq!(roundtrip(md), md);
    }

    #[test]
    fn test_table_roundtrip() {
        let md = "| a | b |\n| --- | --- |\n| 1 | 2 |";
        assert_eq!(roundtrip(md), md);
    }

    #[test]
    fn test_thematic_break_roundtrip() {
        assert_eq!(roundtrip("before\n\n---\n\nafter"), "before\n\n---\n\nafter");
    }

    #[test]
    fn test_admonition_roundtrip() {
        let md = "!!! warning \"Careful\"\n    the body";
        assert_eq!(roundtrip(md), md);
    }

    #[test]
    fn test_admonition_default_title_is_omitted() {
        assert_eq!(roundtrip("!!! note \"Note\"\n    body"), "!!! note\n    body");
    }

    #[test]
    fn test_admonition_empty_title_is_kept() {
        assert_eq!(roundtrip("!!! note \"\"\n    body"), "!!! note \"\"\n    body");
    }

    // ============ Normalization rules ============

    #[test]
    fn test_interior_space_runs_collapse() {
        assert_eq!(roundtrip("Foo.  Bar baz"), "Foo. Bar baz");
    }

    #[test]
    fn test_links_normalize_to_inline_form() {
        assert_eq!(
            roundtrip("[x][1]\n\n[1]: http://a.com"),
            "[x](http://a.com)"
        );
    }

    #[test]
    fn test_soft_breaks_survive_inside_paragraphs() {
        assert_eq!(roundtrip("line one\nline two"), "line one\nline two");
    }

    #[test]
    fn test_inline_image_stays_inline() {
        assert_eq!(
            roundtrip("before ![alt](i.png) after"),
            "before ![alt](i.png) after"
        );
    }

    // ============ Fragmented code blocks ============

    #[test]
    fn test_fragmented_code_block_children_are_joined() {
        let mut tree = RichTextTree::new();
        let block = tree.create_element(Tag::CodeBlock);
        tree.append_child(tree.root(), block);
        tree.set_attr(block, "lang", "python");
        let first = tree.create_text("print(1)");
        tree.append_child(block, first);
        let second = tree.create_text("print(2)");
        tree.append_child(block, second);
        assert_eq!(serialize(&tree), "```python\nprint(1)\nprint(2)\n```");
    }

    #[test]
    fn test_code_block_without_trailing_newline_gets_one() {
        let mut tree = RichTextTree::new();
        let block = tree.create_element(Tag::CodeBlock);
        tree.append_child(tree.root(), block);
        let text = tree.create_text("lonely()");
        tree.append_child(block, text);
        assert_eq!(serialize(&tree), "```\nlonely()\n```");
    }

    // ============ Table cell context ============

    #[test]
    fn test_cell_pipes_are_escaped() {
        let md = "| a | b |\n| --- | --- |\n| x\\|y | 2 |";
        assert_eq!(roundtrip(md), md);
    }

    #[test]
    fn test_cell_newlines_become_br() {
        let mut tree = RichTextTree::new();
        let table = tree.create_element(Tag::Table);
        tree.append_child(tree.root(), table);
        let head = tree.create_element(Tag::TableHead);
        tree.append_child(table, head);
        let cell = tree.create_element(Tag::TableCell { header: true });
        tree.append_child(head, cell);
        tree.push_text(cell, "two\nlines");
        assert_eq!(serialize(&tree), "| two<br>lines |\n| --- |");
    }

    #[test]
    fn test_cell_image_becomes_inline_html() {
        let mut tree = RichTextTree::new();
        let table = tree.create_element(Tag::Table);
        tree.append_child(tree.root(), table);
        let head = tree.create_element(Tag::TableHead);
        tree.append_child(table, head);
        let cell = tree.create_element(Tag::TableCell { header: true });
        tree.append_child(head, cell);
        let image = tree.create_element(Tag::Image);
        tree.append_child(cell, image);
        tree.set_attr(image, "src", "i.png");
        tree.push_text(image, "say \"hi\"");
        assert_eq!(
            serialize(&tree),
            "| <img src=\"i.png\" alt=\"say &quot;hi&quot;\"> |\n| --- |"
        );
    }

    // ============ Post-pass ============

    #[test]
    fn test_blank_line_runs_collapse_outside_code() {
        let tidied = tidy("a\n\n\n\nb\n");
        assert_eq!(tidied, "a\n\nb");
    }

    #[test]
    fn test_code_interior_blank_lines_survive_tidy() {
        let input = "```\nline\n\n\n\nmore\n```\n\n\n\nafter\n";
        assert_eq!(tidy(input), "```\nline\n\n\n\nmore\n```\n\nafter");
    }

    #[test]
    fn test_trailing_spaces_stripped_outside_code() {
        assert_eq!(tidy("word   \nnext\n"), "word\nnext");
    }

    // ============ Degradations ============

    #[test]
    fn test_unknown_admonition_type_degrades_to_blocks() {
        let mut tree = RichTextTree::new();
        let adm = tree.create_element(Tag::Admonition);
        tree.append_child(tree.root(), adm);
        tree.set_attr(adm, "type", "mystery");
        let para = tree.create_element(Tag::Paragraph);
        tree.append_child(adm, para);
        tree.push_text(para, "just content");
        assert_eq!(serialize(&tree), "just content");
    }

    #[test]
    fn test_unknown_leaf_degrades_to_text() {
        let mut tree = RichTextTree::new();
        let node = tree.create_element(Tag::Unknown);
        tree.append_child(tree.root(), node);
        tree.push_text(node, "stray  content");
        assert_eq!(serialize(&tree), "stray content");
    }
}
