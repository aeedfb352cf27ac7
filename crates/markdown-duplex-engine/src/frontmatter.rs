//! Frontmatter splitting.
//!
//! A leading `---`-fenced metadata block is split off before anything else
//! sees the document and reattached on the way out; neither the renderer
//! nor the fidelity ledger ever touches it. With no frontmatter, `join`
//! after `split` is the identity.

use regex::Regex;
use std::sync::OnceLock;

fn frontmatter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^(---[ \t]*\r?\n.*?\r?\n---[ \t]*(?:\r?\n)*)(.*)$")
            .expect("Invalid frontmatter regex")
    })
}

/// Split a document into `(frontmatter, body)`. The frontmatter keeps its
/// delimiters but not trailing blank lines; absent frontmatter yields an
/// empty first element.
pub fn split(content: &str) -> (String, String) {
    match frontmatter_regex().captures(content) {
        Some(caps) => (caps[1].trim_end().to_string(), caps[2].to_string()),
        None => (String::new(), content.to_string()),
    }
}

/// Reattach frontmatter to a body. Identity when the frontmatter is empty.
pub fn join(frontmatter: &str, body: &str) -> String {
    if frontmatter.is_empty() {
        body.to_string()
    } else {
        format!("{frontmatter}\n{body}")
    }
}
