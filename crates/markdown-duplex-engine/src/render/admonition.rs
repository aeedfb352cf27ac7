//! Admonition callout block rule.
//!
//! `!!! <type> ["title"]` followed by lines indented by exactly four spaces
//! forms a titled callout container. The body is unindented and rendered as
//! ordinary Markdown. A missing title falls back to the type's default
//! display title; an explicitly empty title (`""`) suppresses the title
//! line. Unknown types still render, using the capitalized type string.

use regex::Regex;
use std::sync::OnceLock;

/// The callout kinds the serializer will emit `!!!` syntax for.
pub const ADMONITION_TYPES: [&str; 9] = [
    "note",
    "warning",
    "danger",
    "tip",
    "hint",
    "important",
    "caution",
    "error",
    "attention",
];

/// Display title used when the author gives none.
pub fn default_title(kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

pub fn is_known_type(kind: &str) -> bool {
    ADMONITION_TYPES.contains(&kind)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdmonitionBlock {
    pub kind: String,
    /// `None` = no title given, `Some("")` = explicitly suppressed.
    pub title: Option<String>,
    /// Body with the four-space indent removed.
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Markdown(String),
    Admonition(AdmonitionBlock),
}

fn header_regex() -> &'static Regex {
    static HEADER_REGEX: OnceLock<Regex> = OnceLock::new();
    HEADER_REGEX.get_or_init(|| {
        Regex::new(r#"^!!!\s+(\w+)(?:\s+"([^"]*)")?\s*$"#).expect("Invalid admonition regex")
    })
}

/// Split a document into plain-Markdown runs and admonition blocks.
///
/// The body of a callout is the run of contiguous lines indented by exactly
/// four spaces after the `!!!` header; a blank line ends it.
pub fn split_segments(markdown: &str) -> Vec<Segment> {
    let lines: Vec<&str> = markdown.split('\n').collect();
    let mut segments = Vec::new();
    let mut pending: Vec<&str> = Vec::new();
    let mut in_fence = false;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            pending.push(line);
            i += 1;
            continue;
        }
        if in_fence {
            pending.push(line);
            i += 1;
            continue;
        }
        if let Some(caps) = header_regex().captures(line) {
            if !pending.is_empty() {
                segments.push(Segment::Markdown(pending.join("\n")));
                pending.clear();
            }
            let kind = caps[1].to_lowercase();
            let title = caps.get(2).map(|m| m.as_str().to_string());
            let mut body_lines: Vec<&str> = Vec::new();
            let mut j = i + 1;
            while j < lines.len() && lines[j].starts_with("    ") {
                body_lines.push(&lines[j][4..]);
                j += 1;
            }
            let mut body = body_lines.join("\n");
            if !body.is_empty() {
                body.push('\n');
            }
            segments.push(Segment::Admonition(AdmonitionBlock { kind, title, body }));
            i = j;
        } else {
            pending.push(line);
            i += 1;
        }
    }

    if !pending.is_empty() && !pending.iter().all(|l| l.is_empty()) {
        segments.push(Segment::Markdown(pending.join("\n")));
    }
    segments
}
