//! Code block style preservation.
//!
//! Remembers whether a block was fenced or indent-style, the original fence
//! character and length, and the full info string, keyed by block content
//! with trailing whitespace stripped. A `title="…"` value changed by the
//! editing surface wins over the captured one. Extraction reads the opening
//! fence line straight out of the source via pulldown-cmark's offset
//! iterator, so nothing is guessed.

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};
use regex::{NoExpand, Regex};
use std::sync::OnceLock;

use crate::render::PulldownBackend;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CodeStyle {
    Fenced { fence: String, info: String },
    Indented,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CodeBlockRecord {
    /// Block content with trailing whitespace stripped.
    pub key: String,
    pub style: CodeStyle,
}

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"title="([^"]*)""#).expect("Invalid title attr regex"))
}

pub(crate) fn preprocess(markdown: &str) -> Vec<CodeBlockRecord> {
    let mut records = Vec::new();
    let parser = Parser::new_ext(markdown, PulldownBackend::options()).into_offset_iter();
    let mut current: Option<(CodeStyle, String)> = None;

    for (event, range) in parser {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let style = match kind {
                    CodeBlockKind::Indented => CodeStyle::Indented,
                    CodeBlockKind::Fenced(_) => {
                        let source = &markdown[range.clone()];
                        let first_line = source.lines().next().unwrap_or("");
                        let trimmed = first_line.trim_start();
                        let fence_char = trimmed.chars().next().unwrap_or('`');
                        let fence_len =
                            trimmed.chars().take_while(|&c| c == fence_char).count();
                        CodeStyle::Fenced {
                            fence: trimmed[..fence_len].to_string(),
                            info: trimmed[fence_len..].trim().to_string(),
                        }
                    }
                };
                current = Some((style, String::new()));
            }
            Event::Text(text) => {
                if let Some((_, content)) = current.as_mut() {
                    content.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((style, content)) = current.take() {
                    records.push(CodeBlockRecord {
                        key: content.trim_end().to_string(),
                        style,
                    });
                }
            }
            _ => {}
        }
    }
    records
}

pub(crate) fn postprocess(markdown: &str, records: &[CodeBlockRecord]) -> String {
    if records.is_empty() {
        return markdown.to_string();
    }
    let mut used = vec![false; records.len()];
    let lines: Vec<&str> = markdown.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if let Some(info) = line.strip_prefix("```") {
            let mut j = i + 1;
            while j < lines.len() && lines[j] != "```" {
                j += 1;
            }
            if j < lines.len() {
                let content_lines = &lines[i + 1..j];
                let joined = content_lines.join("\n");
                let key = joined.trim_end();
                let serialized_info = info.trim();
                let matched = records
                    .iter()
                    .enumerate()
                    .find(|(index, record)| !used[*index] && record.key == key);
                if let Some((index, record)) = matched {
                    used[index] = true;
                    emit_restored(&mut out, record, serialized_info, content_lines);
                } else {
                    for l in &lines[i..=j] {
                        out.push(l.to_string());
                    }
                }
                i = j + 1;
                continue;
            }
        }
        out.push(line.to_string());
        i += 1;
    }
    out.join("\n")
}

fn emit_restored(
    out: &mut Vec<String>,
    record: &CodeBlockRecord,
    serialized_info: &str,
    content_lines: &[&str],
) {
    match &record.style {
        // An indented block cannot carry an info string; if the surface
        // added metadata, the block stays fenced.
        CodeStyle::Indented if serialized_info.is_empty() => {
            for l in content_lines {
                if l.is_empty() {
                    out.push(String::new());
                } else {
                    out.push(format!("    {l}"));
                }
            }
        }
        CodeStyle::Indented => {
            out.push(format!("```{serialized_info}"));
            for l in content_lines {
                out.push(l.to_string());
            }
            out.push("```".to_string());
        }
        CodeStyle::Fenced { fence, info } => {
            let merged = merge_info(info, serialized_info);
            out.push(format!("{fence}{merged}"));
            for l in content_lines {
                out.push(l.to_string());
            }
            out.push(fence.clone());
        }
    }
}

/// The original info string, with the title value updated when the editing
/// surface changed it.
fn merge_info(original: &str, serialized: &str) -> String {
    let Some(new_title) = title_regex()
        .captures(serialized)
        .map(|caps| caps[1].to_string())
    else {
        return original.to_string();
    };
    if let Some(caps) = title_regex().captures(original) {
        if caps[1] == new_title {
            original.to_string()
        } else {
            title_regex()
                .replace(original, NoExpand(&format!("title=\"{new_title}\"")))
                .to_string()
        }
    } else if original.is_empty() {
        format!("title=\"{new_title}\"")
    } else {
        format!("{original} title=\"{new_title}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_preprocess_reads_fence_verbatim() {
        let records = preprocess("~~~~python\ncode()\n~~~~\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "code()");
        assert_eq!(
            records[0].style,
            CodeStyle::Fenced {
                fence: "~~~~".to_string(),
                info: "python".to_string()
            }
        );
    }

    #[test]
    fn test_preprocess_detects_indented_blocks() {
        let records = preprocess("para\n\n    indented code\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].style, CodeStyle::Indented);
        assert_eq!(records[0].key, "indented code");
    }

    #[test]
    fn test_tilde_fence_is_restored() {
        let records = preprocess("~~~~python\ncode()\n~~~~\n");
        let canonical = "```python\ncode()\n```";
        assert_eq!(postprocess(canonical, &records), "~~~~python\ncode()\n~~~~");
    }

    #[test]
    fn test_indented_style_is_restored() {
        let records = preprocess("    one()\n    two()\n");
        let canonical = "```\none()\ntwo()\n```";
        assert_eq!(postprocess(canonical, &records), "    one()\n    two()");
    }

    #[test]
    fn test_indented_block_with_new_language_stays_fenced() {
        let records = preprocess("    code()\n");
        let canonical = "```python\ncode()\n```";
        assert_eq!(postprocess(canonical, &records), canonical);
    }

    #[test]
    fn test_title_value_update_wins() {
        let records = preprocess("```python title=\"old.py\"\nx = 1\n```\n");
        let canonical = "```python title=\"new.py\"\nx = 1\n```";
        assert_eq!(
            postprocess(canonical, &records),
            "```python title=\"new.py\"\nx = 1\n```"
        );
    }

    #[test]
    fn test_info_string_restored_exactly_when_title_unchanged() {
        let original = "```python   title=\"x.py\"\nx = 1\n```";
        let records = preprocess(original);
        let canonical = "```python title=\"x.py\"\nx = 1\n```";
        assert_eq!(
            postprocess(canonical, &records),
            "```python   title=\"x.py\"\nx = 1\n```"
        );
    }

    #[test]
    fn test_changed_content_keeps_canonical_fence() {
        let records = preprocess("~~~~\nold content\n~~~~\n");
        let canonical = "```\nnew content\n```";
        assert_eq!(postprocess(canonical, &records), canonical);
    }

    #[test]
    fn test_two_blocks_restore_in_document_order() {
        let original = "~~~\nfirst\n~~~\n\n    second\n";
        let records = preprocess(original);
        assert_eq!(records.len(), 2);
        let canonical = "```\nfirst\n```\n\n```\nsecond\n```";
        assert_eq!(postprocess(canonical, &records), "~~~\nfirst\n~~~\n\n    second");
    }
}
