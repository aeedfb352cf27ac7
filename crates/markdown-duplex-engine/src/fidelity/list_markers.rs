//! Bullet glyph preservation for unordered lists.
//!
//! The serializer always emits `- `; this pass remembers which of `-`, `*`,
//! `+` each item originally used, keyed by indent + item text. Items whose
//! content changed (or that are new) keep the canonical dash.

use regex::{Captures, Regex};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ListMarkerRecord {
    pub indent: String,
    pub marker: String,
    pub content: String,
}

fn item_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^([ \t]*)([-*+])[ \t]+(.*)$").expect("Invalid list item regex")
    })
}

fn canonical_item_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^([ \t]*)(-[ \t]+)(.*)$").expect("Invalid canonical item regex")
    })
}

pub(crate) fn preprocess(markdown: &str) -> Vec<ListMarkerRecord> {
    item_regex()
        .captures_iter(markdown)
        .map(|caps| ListMarkerRecord {
            indent: caps[1].to_string(),
            marker: format!("{} ", &caps[2]),
            content: caps[3].to_string(),
        })
        .collect()
}

/// Restore original glyphs onto canonical `- ` items, consuming records in
/// document order: the scan pointer only moves forward, so a matched record
/// never fires twice and earlier records cannot match later lines.
pub(crate) fn postprocess(markdown: &str, records: &[ListMarkerRecord]) -> String {
    if records.is_empty() {
        return markdown.to_string();
    }
    let mut used = 0usize;
    canonical_item_regex()
        .replace_all(markdown, |caps: &Captures| {
            let indent = &caps[1];
            let content = &caps[3];
            for (index, record) in records.iter().enumerate().skip(used) {
                if record.indent == indent && record.content == content {
                    used = index + 1;
                    return format!("{indent}{}{content}", record.marker);
                }
            }
            caps[0].to_string()
        })
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_preprocess_captures_glyph_and_indent() {
        let records = preprocess("* one\n  + two\n- three\n");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].marker, "* ");
        assert_eq!(records[1].indent, "  ");
        assert_eq!(records[1].marker, "+ ");
        assert_eq!(records[2].content, "three");
    }

    #[test]
    fn test_untouched_items_get_their_glyphs_back() {
        let original = "* item one\n+ item two\n";
        let records = preprocess(original);
        let canonical = "- item one\n- item two\n";
        assert_eq!(postprocess(canonical, &records), "* item one\n+ item two\n");
    }

    #[test]
    fn test_modified_item_normalizes_to_dash() {
        let records = preprocess("* item one\n+ item two\n");
        let canonical = "- item one\n- item TWO\n";
        assert_eq!(postprocess(canonical, &records), "* item one\n- item TWO\n");
    }

    #[test]
    fn test_new_item_defaults_to_dash() {
        let records = preprocess("* item one\n");
        let canonical = "- item one\n- brand new\n";
        assert_eq!(postprocess(canonical, &records), "* item one\n- brand new\n");
    }

    #[test]
    fn test_scan_pointer_only_moves_forward() {
        // The second "- same" may not re-consume the first record.
        let records = preprocess("* same\n* same\n");
        let canonical = "- same\n- same\n";
        assert_eq!(postprocess(canonical, &records), "* same\n* same\n");
    }

    #[test]
    fn test_indent_is_part_of_the_key() {
        let records = preprocess("* top\n  * nested\n");
        // Outdented content no longer matches the nested record.
        let canonical = "- top\n- nested\n";
        assert_eq!(postprocess(canonical, &records), "* top\n- nested\n");
    }

    #[test]
    fn test_numbered_items_are_not_captured() {
        assert!(preprocess("1. one\n2. two\n").is_empty());
    }

    #[test]
    fn test_empty_extraction_is_a_noop() {
        assert_eq!(postprocess("- a\n", &[]), "- a\n");
    }
}
