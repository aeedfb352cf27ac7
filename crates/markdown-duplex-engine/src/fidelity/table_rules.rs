//! Table separator row preservation.
//!
//! The serializer always emits `| --- |` cells; this pass remembers the
//! exact original separator row (alignment colons, `=` rules, spacing),
//! keyed by the whitespace-stripped header line above it.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TableRuleRecord {
    /// The header line with all whitespace removed.
    pub header_key: String,
    /// The original separator line, verbatim.
    pub separator: String,
}

fn strip_whitespace(line: &str) -> String {
    line.chars().filter(|c| !c.is_whitespace()).collect()
}

/// A separator row: only pipes, colons, dashes/equals and spacing, with at
/// least one dash or equals sign.
fn is_separator_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    trimmed.chars().all(|c| matches!(c, '|' | ':' | '-' | '=' | ' ' | '\t'))
        && trimmed.chars().any(|c| c == '-' || c == '=')
}

fn canonical_separator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\|( --- \|)+$").expect("Invalid separator regex"))
}

pub(crate) fn preprocess(markdown: &str) -> Vec<TableRuleRecord> {
    let lines: Vec<&str> = markdown.split('\n').collect();
    let mut records = Vec::new();
    for index in 1..lines.len() {
        let line = lines[index];
        let previous = lines[index - 1];
        if is_separator_line(line) && previous.contains('|') {
            records.push(TableRuleRecord {
                header_key: strip_whitespace(previous),
                separator: line.to_string(),
            });
        }
    }
    records
}

pub(crate) fn postprocess(markdown: &str, records: &[TableRuleRecord]) -> String {
    if records.is_empty() {
        return markdown.to_string();
    }
    let mut used = vec![false; records.len()];
    let lines: Vec<&str> = markdown.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        if index > 0 && canonical_separator_regex().is_match(line) {
            let header_key = strip_whitespace(lines[index - 1]);
            let matched = records
                .iter()
                .enumerate()
                .find(|(i, record)| !used[*i] && record.header_key == header_key);
            if let Some((i, record)) = matched {
                used[i] = true;
                out.push(record.separator.clone());
                continue;
            }
        }
        out.push(line.to_string());
    }
    out.join("\n")
}
