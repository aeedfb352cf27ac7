//! Link style preservation.
//!
//! Markdown has four surface syntaxes for the same semantic link: inline,
//! reference, shortcut reference, and autolink. The serializer always emits
//! the inline form; this pass captures each link's exact original span
//! before rendering and swaps it back in afterwards, matched by normalized
//! URL + visible text + image flag rather than by position. Reference
//! definition lines are kept verbatim and reappended when serialization
//! dropped them.

use percent_encoding::percent_decode_str;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LinkRecord {
    pub url: String,
    pub text: String,
    pub is_image: bool,
    pub original: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct LinkData {
    pub records: Vec<LinkRecord>,
    pub ref_definitions: String,
}

fn inline_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\[([^\]]*)\]\(([^)\s]+)(?:\s+["'][^"']*["'])?\)"#)
            .expect("Invalid inline link regex")
    })
}

fn inline_image_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"!\[([^\]]*)\]\(([^)\s]+)(?:\s+["'][^"']*["'])?\)"#)
            .expect("Invalid inline image regex")
    })
}

fn full_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]*)\]\[([^\]]*)\]").expect("Invalid ref link regex"))
}

fn full_image_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[([^\]]*)\]\[([^\]]*)\]").expect("Invalid ref image regex"))
}

fn shortcut_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]").expect("Invalid shortcut regex"))
}

fn autolink_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<(https?://[^\s>]+)>").expect("Invalid autolink regex"))
}

fn ref_def_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[([^\]]+)\]:\s*(?:<([^>]+)>|(\S+))").expect("Invalid ref def regex")
    })
}

/// Normalize a URL for matching: strip one layer of angle brackets,
/// percent-decode, strip trailing slashes.
pub fn normalize_url(url: &str) -> String {
    let mut s = url.trim();
    if let Some(rest) = s.strip_prefix('<') {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix('>') {
        s = rest;
    }
    let s = s.trim();
    let decoded = match percent_decode_str(s).decode_utf8() {
        Ok(cow) => cow.into_owned(),
        Err(_) => s.to_string(),
    };
    let stripped = decoded.trim_end_matches('/');
    if stripped.is_empty() {
        decoded
    } else {
        stripped.to_string()
    }
}

/// Extract every link occurrence, in document order, plus the reference
/// definition lines verbatim.
pub(crate) fn preprocess(markdown: &str) -> LinkData {
    let mut refs: HashMap<String, String> = HashMap::new();
    let mut def_lines: Vec<&str> = Vec::new();
    for line in markdown.split('\n') {
        if let Some(caps) = ref_def_regex().captures(line) {
            let id = caps[1].to_lowercase();
            let url = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().trim())
                .unwrap_or("");
            refs.insert(id, url.to_string());
            def_lines.push(line);
        }
    }
    let ref_definitions = def_lines.join("\n");

    let mut records: Vec<LinkRecord> = Vec::new();
    let mut pos = 0usize;
    while pos < markdown.len() {
        let rest = &markdown[pos..];
        let mut best: Option<(usize, LinkRecord)> = None;

        let consider = |best: &mut Option<(usize, LinkRecord)>, at: usize, rec: LinkRecord| {
            if best.as_ref().is_none_or(|(idx, _)| at < *idx) {
                *best = Some((at, rec));
            }
        };

        if let Some(caps) = inline_link_regex().captures(rest) {
            let m = caps.get(0).map(|m| (m.start(), m.as_str().to_string()));
            if let Some((at, original)) = m {
                consider(
                    &mut best,
                    pos + at,
                    LinkRecord {
                        url: normalize_url(&caps[2]),
                        text: caps[1].to_string(),
                        is_image: false,
                        original,
                    },
                );
            }
        }
        if let Some(caps) = inline_image_regex().captures(rest)
            && let Some(m) = caps.get(0)
        {
            consider(
                &mut best,
                pos + m.start(),
                LinkRecord {
                    url: normalize_url(&caps[2]),
                    text: caps[1].to_string(),
                    is_image: true,
                    original: m.as_str().to_string(),
                },
            );
        }
        for (regex, is_image) in [(full_ref_regex(), false), (full_image_ref_regex(), true)] {
            if let Some(caps) = regex
                .captures_iter(rest)
                .find(|c| refs.contains_key(&c[2].to_lowercase()))
                && let Some(m) = caps.get(0)
            {
                consider(
                    &mut best,
                    pos + m.start(),
                    LinkRecord {
                        url: normalize_url(&refs[&caps[2].to_lowercase()]),
                        text: caps[1].to_string(),
                        is_image,
                        original: m.as_str().to_string(),
                    },
                );
            }
        }
        // Shortcut form: a known label not followed by `(` or `[`.
        for (prefix_is_image, needs_bang) in [(false, false), (true, true)] {
            if let Some(caps) = shortcut_regex().captures_iter(rest).find(|c| {
                let Some(m) = c.get(0) else { return false };
                let abs_start = pos + m.start();
                let preceded_by_bang =
                    abs_start > 0 && markdown.as_bytes()[abs_start - 1] == b'!';
                if preceded_by_bang != needs_bang {
                    return false;
                }
                if !refs.contains_key(&c[1].to_lowercase()) {
                    return false;
                }
                // Not the label half of an inline/reference link, and not a
                // reference definition's own label.
                let after = &rest[m.end()..];
                !(after.starts_with('(') || after.starts_with('[') || after.starts_with(':'))
            }) && let Some(m) = caps.get(0)
            {
                let at = pos + m.start() - usize::from(needs_bang);
                let original = markdown[at..pos + m.end()].to_string();
                consider(
                    &mut best,
                    at,
                    LinkRecord {
                        url: normalize_url(&refs[&caps[1].to_lowercase()]),
                        text: caps[1].to_string(),
                        is_image: prefix_is_image,
                        original,
                    },
                );
            }
        }
        if let Some(caps) = autolink_regex().captures(rest)
            && let Some(m) = caps.get(0)
        {
            consider(
                &mut best,
                pos + m.start(),
                LinkRecord {
                    url: normalize_url(&caps[1]),
                    text: caps[1].to_string(),
                    is_image: false,
                    original: m.as_str().to_string(),
                },
            );
        }

        match best {
            Some((at, rec)) => {
                pos = at + rec.original.len();
                records.push(rec);
            }
            None => break,
        }
    }

    LinkData {
        records,
        ref_definitions,
    }
}

/// Replace canonical inline occurrences with the next unused original whose
/// key matches; reappend dropped reference definitions.
pub(crate) fn postprocess(markdown: &str, data: &LinkData) -> String {
    if data.records.is_empty() && data.ref_definitions.is_empty() {
        return markdown.to_string();
    }
    let mut used = vec![false; data.records.len()];
    let bytes = markdown.as_bytes();

    let step = inline_link_regex().replace_all(markdown, |caps: &Captures| {
        let Some(m) = caps.get(0) else {
            return String::new();
        };
        if m.start() > 0 && bytes[m.start() - 1] == b'!' {
            // The tail of an inline image; the image pass owns it.
            return m.as_str().to_string();
        }
        replace_or_keep(caps, false, data, &mut used)
    });
    let mut result = inline_image_regex()
        .replace_all(&step, |caps: &Captures| {
            replace_or_keep(caps, true, data, &mut used)
        })
        .to_string();

    if !data.ref_definitions.is_empty() && !result.contains(&data.ref_definitions) {
        if !result.is_empty() {
            result.push_str("\n\n");
        }
        result.push_str(&data.ref_definitions);
    }
    result
}

fn replace_or_keep(caps: &Captures, is_image: bool, data: &LinkData, used: &mut [bool]) -> String {
    let text = &caps[1];
    let url = normalize_url(&caps[2]);
    for (index, record) in data.records.iter().enumerate() {
        if !used[index]
            && record.is_image == is_image
            && record.text == text
            && record.url == url
        {
            used[index] = true;
            return record.original.clone();
        }
    }
    caps[0].to_string()
}

/// Companion pass: turn inline links whose URL occurs two or more times
/// into reference style, reusing existing definition identifiers and
/// numbering new ones after the highest numeric identifier in use.
pub fn collect_repeated_links_into_references(markdown: &str) -> String {
    let bytes = markdown.as_bytes();

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut first_raw: HashMap<String, String> = HashMap::new();
    for caps in inline_link_regex().captures_iter(markdown) {
        let Some(m) = caps.get(0) else { continue };
        if m.start() > 0 && bytes[m.start() - 1] == b'!' {
            continue;
        }
        let norm = normalize_url(&caps[2]);
        *counts.entry(norm.clone()).or_insert(0) += 1;
        first_raw.entry(norm).or_insert_with(|| caps[2].to_string());
    }
    if !counts.values().any(|&c| c >= 2) {
        return markdown.to_string();
    }

    let mut existing: HashMap<String, String> = HashMap::new();
    let mut max_numeric = 0usize;
    for line in markdown.split('\n') {
        if let Some(caps) = ref_def_regex().captures(line) {
            let id = caps[1].to_string();
            let url = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().trim())
                .unwrap_or("");
            existing.entry(normalize_url(url)).or_insert(id.clone());
            if let Ok(n) = id.parse::<usize>() {
                max_numeric = max_numeric.max(n);
            }
        }
    }

    let mut assigned: HashMap<String, String> = HashMap::new();
    let mut new_defs: Vec<(String, String)> = Vec::new();
    let mut next_id = max_numeric + 1;

    let mut result = inline_link_regex()
        .replace_all(markdown, |caps: &Captures| {
            let Some(m) = caps.get(0) else {
                return String::new();
            };
            if m.start() > 0 && bytes[m.start() - 1] == b'!' {
                return m.as_str().to_string();
            }
            let norm = normalize_url(&caps[2]);
            if counts.get(&norm).copied().unwrap_or(0) < 2 {
                return m.as_str().to_string();
            }
            let id = match assigned.get(&norm) {
                Some(id) => id.clone(),
                None => {
                    let id = match existing.get(&norm) {
                        Some(id) => id.clone(),
                        None => {
                            let id = next_id.to_string();
                            next_id += 1;
                            let raw = first_raw
                                .get(&norm)
                                .cloned()
                                .unwrap_or_else(|| caps[2].to_string());
                            new_defs.push((id.clone(), raw));
                            id
                        }
                    };
                    assigned.insert(norm.clone(), id.clone());
                    id
                }
            };
            format!("[{}][{}]", &caps[1], id)
        })
        .to_string();

    if !new_defs.is_empty() {
        let defs: Vec<String> = new_defs
            .iter()
            .map(|(id, url)| format!("[{id}]: {url}"))
            .collect();
        result.push_str("\n\n");
        result.push_str(&defs.join("\n"));
    }
    result
}
