//! The fidelity ledger.
//!
//! Rendering Markdown to the rich-text tree and serializing it back is
//! lossy by construction: the serializer only ever emits canonical surface
//! forms. The ledger closes that gap with four independent capture/restore
//! passes, one per surface-syntax dimension. Each pass extracts an ordered
//! list of records from the Markdown text before it is rendered, then
//! reinserts the originals into freshly serialized text, matched by
//! normalized content rather than by position (positions do not survive a
//! re-render). Reinsertion is first-match in document order; a record is
//! consumed at most once; an occurrence with no remaining match keeps the
//! canonical form. Restore passes never fail the conversion.

pub mod code_blocks;
pub mod links;
pub mod list_markers;
pub mod table_rules;

pub use links::{collect_repeated_links_into_references, normalize_url};

/// One ledger instance covers one stay in rich-text mode: captured on
/// `set_value` and on every entry into rich-text mode, consumed on exit to
/// Markdown mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FidelityLedger {
    links: links::LinkData,
    list_markers: Vec<list_markers::ListMarkerRecord>,
    table_rules: Vec<table_rules::TableRuleRecord>,
    code_blocks: Vec<code_blocks::CodeBlockRecord>,
}

impl FidelityLedger {
    /// Run every extraction pass over a Markdown body.
    pub fn capture(body: &str) -> Self {
        Self {
            links: links::preprocess(body),
            list_markers: list_markers::preprocess(body),
            table_rules: table_rules::preprocess(body),
            code_blocks: code_blocks::preprocess(body),
        }
    }

    /// Reapply captured surface forms onto serialized canonical Markdown.
    pub fn restore(&self, serialized: &str) -> String {
        let step = links::postprocess(serialized, &self.links);
        let step = list_markers::postprocess(&step, &self.list_markers);
        let step = table_rules::postprocess(&step, &self.table_rules);
        code_blocks::postprocess(&step, &self.code_blocks)
    }

    /// True when no extraction pass found anything to preserve.
    pub fn is_empty(&self) -> bool {
        self.links.records.is_empty()
            && self.links.ref_definitions.is_empty()
            && self.list_markers.is_empty()
            && self.table_rules.is_empty()
            && self.code_blocks.is_empty()
    }
}
