//! The editing session.
//!
//! One `EditorSession` owns everything a live dual-mode editor needs: the
//! frontmatter, the Markdown body, the rich-text tree, the fidelity ledger,
//! the current selection in either representation, and the change callback.
//! Exactly one representation is authoritative at a time — the one matching
//! the current mode — and the other is regenerated wholesale on each
//! switch, never patched incrementally.
//!
//! Control flow mirrors the host surface: `set_value` seeds the ledger and
//! renders, `switch_to_mode` runs the full conversion and position-mapping
//! protocol, `get_value` serializes whichever representation is
//! authoritative and reapplies the ledger. All of it runs synchronously
//! inside the caller's event; a re-entrant switch while one is already
//! running is an error, not a deadlock.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cursor::{
    self, MappedSelection, TreeSelection, descriptor::SelectionDescriptor,
};
use crate::fidelity::{FidelityLedger, collect_repeated_links_into_references};
use crate::frontmatter;
use crate::render::{PulldownBackend, RendererBackend, render_document};
use crate::serialize::serialize;
use crate::tree::RichTextTree;

/// Which representation is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Wysiwyg,
    Markdown,
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("a mode switch is already in progress")]
    SwitchInProgress,
    #[error("operation requires {expected:?} mode")]
    WrongMode { expected: Mode },
    #[error("byte range {start}..{end} is not valid for the current text")]
    InvalidRange { start: usize, end: usize },
}

/// How the host should reposition the viewport after a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollIntent {
    /// Recenter on the caret rectangle; raw offsets do not translate
    /// between representations with different rendering metrics.
    CenterOnCaret,
    Top,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchOutcome {
    pub mode: Mode,
    pub selection: MappedSelection,
    pub scroll: ScrollIntent,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionOptions {
    /// Convert inline links whose URL repeats into reference style on the
    /// way back to Markdown.
    pub prefer_reference_links: bool,
}

type ChangeCallback = Box<dyn FnMut(&str)>;

pub struct EditorSession {
    mode: Mode,
    backend: Box<dyn RendererBackend>,
    options: SessionOptions,
    frontmatter: String,
    /// Markdown body (without frontmatter); authoritative in Markdown mode.
    markdown: String,
    /// Rich-text tree; authoritative in rich-text mode.
    tree: RichTextTree,
    /// Captured on `set_value` and on entry into rich-text mode; consumed
    /// on exit to Markdown mode.
    ledger: Option<FidelityLedger>,
    md_selection: Range<usize>,
    tree_selection: Option<TreeSelection>,
    descriptor: Option<SelectionDescriptor>,
    scroll_offset: Option<f64>,
    in_switch: bool,
    on_change: Option<ChangeCallback>,
}

impl EditorSession {
    pub fn new(initial_mode: Mode) -> Self {
        Self::with_backend(initial_mode, Box::new(PulldownBackend::new()))
    }

    /// Build a session over a specific renderer backend (the degraded
    /// fixed-rule renderer, or a test double).
    pub fn with_backend(initial_mode: Mode, backend: Box<dyn RendererBackend>) -> Self {
        Self {
            mode: initial_mode,
            backend,
            options: SessionOptions::default(),
            frontmatter: String::new(),
            markdown: String::new(),
            tree: RichTextTree::new(),
            ledger: None,
            md_selection: 0..0,
            tree_selection: None,
            descriptor: None,
            scroll_offset: None,
            in_switch: false,
            on_change: None,
        }
    }

    pub fn set_options(&mut self, options: SessionOptions) {
        self.options = options;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_on_change(&mut self, callback: ChangeCallback) {
        self.on_change = Some(callback);
    }

    /// Load a document: split frontmatter, seed the fidelity ledger, render
    /// the body into the rich-text tree.
    pub fn set_value(&mut self, content: &str, _is_initial_setup: bool) {
        let (front, body) = frontmatter::split(content);
        self.frontmatter = front;
        self.ledger = Some(FidelityLedger::capture(&body));
        self.tree = render_document(self.backend.as_ref(), &body);
        self.md_selection = 0..0;
        self.markdown = body;
        self.tree_selection = None;
        self.descriptor = None;
    }

    /// The current effective Markdown document: the authoritative
    /// representation serialized, ledger restoration applied, frontmatter
    /// reattached.
    pub fn get_value(&self) -> String {
        let body = match self.mode {
            Mode::Markdown => self.markdown.clone(),
            Mode::Wysiwyg => {
                let canonical = serialize(&self.tree);
                let restored = match &self.ledger {
                    Some(ledger) => ledger.restore(&canonical),
                    None => canonical,
                };
                self.finish_body(restored)
            }
        };
        frontmatter::join(&self.frontmatter, &body)
    }

    fn finish_body(&self, body: String) -> String {
        if self.options.prefer_reference_links {
            collect_repeated_links_into_references(&body)
        } else {
            body
        }
    }

    /// Switch the authoritative representation, running the conversion and
    /// cursor-mapping protocol. A no-op when already in the requested mode,
    /// unless this is the initial setup call.
    pub fn switch_to_mode(
        &mut self,
        mode: Mode,
        is_initial_setup: bool,
    ) -> Result<SwitchOutcome, SessionError> {
        if self.in_switch {
            return Err(SessionError::SwitchInProgress);
        }
        if self.mode == mode && !is_initial_setup {
            return Ok(SwitchOutcome {
                mode,
                selection: MappedSelection::None,
                scroll: ScrollIntent::Unchanged,
            });
        }
        self.in_switch = true;
        let outcome = self.perform_switch(mode, is_initial_setup);
        self.in_switch = false;
        Ok(outcome)
    }

    fn perform_switch(&mut self, mode: Mode, is_initial_setup: bool) -> SwitchOutcome {
        if is_initial_setup {
            self.mode = mode;
            return SwitchOutcome {
                mode,
                selection: MappedSelection::None,
                scroll: ScrollIntent::Unchanged,
            };
        }
        match mode {
            Mode::Wysiwyg => {
                // Re-seed the ledger from the text being left behind.
                self.ledger = Some(FidelityLedger::capture(&self.markdown));
                let selection = self.clamped_md_selection();
                let (tree, mapped) =
                    cursor::map_markdown_to_tree(self.backend.as_ref(), &self.markdown, selection);
                self.tree = tree;
                self.tree_selection = match &mapped {
                    MappedSelection::Tree(sel) => Some(sel.clone()),
                    _ => None,
                };
                self.mode = Mode::Wysiwyg;
                let scroll = match &mapped {
                    MappedSelection::DocStart => ScrollIntent::Top,
                    MappedSelection::None => ScrollIntent::Unchanged,
                    _ => ScrollIntent::CenterOnCaret,
                };
                SwitchOutcome {
                    mode,
                    selection: mapped,
                    scroll,
                }
            }
            Mode::Markdown => {
                let ledger = self.ledger.take();
                let prefer_refs = self.options.prefer_reference_links;
                let (body, range) = cursor::map_tree_to_markdown(
                    &mut self.tree,
                    self.tree_selection.as_ref(),
                    |serialized| {
                        let restored = match &ledger {
                            Some(ledger) => ledger.restore(serialized),
                            None => serialized.to_string(),
                        };
                        if prefer_refs {
                            collect_repeated_links_into_references(&restored)
                        } else {
                            restored
                        }
                    },
                );
                self.markdown = body;
                self.md_selection = match range {
                    Some((start, end)) => start..end,
                    None => self.markdown.len()..self.markdown.len(),
                };
                self.mode = Mode::Markdown;
                self.emit_change();
                let (selection, scroll) = match range {
                    Some((start, end)) => (
                        MappedSelection::Markdown { start, end },
                        ScrollIntent::CenterOnCaret,
                    ),
                    None => (MappedSelection::None, ScrollIntent::Unchanged),
                };
                SwitchOutcome {
                    mode,
                    selection,
                    scroll,
                }
            }
        }
    }

    // ----- selection & scroll bookkeeping -----

    pub fn set_markdown_selection(&mut self, range: Range<usize>) {
        self.md_selection = range;
    }

    pub fn markdown_selection(&self) -> Range<usize> {
        self.clamped_md_selection()
    }

    pub fn set_tree_selection(&mut self, selection: Option<TreeSelection>) {
        self.tree_selection = selection;
    }

    pub fn tree_selection(&self) -> Option<&TreeSelection> {
        self.tree_selection.as_ref()
    }

    /// Record the scroll offset of the representation being left; the
    /// switch outcome tells the host how to reposition afterwards.
    pub fn set_scroll_offset(&mut self, offset: f64) {
        self.scroll_offset = Some(offset);
    }

    pub fn scroll_offset(&self) -> Option<f64> {
        self.scroll_offset
    }

    /// Capture a structural descriptor of the current rich-text selection,
    /// for re-location after a wholesale external refresh.
    pub fn capture_selection_descriptor(&mut self) -> Option<&SelectionDescriptor> {
        let selection = self.tree_selection.as_ref()?;
        self.descriptor = SelectionDescriptor::capture(&self.tree, selection);
        self.descriptor.as_ref()
    }

    /// Replace the whole document from outside the marker protocol (an
    /// external content refresh). The previous selection is re-located via
    /// the captured descriptor, degrading to no selection change.
    pub fn refresh_content(&mut self, content: &str) {
        let descriptor = self.descriptor.take();
        let mode = self.mode;
        self.set_value(content, false);
        if mode == Mode::Wysiwyg
            && let Some(descriptor) = descriptor
            && let Some(point) = descriptor.resolve(&self.tree)
        {
            self.tree_selection = Some(TreeSelection {
                start: point,
                end: None,
            });
        }
    }

    // ----- edit entry points -----

    /// Replace a byte range of the Markdown body (Markdown mode only); the
    /// caret moves to the end of the inserted text.
    pub fn replace_markdown_range(
        &mut self,
        range: Range<usize>,
        text: &str,
    ) -> Result<(), SessionError> {
        if self.mode != Mode::Markdown {
            return Err(SessionError::WrongMode {
                expected: Mode::Markdown,
            });
        }
        if range.start > range.end
            || range.end > self.markdown.len()
            || !self.markdown.is_char_boundary(range.start)
            || !self.markdown.is_char_boundary(range.end)
        {
            return Err(SessionError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }
        self.markdown.replace_range(range.clone(), text);
        let caret = range.start + text.len();
        self.md_selection = caret..caret;
        self.emit_change();
        Ok(())
    }

    /// The live tree, for the editing surface to mutate. Call
    /// [`Self::notify_tree_edited`] after a mutation so the change
    /// callback fires.
    pub fn tree(&self) -> &RichTextTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut RichTextTree {
        &mut self.tree
    }

    pub fn notify_tree_edited(&mut self) {
        if self.mode == Mode::Wysiwyg {
            self.emit_change();
        }
    }

    // ----- internals -----

    fn clamped_md_selection(&self) -> Range<usize> {
        let len = self.markdown.len();
        let start = self.md_selection.start.min(len);
        let end = self.md_selection.end.clamp(start, len);
        start..end
    }

    fn emit_change(&mut self) {
        let mut value = self.get_value();
        if !value.is_empty() && !value.ends_with('\n') {
            value.push('\n');
        }
        if let Some(callback) = self.on_change.as_mut() {
            callback(&value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn session_with(markdown: &str, mode: Mode) -> EditorSession {
        let mut session = EditorSession::new(mode);
        session.set_value(markdown, true);
        session
    }

    // ============ Value round trips ============

    #[test]
    fn test_get_value_identity_in_markdown_mode() {
        let session = session_with("# Doc\n\n* item", Mode::Markdown);
        assert_eq!(session.get_value(), "# Doc\n\n* item");
    }

    #[test]
    fn test_get_value_restores_fidelity_in_wysiwyg_mode() {
        let session = session_with("* item one\n+ item two", Mode::Wysiwyg);
        assert_eq!(session.get_value(), "* item one\n+ item two");
    }

    #[test]
    fn test_frontmatter_is_opaque_and_reattached() {
        let content = "---\ntitle: T\n---\n# Doc";
        let session = session_with(content, Mode::Wysiwyg);
        assert_eq!(session.get_value(), "---\ntitle: T\n---\n# Doc");
        // The ledger and renderer never saw the frontmatter.
        assert!(!session.tree().flattened_text(session.tree().root()).contains("title: T"));
    }

    // ============ Mode switching ============

    #[test]
    fn test_switch_roundtrip_preserves_document() {
        let mut session = session_with("* one\n+ two\n\n[x][1]\n\n[1]: http://a.com", Mode::Markdown);
        session.switch_to_mode(Mode::Wysiwyg, false).unwrap();
        assert_eq!(session.mode(), Mode::Wysiwyg);
        session.switch_to_mode(Mode::Markdown, false).unwrap();
        assert_eq!(
            session.get_value(),
            "* one\n+ two\n\n[x][1]\n\n[1]: http://a.com"
        );
    }

    #[test]
    fn test_switch_to_same_mode_is_noop() {
        let mut session = session_with("text", Mode::Markdown);
        let outcome = session.switch_to_mode(Mode::Markdown, false).unwrap();
        assert_eq!(outcome.selection, MappedSelection::None);
        assert_eq!(outcome.scroll, ScrollIntent::Unchanged);
    }

    #[test]
    fn test_caret_survives_switch_and_back() {
        let markdown = "Foo.  Bar baz";
        let mut session = session_with(markdown, Mode::Markdown);
        // Caret right after "Bar".
        session.set_markdown_selection(9..9);
        session.switch_to_mode(Mode::Wysiwyg, false).unwrap();
        let outcome = session.switch_to_mode(Mode::Markdown, false).unwrap();
        // The double space collapsed, so the text is one byte shorter and
        // the caret still sits right after "Bar".
        assert_eq!(session.get_value(), "Foo. Bar baz");
        assert_eq!(
            outcome.selection,
            MappedSelection::Markdown { start: 8, end: 8 }
        );
    }

    #[test]
    fn test_reentrant_switch_is_rejected() {
        let mut session = session_with("text", Mode::Markdown);
        session.in_switch = true;
        let err = session.switch_to_mode(Mode::Wysiwyg, false).unwrap_err();
        assert_eq!(err, SessionError::SwitchInProgress);
    }

    // ============ Change notification ============

    #[test]
    fn test_change_callback_fires_with_trailing_newline() {
        let seen: Rc<RefCell<Vec<String>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let mut session = session_with("line", Mode::Markdown);
        session.set_on_change(Box::new(move |value| {
            sink.borrow_mut().push(value.to_string());
        }));
        session.replace_markdown_range(4..4, " more").unwrap();
        assert_eq!(seen.borrow().as_slice(), ["line more\n"]);
    }

    #[test]
    fn test_switch_to_markdown_fires_change() {
        let seen: Rc<RefCell<Vec<String>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let mut session = session_with("* item", Mode::Wysiwyg);
        session.set_on_change(Box::new(move |value| {
            sink.borrow_mut().push(value.to_string());
        }));
        session.switch_to_mode(Mode::Markdown, false).unwrap();
        assert_eq!(seen.borrow().as_slice(), ["* item\n"]);
    }

    // ============ Edits ============

    #[test]
    fn test_replace_markdown_range_moves_caret() {
        let mut session = session_with("hello world", Mode::Markdown);
        session.replace_markdown_range(6..11, "there").unwrap();
        assert_eq!(session.get_value(), "hello there");
        assert_eq!(session.markdown_selection(), 11..11);
    }

    #[test]
    fn test_replace_markdown_range_rejects_bad_range() {
        let mut session = session_with("short", Mode::Markdown);
        let err = session.replace_markdown_range(0..99, "x").unwrap_err();
        assert_eq!(err, SessionError::InvalidRange { start: 0, end: 99 });
    }

    #[test]
    fn test_replace_markdown_range_requires_markdown_mode() {
        let mut session = session_with("text", Mode::Wysiwyg);
        let err = session.replace_markdown_range(0..0, "x").unwrap_err();
        assert_eq!(
            err,
            SessionError::WrongMode {
                expected: Mode::Markdown
            }
        );
    }

    #[test]
    fn test_edited_list_item_normalizes_only_itself() {
        let mut session = session_with("* item one\n+ item two", Mode::Wysiwyg);
        // Simulate the surface rewriting "item two" to "item TWO".
        let root = session.tree().root();
        let leaf = session
            .tree()
            .walk(root)
            .into_iter()
            .find(|&id| session.tree().text(id) == Some("item two"))
            .unwrap();
        if let Some(node) = session.tree_mut().get_mut(leaf) {
            node.kind = crate::tree::NodeKind::Text("item TWO".to_string());
        }
        session.switch_to_mode(Mode::Markdown, false).unwrap();
        assert_eq!(session.get_value(), "* item one\n- item TWO");
    }

    // ============ External refresh ============

    #[test]
    fn test_refresh_content_relocates_selection() {
        let mut session = session_with("first para\n\nsecond para", Mode::Wysiwyg);
        let tree = session.tree();
        let leaf = tree
            .walk(tree.root())
            .into_iter()
            .find(|&id| tree.text(id) == Some("second para"))
            .unwrap();
        session.set_tree_selection(Some(TreeSelection {
            start: crate::cursor::TreePoint::Text {
                node: leaf,
                offset: 4,
            },
            end: None,
        }));
        session.capture_selection_descriptor().unwrap();

        session.refresh_content("brand new lead\n\nfirst para\n\nsecond para");
        let relocated = session.tree_selection().cloned().unwrap();
        let crate::cursor::TreePoint::Text { node, offset } = relocated.start else {
            panic!("expected text point");
        };
        assert_eq!(session.tree().text(node), Some("second para"));
        assert_eq!(offset, 4);
    }

    #[test]
    fn test_refresh_without_match_clears_selection() {
        let mut session = session_with("old text", Mode::Wysiwyg);
        session.refresh_content("entirely new");
        assert_eq!(session.tree_selection(), None);
    }
}
