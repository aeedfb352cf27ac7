/*!
 * # markdown-duplex engine
 *
 * A bidirectional, fidelity-preserving Markdown ⇄ rich-text conversion
 * core. The document of record stays plain Markdown; the editing surface
 * works on a rich-text tree; switching between the two loses neither the
 * author's surface-syntax choices nor their caret.
 *
 * Three mechanisms carry that guarantee:
 *
 * - a symmetric parse/render pair ([`render`] over pulldown-cmark and the
 *   canonical-form [`serialize`] walker),
 * - the [`fidelity`] ledger, a side channel that captures surface-syntax
 *   choices (link style, bullet glyphs, table rules, fence style) before
 *   rendering and restores them after serialization, matched by content
 *   rather than position,
 * - the [`cursor`] mapper, which threads the caret through a full
 *   re-render as invisible marker tokens, verifies each insertion point by
 *   round-tripping it, and falls back to structural placement when marker
 *   mapping cannot be trusted.
 *
 * [`session::EditorSession`] composes the three into the host-facing
 * `set_value` / `get_value` / `switch_to_mode` surface.
 */

pub mod cursor;
pub mod fidelity;
pub mod frontmatter;
pub mod render;
pub mod serialize;
pub mod session;
pub mod tree;

// Re-export key types for easier usage
pub use cursor::{
    MappedSelection, MapperState, PositionMapper, TreePoint, TreeSelection,
    descriptor::SelectionDescriptor, is_reversible_edit,
};
pub use fidelity::{FidelityLedger, collect_repeated_links_into_references, normalize_url};
pub use render::{FallbackBackend, PulldownBackend, RendererBackend, render_document};
pub use serialize::serialize;
pub use session::{EditorSession, Mode, ScrollIntent, SessionError, SessionOptions, SwitchOutcome};
pub use tree::{Node, NodeId, NodeKind, RichTextTree, Tag, TreeError};
