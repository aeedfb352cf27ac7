//! Table serialization.
//!
//! The header row comes from an explicit `TableHead`, or failing that from
//! a heuristic look at the first body row. Body rows are padded or truncated
//! to the header's column count so the emitted table is always well formed;
//! a table with no discoverable header is dumped as plain blocks instead of
//! malformed pipe syntax.

use super::{Ctx, node_to_markdown};
use crate::tree::{NodeId, RichTextTree, Tag};

pub(crate) fn table_to_markdown(tree: &RichTextTree, id: NodeId, ctx: Ctx) -> String {
    if ctx.in_table_cell {
        // A table nested inside a cell degrades to its text.
        return tree.flattened_text(id).replace('|', "\\|").replace('\n', "<br>");
    }
    let cell_ctx = Ctx {
        in_table_cell: true,
    };

    let mut header_cells: Vec<String> = Vec::new();
    let mut body_rows: Vec<NodeId> = Vec::new();
    for &child in tree.children(id) {
        match tree.tag(child) {
            Some(Tag::TableHead) => {
                if header_cells.is_empty() {
                    header_cells = head_cells(tree, child, cell_ctx);
                }
            }
            Some(Tag::TableRow) => body_rows.push(child),
            _ => {}
        }
    }

    let mut first_body_row_is_header = false;
    if header_cells.is_empty()
        && let Some(&first) = body_rows.first()
        && detect_implicit_header(tree, first)
    {
        header_cells = row_cells(tree, first, cell_ctx);
        first_body_row_is_header = true;
    }

    if header_cells.is_empty() {
        return dump_cells_as_blocks(tree, id, ctx);
    }

    let col_count = header_cells.len();
    let mut out = format!("| {} |\n", header_cells.join(" | "));
    out.push_str(&format!("|{}\n", " --- |".repeat(col_count)));
    for (index, &row) in body_rows.iter().enumerate() {
        if first_body_row_is_header && index == 0 {
            continue;
        }
        let mut cells = row_cells(tree, row, cell_ctx);
        cells.truncate(col_count);
        while cells.len() < col_count {
            cells.push(String::new());
        }
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    format!("{}\n\n", out.trim_end())
}

/// Header cells sit directly under the head node in rendered trees; an
/// editing surface may nest them in a row element instead.
fn head_cells(tree: &RichTextTree, head: NodeId, cell_ctx: Ctx) -> Vec<String> {
    let direct: Vec<String> = tree
        .children(head)
        .iter()
        .filter(|&&c| matches!(tree.tag(c), Some(Tag::TableCell { .. })))
        .map(|&c| cell_content(tree, c, cell_ctx))
        .collect();
    if !direct.is_empty() {
        return direct;
    }
    tree.children(head)
        .iter()
        .find(|&&c| tree.tag(c) == Some(&Tag::TableRow))
        .map(|&row| row_cells(tree, row, cell_ctx))
        .unwrap_or_default()
}

fn row_cells(tree: &RichTextTree, row: NodeId, cell_ctx: Ctx) -> Vec<String> {
    tree.children(row)
        .iter()
        .filter(|&&c| matches!(tree.tag(c), Some(Tag::TableCell { .. })))
        .map(|&c| cell_content(tree, c, cell_ctx))
        .collect()
}

fn cell_content(tree: &RichTextTree, cell: NodeId, cell_ctx: Ctx) -> String {
    let mut out = String::new();
    for &child in tree.children(cell) {
        out.push_str(&node_to_markdown(tree, child, cell_ctx));
    }
    out.trim().to_string()
}

/// A row counts as a header when any cell is a header cell, or when every
/// cell wraps exactly one `Strong` element. Bold-only data rows are
/// indistinguishable from headers here.
fn detect_implicit_header(tree: &RichTextTree, row: NodeId) -> bool {
    let cells: Vec<NodeId> = tree
        .children(row)
        .iter()
        .copied()
        .filter(|&c| matches!(tree.tag(c), Some(Tag::TableCell { .. })))
        .collect();
    if cells.is_empty() {
        return false;
    }
    if cells
        .iter()
        .any(|&c| matches!(tree.tag(c), Some(Tag::TableCell { header: true })))
    {
        return true;
    }
    cells.iter().all(|&c| {
        let kids = tree.children(c);
        kids.len() == 1 && tree.tag(kids[0]) == Some(&Tag::Strong)
    })
}

/// No columns could be discovered: emit each cell's content as its own
/// plain block rather than a broken table.
fn dump_cells_as_blocks(tree: &RichTextTree, table: NodeId, ctx: Ctx) -> String {
    let mut out = String::new();
    for node in tree.walk(table) {
        if matches!(tree.tag(node), Some(Tag::TableCell { .. })) {
            for &child in tree.children(node) {
                out.push_str(&node_to_markdown(tree, child, ctx));
            }
            if !out.ends_with("\n\n") {
                out.push_str("\n\n");
            }
        }
    }
    let trimmed = out.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n\n")
    }
}
