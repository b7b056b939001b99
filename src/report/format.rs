//! Terminal formatting for result tables.
//!
//! Kept apart from the controller so the state machine stays free of layout
//! details and output changes stay local.

use crate::report::ReportTable;

/// Minimum column width; wider headers widen their column.
const COLUMN_WIDTH: usize = 9;

/// Right-aligned table, three decimals per value.
pub fn format_table(table: &ReportTable) -> String {
    if table.is_empty() {
        return "(no candidates retained)\n".to_string();
    }

    let headers = table.headers();
    let widths: Vec<usize> = headers.iter().map(|h| h.len().max(COLUMN_WIDTH)).collect();

    let mut out = String::new();
    push_line(&mut out, headers.iter().map(|h| h.to_string()), &widths);
    push_line(&mut out, widths.iter().map(|w| "-".repeat(*w)), &widths);
    for row in &table.rows {
        let cells = row
            .parameters
            .iter()
            .chain(&row.metrics)
            .map(|v| format!("{v:.3}"));
        push_line(&mut out, cells, &widths);
    }
    out
}

/// Header line shown before each narrowing iteration's table.
pub fn format_iteration_header(iteration: usize, retained: usize) -> String {
    let noun = if retained == 1 { "candidate" } else { "candidates" };
    format!("=== Iteration {iteration}: {retained} {noun} retained ===\n")
}

fn push_line(out: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let line: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &w)| format!("{cell:>w$}"))
        .collect();
    out.push_str(&line.join(" "));
    out.push('\n');
}
