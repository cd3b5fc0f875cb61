//! Plain-text tables for command output.

use std::fmt::Write as _;

use crate::{
    coerce::ColumnCoercionStats,
    reconcile::{ColumnMapping, MatchKind},
};

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| cell_width(h)).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell_width(cell));
        }
    }

    let mut output = String::new();
    push_line(&mut output, headers, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat((*w).max(3))).collect();
    push_line(&mut output, &rule, &widths);
    for row in rows {
        push_line(&mut output, row, &widths);
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn push_line(output: &mut String, cells: &[String], widths: &[usize]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let cell = flatten(cell);
            let pad = width.saturating_sub(cell.chars().count());
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect::<Vec<_>>()
        .join("  ");
    let _ = writeln!(output, "{}", line.trim_end());
}

fn cell_width(value: &str) -> usize {
    flatten(value).chars().count()
}

fn flatten(value: &str) -> String {
    value.replace(['\n', '\r', '\t'], " ")
}

/// One line per destination column: its type, source, and how it matched.
pub fn mapping_rows(mapping: &ColumnMapping) -> (Vec<String>, Vec<Vec<String>>) {
    let headers = ["destination", "type", "source", "match"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let rows = mapping
        .columns()
        .iter()
        .map(|column| {
            let (source, matched) = match &column.source {
                Some(binding) => (
                    binding.name.clone(),
                    match binding.kind {
                        MatchKind::Exact => "exact".to_string(),
                        MatchKind::Fuzzy { score } => format!("fuzzy {score:.3}"),
                    },
                ),
                None => ("-".to_string(), "missing".to_string()),
            };
            vec![
                column.destination.name.clone(),
                column.destination.describe_type(),
                source,
                matched,
            ]
        })
        .collect();
    (headers, rows)
}

/// Per-column counters, skipping columns where nothing happened.
pub fn coercion_rows(stats: &[ColumnCoercionStats]) -> (Vec<String>, Vec<Vec<String>>) {
    let headers = ["column", "truncated", "nulled"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let rows = stats
        .iter()
        .filter(|c| c.truncated > 0 || c.degraded > 0)
        .map(|c| {
            vec![
                c.column.clone(),
                c.truncated.to_string(),
                c.degraded.to_string(),
            ]
        })
        .collect();
    (headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_columns_and_trims_line_ends() {
        let rendered = render_table(
            &["name".to_string(), "n".to_string()],
            &[vec!["a\tb".to_string(), "10".to_string()]],
        );
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "name  n");
        assert_eq!(lines[1], "----  ---");
        assert_eq!(lines[2], "a b   10");
    }
}
