//! Terminal output for query results and diagnostics.

use serde_json::json;

use skyql::flatten::cell_text;
use skyql::{Diagnostic, Table};

use crate::interpreter::QueryOutcome;
use crate::types::CliResult;

/// Cells wider than this are cut with an ellipsis.
const MAX_CELL_WIDTH: usize = 48;

pub const NO_DATA: &str = "No data retrieved.";

/// Render a table with upper-case headers and aligned columns.
pub fn render_table(table: &Table) -> String {
    if table.is_empty() || table.columns.is_empty() {
        return format!("{NO_DATA}\n");
    }

    let headers: Vec<String> = table.columns.iter().map(|c| c.to_uppercase()).collect();
    let cells: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| {
            table
                .columns
                .iter()
                .map(|col| fit(&row.get(col).map(cell_text).unwrap_or_default()))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &headers, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, &rule, &widths);
    for row in &cells {
        push_line(&mut out, row, &widths);
    }
    let n = table.len();
    out.push_str(&format!("({n} row{})\n", if n == 1 { "" } else { "s" }));
    out
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, &w)| format!("{cell:<w$}"))
        .collect();
    out.push_str(line.join(" | ").trim_end());
    out.push('\n');
}

/// Collapse whitespace and cut to [`MAX_CELL_WIDTH`] characters.
fn fit(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(MAX_CELL_WIDTH - 1) {
        Some((i, _)) if flat.chars().count() > MAX_CELL_WIDTH => format!("{}…", &flat[..i]),
        _ => flat,
    }
}

/// Human-readable rendering of an outcome.
pub fn render_outcome(outcome: &QueryOutcome) -> String {
    match outcome {
        QueryOutcome::Table(table) => render_table(table),
        QueryOutcome::NoData => format!("{NO_DATA}\n"),
        QueryOutcome::Stealth { operation } => format!(
            "{operation} needs a signed-in account. Log in with /login or set SKYQL_IDENTIFIER and SKYQL_PASSWORD.\n"
        ),
    }
}

/// JSON rendering of an outcome: the rows for a table, an empty list for
/// no data, an object naming the operation for stealth.
pub fn render_json(outcome: &QueryOutcome) -> CliResult<String> {
    let value = match outcome {
        QueryOutcome::Table(table) => serde_json::to_value(&table.rows)?,
        QueryOutcome::NoData => json!([]),
        QueryOutcome::Stealth { .. } => serde_json::to_value(outcome)?,
    };
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Render diagnostics under the query, with a caret line for each span.
pub fn render_diagnostics(query: &str, diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    for diagnostic in diagnostics {
        out.push_str(&format!("error: {}\n", diagnostic.message));
        out.push_str(&format!("  | {query}\n"));
        let (start, len) = match diagnostic.span {
            Some(span) => (
                query[..span.start.min(query.len())].chars().count(),
                query
                    .get(span.range())
                    .map(|s| s.chars().count())
                    .unwrap_or(1)
                    .max(1),
            ),
            None => (query.chars().count(), 1),
        };
        out.push_str(&format!("  | {}{}\n", " ".repeat(start), "^".repeat(len)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skyql::{compile, ArrayPolicy};

    #[test]
    fn test_render_table_alignment() {
        let records = vec![
            json!({"handle": "alice.bsky.social", "followersCount": 12}),
            json!({"handle": "bob", "followersCount": 3}),
        ];
        let table = Table::from_records(&records, &[], ArrayPolicy::Skip);
        let expected = "\
HANDLE            | FOLLOWERSCOUNT
----------------- | --------------
alice.bsky.social | 12
bob               | 3
(2 rows)
";
        assert_eq!(render_table(&table), expected);
    }

    #[test]
    fn test_missing_cells_render_empty() {
        let records = vec![json!({"a": "x"}), json!({"b": "y"})];
        let table = Table::from_records(&records, &[], ArrayPolicy::Skip);
        let rendered = render_table(&table);
        assert!(rendered.contains("x | \n") || rendered.contains("x |\n"));
    }

    #[test]
    fn test_empty_table_renders_no_data() {
        assert_eq!(render_table(&Table::default()), "No data retrieved.\n");
        assert_eq!(render_outcome(&QueryOutcome::NoData), "No data retrieved.\n");
    }

    #[test]
    fn test_rows_without_columns_render_no_data() {
        let records = vec![json!({"tags": ["a"]}), json!({"tags": []})];
        let table = Table::from_records(&records, &[], ArrayPolicy::Skip);
        assert_eq!(table.len(), 2);
        assert_eq!(render_table(&table), "No data retrieved.\n");
    }

    #[test]
    fn test_long_cells_are_cut() {
        let long = "word ".repeat(40);
        let cut = fit(&long);
        assert_eq!(cut.chars().count(), MAX_CELL_WIDTH);
        assert!(cut.ends_with('…'));
        assert_eq!(fit("two\nlines"), "two lines");
    }

    #[test]
    fn test_render_json_stealth() {
        let outcome = QueryOutcome::Stealth {
            operation: "getTimeline".to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(&render_json(&outcome).unwrap()).unwrap();
        assert_eq!(value, json!({"status": "stealth", "operation": "getTimeline"}));
    }

    #[test]
    fn test_render_json_rows() {
        let table = Table::from_records(&[json!({"a": 1})], &[], ArrayPolicy::Skip);
        let out = render_json(&QueryOutcome::Table(table)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value, json!([{"a": 1}]));
    }

    #[test]
    fn test_render_diagnostics_caret() {
        let query = "SELECT * FROM posts ?";
        let compiled = compile(query).unwrap();
        let out = render_diagnostics(query, &compiled.diagnostics);
        assert!(out.contains("error: unexpected character '?'"));
        assert!(out.contains(&format!("  | {}^\n", " ".repeat(20))));
    }

    #[test]
    fn test_render_diagnostics_end_of_input() {
        let query = "SELECT * FROM";
        let compiled = compile(query).unwrap();
        let out = render_diagnostics(query, &compiled.diagnostics);
        assert_eq!(
            out,
            "error: expected a table name\n  | SELECT * FROM\n  |              ^\n"
        );
    }
}
