//! Flattening of nested records into a uniform table.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One flattened record, keys in insertion order.
pub type Row = Map<String, Value>;

/// Column name given to a record that is not an object.
pub const SCALAR_COLUMN: &str = "value";

/// What to do with array-valued fields while flattening.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayPolicy {
    /// Leave array fields out.
    #[default]
    Skip,
    /// Descend into arrays, using the element index as the key segment.
    Index,
}

impl FromStr for ArrayPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "index" => Ok(Self::Index),
            other => Err(format!("unknown array policy '{other}' (expected skip or index)")),
        }
    }
}

impl fmt::Display for ArrayPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => f.write_str("skip"),
            Self::Index => f.write_str("index"),
        }
    }
}

/// Flatten a record into `_`-joined lowercase paths to its leaves.
///
/// When two paths collide after lowercasing, the first one seen keeps
/// the cell.
pub fn flatten(record: &Value, policy: ArrayPolicy) -> Row {
    let mut row = Row::new();
    match record {
        Value::Object(map) => {
            for (key, value) in map {
                flatten_into(&mut row, &key.to_lowercase(), value, policy);
            }
        }
        other => {
            row.insert(SCALAR_COLUMN.to_string(), other.clone());
        }
    }
    row
}

fn flatten_into(row: &mut Row, path: &str, value: &Value, policy: ArrayPolicy) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = format!("{path}_{}", key.to_lowercase());
                flatten_into(row, &child_path, child, policy);
            }
        }
        Value::Array(items) => match policy {
            ArrayPolicy::Skip => {}
            ArrayPolicy::Index => {
                for (i, child) in items.iter().enumerate() {
                    flatten_into(row, &format!("{path}_{i}"), child, policy);
                }
            }
        },
        leaf => {
            if row.contains_key(path) {
                tracing::trace!("column '{path}' already set, keeping first value");
                return;
            }
            row.insert(path.to_string(), leaf.clone());
        }
    }
}

/// Map a requested field name onto its flattened column name.
pub fn normalize_field(name: &str) -> String {
    name.to_lowercase().replace('.', "_")
}

/// Keep only the requested fields, in request order. Missing fields
/// become empty strings.
pub fn project(row: &Row, fields: &[String]) -> Row {
    fields
        .iter()
        .map(|field| {
            let key = normalize_field(field);
            let cell = row
                .get(&key)
                .cloned()
                .unwrap_or_else(|| Value::String(String::new()));
            (key, cell)
        })
        .collect()
}

/// Display text of a cell. Strings are shown without quotes and null
/// as empty.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Rows with a shared column list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    /// Flatten and project a record collection.
    ///
    /// With a projection the columns are the normalized requested names.
    /// Without one they are the union of flattened keys across rows, in
    /// first-seen order.
    pub fn from_records(records: &[Value], fields: &[String], policy: ArrayPolicy) -> Self {
        let flat: Vec<Row> = records.iter().map(|r| flatten(r, policy)).collect();

        let mut seen = HashSet::new();
        let columns: Vec<String> = if fields.is_empty() {
            flat.iter()
                .flat_map(|row| row.keys())
                .filter(|key| seen.insert(key.as_str()))
                .cloned()
                .collect()
        } else {
            let mut seen_fields = HashSet::new();
            fields
                .iter()
                .map(|f| normalize_field(f))
                .filter(|f| seen_fields.insert(f.clone()))
                .collect()
        };

        let rows = flat.iter().map(|row| project(row, &columns)).collect();

        tracing::debug!(
            "built table with {} columns from {} records",
            columns.len(),
            records.len()
        );
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Display text of one cell, empty when absent.
    pub fn cell(&self, row: usize, column: &str) -> String {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(cell_text)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(row: &Row) -> Vec<&str> {
        row.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_flatten_nested_object() {
        let row = flatten(&json!({"a": {"b": 1, "c": 2}}), ArrayPolicy::Skip);
        assert_eq!(keys(&row), vec!["a_b", "a_c"]);
        assert_eq!(row["a_b"], json!(1));
        assert_eq!(row["a_c"], json!(2));
    }

    #[test]
    fn test_flatten_lowercases_keys() {
        let row = flatten(
            &json!({"post": {"author": {"displayName": "Alice"}}}),
            ArrayPolicy::Skip,
        );
        assert_eq!(keys(&row), vec!["post_author_displayname"]);
    }

    #[test]
    fn test_flatten_collision_keeps_first() {
        let row = flatten(
            &json!({"a": {"b": 1}, "a_b": 2, "A_B": 3}),
            ArrayPolicy::Skip,
        );
        assert_eq!(row.len(), 1);
        assert_eq!(row["a_b"], json!(1));
    }

    #[test]
    fn test_flatten_arrays_skip() {
        let row = flatten(
            &json!({"handle": "bob", "labels": [{"val": "x"}], "tags": []}),
            ArrayPolicy::Skip,
        );
        assert_eq!(keys(&row), vec!["handle"]);
    }

    #[test]
    fn test_flatten_arrays_index() {
        let row = flatten(
            &json!({"tags": ["a", "b"], "labels": [{"val": "x"}]}),
            ArrayPolicy::Index,
        );
        assert_eq!(keys(&row), vec!["tags_0", "tags_1", "labels_0_val"]);
        assert_eq!(row["tags_1"], json!("b"));
    }

    #[test]
    fn test_flatten_scalar_root() {
        let row = flatten(&json!("hello"), ArrayPolicy::Skip);
        assert_eq!(keys(&row), vec![SCALAR_COLUMN]);
        assert_eq!(row[SCALAR_COLUMN], json!("hello"));
    }

    #[test]
    fn test_flatten_empty_object_has_no_columns() {
        assert!(flatten(&json!({"viewer": {}}), ArrayPolicy::Skip).is_empty());
    }

    #[test]
    fn test_project_normalizes_and_fills() {
        let row = flatten(
            &json!({"post": {"author": {"handle": "bob"}}, "likeCount": 3}),
            ArrayPolicy::Skip,
        );
        let projected = project(
            &row,
            &["post.author.handle".to_string(), "missing".to_string()],
        );
        assert_eq!(keys(&projected), vec!["post_author_handle", "missing"]);
        assert_eq!(projected["post_author_handle"], json!("bob"));
        assert_eq!(projected["missing"], json!(""));
    }

    #[test]
    fn test_table_union_of_columns() {
        let records = vec![json!({"a": 1, "b": 2}), json!({"b": 3, "c": 4})];
        let table = Table::from_records(&records, &[], ArrayPolicy::Skip);
        assert_eq!(table.columns, vec!["a", "b", "c"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(1, "a"), "");
        assert_eq!(table.cell(1, "c"), "4");
        assert_eq!(table.rows[1]["a"], json!(""));
    }

    #[test]
    fn test_table_with_projection() {
        let records = vec![json!({"handle": "a", "displayName": "A"})];
        let fields = vec![
            "displayName".to_string(),
            "handle".to_string(),
            "DISPLAYNAME".to_string(),
        ];
        let table = Table::from_records(&records, &fields, ArrayPolicy::Skip);
        assert_eq!(table.columns, vec!["displayname", "handle"]);
        assert_eq!(table.cell(0, "displayname"), "A");
    }

    #[test]
    fn test_empty_records_make_empty_table() {
        let table = Table::from_records(&[], &[], ArrayPolicy::Skip);
        assert!(table.is_empty());
        assert!(table.columns.is_empty());
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&json!("x")), "x");
        assert_eq!(cell_text(&Value::Null), "");
        assert_eq!(cell_text(&json!(true)), "true");
        assert_eq!(cell_text(&json!(1.5)), "1.5");
    }

    #[test]
    fn test_array_policy_from_str() {
        assert_eq!("INDEX".parse::<ArrayPolicy>(), Ok(ArrayPolicy::Index));
        assert_eq!("skip".parse::<ArrayPolicy>(), Ok(ArrayPolicy::Skip));
        assert!("zip".parse::<ArrayPolicy>().is_err());
    }
}
