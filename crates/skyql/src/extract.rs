//! Semantic extraction. Recovers the table name, projection list and
//! predicates from a syntax tree.
//!
//! Extraction is best-effort: a broken predicate does not prevent the
//! table name from being read. Only a tree whose root is not `FILE`
//! is rejected.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tree::{Child, Tree};
use crate::types::{NodeKind, QueryError, QueryResult, TokenKind};

/// A single `key = value` comparison from a WHERE clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub key: String,
    pub operator: String,
    pub value: String,
}

impl Predicate {
    pub fn new(key: impl Into<String>, operator: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} '{}'", self.key, self.operator, self.value)
    }
}

/// Boolean connector between two predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

/// One entry of a flattened WHERE clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredicateItem {
    Predicate(Predicate),
    Connector(Connector),
}

/// Everything the interpreter needs from a parsed query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticQuery {
    /// Source name from the FROM clause, empty when absent.
    pub table: String,
    /// Predicates interleaved with connectors, in source order.
    pub predicates: Vec<PredicateItem>,
    /// Requested fields; empty means every field.
    pub fields: Vec<String>,
}

impl SemanticQuery {
    pub fn from_tree(tree: &Tree) -> QueryResult<Self> {
        Ok(Self {
            table: extract_table_name(tree)?,
            predicates: extract_predicates(tree)?,
            fields: extract_fields(tree)?,
        })
    }

    /// The predicate triples, skipping connectors.
    pub fn comparisons(&self) -> impl Iterator<Item = &Predicate> {
        self.predicates.iter().filter_map(|item| match item {
            PredicateItem::Predicate(p) => Some(p),
            PredicateItem::Connector(_) => None,
        })
    }
}

fn statement(tree: &Tree) -> QueryResult<Option<&Tree>> {
    if tree.kind != NodeKind::File {
        return Err(QueryError::Invariant(format!(
            "expected a FILE root, found {}",
            tree.kind
        )));
    }
    Ok(tree.child(NodeKind::SelectStmt))
}

fn clause(tree: &Tree, kind: NodeKind) -> QueryResult<Option<&Tree>> {
    Ok(statement(tree)?.and_then(|stmt| stmt.child(kind)))
}

/// The identifier after FROM, or an empty string.
pub fn extract_table_name(tree: &Tree) -> QueryResult<String> {
    let name = clause(tree, NodeKind::FromClause)?
        .and_then(|from| {
            from.children
                .iter()
                .filter_map(Child::as_token)
                .find(|t| t.kind == TokenKind::Identifier)
        })
        .map(|t| t.text.clone())
        .unwrap_or_default();
    Ok(name)
}

/// The projection list, without `*` entries.
pub fn extract_fields(tree: &Tree) -> QueryResult<Vec<String>> {
    let Some(list) = clause(tree, NodeKind::FieldList)? else {
        return Ok(Vec::new());
    };

    // Commas and `*` are bare tokens; every field expression is a subtree.
    let fields = list
        .children
        .iter()
        .filter_map(|child| match child {
            Child::Token(_) => None,
            Child::Tree(tree) => {
                let text = operand_text(tree);
                if text.is_none() {
                    tracing::debug!("skipping {} in field list", tree.kind);
                }
                text
            }
        })
        .collect();
    Ok(fields)
}

/// The WHERE clause flattened into predicates and connectors.
pub fn extract_predicates(tree: &Tree) -> QueryResult<Vec<PredicateItem>> {
    let mut out = Vec::new();
    if let Some(condition) = clause(tree, NodeKind::WhereClause)?
        .and_then(|w| w.children.iter().find_map(Child::as_tree))
    {
        flatten_condition(condition, &mut out);
    }
    Ok(out)
}

fn flatten_condition(node: &Tree, out: &mut Vec<PredicateItem>) {
    if node.kind != NodeKind::ExprBinary || node.children.len() != 3 {
        tracing::debug!("ignoring {} in WHERE clause", node.kind);
        return;
    }

    let Some(op) = node.children[1].as_token() else {
        return;
    };
    let lhs = node.children[0].as_tree();
    let rhs = node.children[2].as_tree();

    match op.kind {
        TokenKind::And | TokenKind::Or => {
            let connector = if op.kind == TokenKind::And {
                Connector::And
            } else {
                Connector::Or
            };
            let mut left = Vec::new();
            if let Some(lhs) = lhs {
                flatten_condition(lhs, &mut left);
            }
            let mut right = Vec::new();
            if let Some(rhs) = rhs {
                flatten_condition(rhs, &mut right);
            }
            // A connector only ever sits between two predicates.
            let joined = !left.is_empty() && !right.is_empty();
            out.append(&mut left);
            if joined {
                out.push(PredicateItem::Connector(connector));
            } else {
                tracing::debug!("dropping {} with a malformed side", connector.as_str());
            }
            out.append(&mut right);
        }
        TokenKind::Equals => {
            let key = lhs.and_then(operand_text);
            let value = rhs.and_then(operand_text);
            match (key, value) {
                (Some(key), Some(value)) => {
                    out.push(PredicateItem::Predicate(Predicate::new(key, op.text.clone(), value)))
                }
                _ => tracing::debug!("skipping malformed comparison '{}'", node.text()),
            }
        }
        _ => {}
    }
}

/// Text of a name or string operand, quotes removed.
fn operand_text(node: &Tree) -> Option<String> {
    let token = node.children.first().and_then(Child::as_token)?;
    match node.kind {
        NodeKind::ExprName => Some(token.text.clone()),
        NodeKind::ExprString => Some(strip_quotes(&token.text).to_string()),
        _ => None,
    }
}

/// Remove one pair of matching surrounding quotes, single or double.
pub fn strip_quotes(text: &str) -> &str {
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_query;
    use crate::tree::build_tree;

    fn query(text: &str) -> SemanticQuery {
        let tree = build_tree(parse_query(text)).unwrap();
        SemanticQuery::from_tree(&tree).unwrap()
    }

    #[test]
    fn test_extract_simple() {
        let q = query("SELECT * FROM posts");
        assert_eq!(q.table, "posts");
        assert!(q.fields.is_empty());
        assert!(q.predicates.is_empty());
    }

    #[test]
    fn test_extract_single_predicate() {
        let q = query("SELECT * WHERE actor = 'aaa'");
        assert_eq!(q.table, "");
        assert_eq!(
            q.predicates,
            vec![PredicateItem::Predicate(Predicate::new("actor", "=", "aaa"))]
        );
    }

    #[test]
    fn test_extract_fields_skips_commas_and_star() {
        let q = query("SELECT handle, *, displayName, post.author.did FROM profile");
        assert_eq!(q.fields, vec!["handle", "displayName", "post.author.did"]);
    }

    #[test]
    fn test_extract_compound_predicates() {
        let q = query("SELECT * FROM posts WHERE author = 'a' AND feed = 'b' OR actor = 'c'");
        assert_eq!(
            q.predicates,
            vec![
                PredicateItem::Predicate(Predicate::new("author", "=", "a")),
                PredicateItem::Connector(Connector::And),
                PredicateItem::Predicate(Predicate::new("feed", "=", "b")),
                PredicateItem::Connector(Connector::Or),
                PredicateItem::Predicate(Predicate::new("actor", "=", "c")),
            ]
        );
        assert_eq!(q.comparisons().count(), 3);
    }

    #[test]
    fn test_identifier_values_are_kept_verbatim() {
        let q = query("SELECT * FROM profile WHERE actor = bob.bsky.social");
        assert_eq!(
            q.predicates,
            vec![PredicateItem::Predicate(Predicate::new(
                "actor",
                "=",
                "bob.bsky.social"
            ))]
        );
    }

    #[test]
    fn test_broken_predicate_keeps_table_name() {
        let q = query("SELECT * FROM posts WHERE actor = 'unterminated");
        assert_eq!(q.table, "posts");
        assert!(q.predicates.is_empty());
    }

    #[test]
    fn test_broken_field_list_keeps_table_name() {
        let q = query("SELECT FROM posts");
        assert_eq!(q.table, "posts");
        assert!(q.fields.is_empty());
    }

    #[test]
    fn test_stray_commas_keep_table_name() {
        let q = query("SELECT handle, , displayName FROM profile WHERE actor = 'bob'");
        assert_eq!(q.table, "profile");
        assert_eq!(q.fields, vec!["handle", "displayName"]);
        assert_eq!(q.comparisons().count(), 1);
    }

    #[test]
    fn test_missing_comma_keeps_both_fields() {
        let q = query("SELECT handle displayName FROM profile");
        assert_eq!(q.table, "profile");
        assert_eq!(q.fields, vec!["handle", "displayName"]);
    }

    fn assert_alternating(items: &[PredicateItem]) {
        for (i, item) in items.iter().enumerate() {
            let expect_predicate = i % 2 == 0;
            assert_eq!(
                matches!(item, PredicateItem::Predicate(_)),
                expect_predicate,
                "item {i} breaks alternation in {items:?}"
            );
        }
        assert!(items.len() % 2 == 1 || items.is_empty());
    }

    #[test]
    fn test_broken_right_operand_drops_connector() {
        let q = query("SELECT * FROM posts WHERE actor = 'bob' AND lang = 'oops");
        assert_eq!(
            q.predicates,
            vec![PredicateItem::Predicate(Predicate::new("actor", "=", "bob"))]
        );
    }

    #[test]
    fn test_bare_name_operand_drops_connector() {
        let q = query("SELECT * FROM posts WHERE actor AND author = 'bob'");
        assert_eq!(
            q.predicates,
            vec![PredicateItem::Predicate(Predicate::new("author", "=", "bob"))]
        );
    }

    #[test]
    fn test_dangling_connector_is_dropped() {
        let q = query("SELECT * FROM posts WHERE actor = 'bob' AND");
        assert_eq!(
            q.predicates,
            vec![PredicateItem::Predicate(Predicate::new("actor", "=", "bob"))]
        );
    }

    #[test]
    fn test_predicates_always_alternate() {
        for text in [
            "SELECT * WHERE a = 'x' AND b = 'y' OR c = 'z'",
            "SELECT * WHERE a = 'x' AND OR c = 'z'",
            "SELECT * WHERE a AND b OR c = 'z' AND d",
            "SELECT * WHERE OR a = 'x' AND",
            "SELECT * WHERE a = 'x' OR b = 'oops AND c = 'z'",
        ] {
            assert_alternating(&query(text).predicates);
        }
    }

    #[test]
    fn test_missing_table_name_keeps_predicates() {
        let q = query("SELECT * FROM WHERE actor = 'bob'");
        assert_eq!(q.table, "");
        assert_eq!(q.comparisons().count(), 1);
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("'abc'"), "abc");
        assert_eq!(strip_quotes("\"abc\""), "abc");
        assert_eq!(strip_quotes("'abc\""), "'abc\"");
        assert_eq!(strip_quotes("'"), "'");
        assert_eq!(strip_quotes("abc"), "abc");
    }

    #[test]
    fn test_non_file_root_is_rejected() {
        let tree = Tree {
            kind: NodeKind::SelectStmt,
            children: Vec::new(),
            errors: Vec::new(),
        };
        assert!(matches!(
            extract_table_name(&tree),
            Err(QueryError::Invariant(_))
        ));
        assert!(matches!(extract_fields(&tree), Err(QueryError::Invariant(_))));
        assert!(matches!(
            extract_predicates(&tree),
            Err(QueryError::Invariant(_))
        ));
    }
}
