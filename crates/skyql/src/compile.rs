//! Text-to-query pipeline: tokenize, parse, build the tree, extract.

use crate::extract::SemanticQuery;
use crate::parser::parse_query;
use crate::tree::{build_tree, Tree};
use crate::types::{Diagnostic, QueryError, QueryResult};

/// A compiled query together with everything found along the way.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub tree: Tree,
    pub query: SemanticQuery,
    pub diagnostics: Vec<Diagnostic>,
}

impl Compiled {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Compile a query, best effort. Syntax problems are returned as
/// diagnostics; only internal invariant failures are errors.
pub fn compile(text: &str) -> QueryResult<Compiled> {
    let tree = build_tree(parse_query(text))?;
    let query = SemanticQuery::from_tree(&tree)?;
    let diagnostics = tree.diagnostics();
    if !diagnostics.is_empty() {
        tracing::debug!("query compiled with {} diagnostic(s)", diagnostics.len());
    }
    Ok(Compiled {
        tree,
        query,
        diagnostics,
    })
}

/// Compile a query, refusing it when any diagnostic was produced.
pub fn compile_strict(text: &str) -> QueryResult<Compiled> {
    let compiled = compile(text)?;
    match compiled.diagnostics.first() {
        None => Ok(compiled),
        Some(first) => Err(QueryError::Syntax {
            count: compiled.diagnostics.len(),
            first: first.clone(),
        }),
    }
}
