//! Syntax tree and the event replay that builds it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parser::{Event, Parse};
use crate::types::{Diagnostic, NodeKind, QueryError, QueryResult, Token};

/// An interior node of the syntax tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub kind: NodeKind,
    pub children: Vec<Child>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// A child of a [`Tree`]: either a leaf token or a nested node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Child {
    Token(Token),
    Tree(Tree),
}

impl Child {
    pub fn as_token(&self) -> Option<&Token> {
        match self {
            Child::Token(token) => Some(token),
            Child::Tree(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Child::Tree(tree) => Some(tree),
            Child::Token(_) => None,
        }
    }
}

enum Slot {
    Marker(NodeKind),
    Child(Child),
}

/// Replay a parse trace into a tree rooted at [`NodeKind::File`].
///
/// Errors that the parser could not attach to a token are attached to
/// the root.
pub fn build_tree(parse: Parse) -> QueryResult<Tree> {
    let Parse {
        tokens,
        events,
        unreported,
    } = parse;

    let mut tokens = tokens.into_iter();
    let mut stack: Vec<Slot> = Vec::new();

    for event in events {
        match event {
            Event::Open { kind } => stack.push(Slot::Marker(kind)),
            Event::Advance => {
                let token = tokens.next().ok_or_else(|| {
                    QueryError::Invariant("advance past the last token".to_string())
                })?;
                stack.push(Slot::Child(Child::Token(token)));
            }
            Event::Close => {
                let mut children = Vec::new();
                let kind = loop {
                    match stack.pop() {
                        Some(Slot::Child(child)) => children.push(child),
                        Some(Slot::Marker(kind)) => break kind,
                        None => {
                            return Err(QueryError::Invariant(
                                "close without a matching open".to_string(),
                            ))
                        }
                    }
                };
                children.reverse();
                stack.push(Slot::Child(Child::Tree(Tree {
                    kind,
                    children,
                    errors: Vec::new(),
                })));
            }
        }
    }

    if tokens.next().is_some() {
        return Err(QueryError::Invariant(
            "tokens left over after replay".to_string(),
        ));
    }

    if stack.len() != 1 {
        return Err(QueryError::Invariant(format!(
            "expected a single root after replay, found {} entries",
            stack.len()
        )));
    }

    match stack.pop() {
        Some(Slot::Child(Child::Tree(mut root))) if root.kind == NodeKind::File => {
            root.errors.extend(unreported);
            Ok(root)
        }
        Some(Slot::Child(Child::Tree(root))) => Err(QueryError::Invariant(format!(
            "root is {} instead of FILE",
            root.kind
        ))),
        _ => Err(QueryError::Invariant(
            "root is not a tree node".to_string(),
        )),
    }
}

impl Tree {
    /// First direct child node of the given kind.
    pub fn child(&self, kind: NodeKind) -> Option<&Tree> {
        self.children
            .iter()
            .filter_map(Child::as_tree)
            .find(|t| t.kind == kind)
    }

    /// All leaf tokens in source order.
    pub fn tokens(&self) -> Vec<&Token> {
        let mut out = Vec::new();
        self.collect_tokens(&mut out);
        out
    }

    fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
        for child in &self.children {
            match child {
                Child::Token(token) => out.push(token),
                Child::Tree(tree) => tree.collect_tokens(out),
            }
        }
    }

    /// Leaf token text concatenated in source order.
    pub fn text(&self) -> String {
        self.tokens().iter().map(|t| t.text.as_str()).collect()
    }

    /// Every error message in the tree: token errors in source order,
    /// then node-level errors.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut out: Vec<Diagnostic> = self
            .tokens()
            .into_iter()
            .flat_map(|t| {
                t.errors.iter().map(|message| Diagnostic {
                    message: message.clone(),
                    span: Some(t.span),
                })
            })
            .collect();
        self.collect_node_errors(&mut out);
        out
    }

    fn collect_node_errors(&self, out: &mut Vec<Diagnostic>) {
        for child in self.children.iter().filter_map(Child::as_tree) {
            child.collect_node_errors(out);
        }
        out.extend(self.errors.iter().map(|message| Diagnostic {
            message: message.clone(),
            span: None,
        }));
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics().is_empty()
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        writeln!(f, "{indent}{}", self.kind)?;
        for message in &self.errors {
            writeln!(f, "{indent}  !! {message}")?;
        }
        for child in &self.children {
            match child {
                Child::Token(token) => {
                    writeln!(f, "{indent}  {} {:?}", token.kind, token.text)?;
                    for message in &token.errors {
                        writeln!(f, "{indent}    !! {message}")?;
                    }
                }
                Child::Tree(tree) => tree.fmt_indented(f, depth + 1)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
