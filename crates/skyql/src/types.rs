//! Core data types shared by every compiler stage.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Byte range of a token in the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// What a token represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    // keywords
    Select,
    From,
    Where,
    And,
    Or,

    // literals
    String,
    Identifier,

    // structure
    Comma,
    Star,
    Equals,

    Error,
}

impl TokenKind {
    /// Keywords are matched case-sensitively.
    pub fn keyword(text: &str) -> Option<Self> {
        match text {
            "SELECT" => Some(Self::Select),
            "FROM" => Some(Self::From),
            "WHERE" => Some(Self::Where),
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            _ => None,
        }
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Self::Select | Self::From | Self::Where | Self::And | Self::Or
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::From => "FROM",
            Self::Where => "WHERE",
            Self::And => "AND",
            Self::Or => "OR",
            Self::String => "STRING",
            Self::Identifier => "IDENTIFIER",
            Self::Comma => "COMMA",
            Self::Star => "STAR",
            Self::Equals => "EQUALS",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A token produced by tokenization.
///
/// Only the parser mutates a token after it is produced, and only to
/// attach error messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            span: Span::new(start, end),
            errors: Vec::new(),
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.errors.push(message.into());
        self
    }
}

/// Grammar productions of the syntax tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    File,
    SelectStmt,
    FieldList,
    FromClause,
    WhereClause,
    ExprBinary,
    ExprName,
    ExprString,
    ErrorTree,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::File => "FILE",
            Self::SelectStmt => "SELECT_STMT",
            Self::FieldList => "FIELD_LIST",
            Self::FromClause => "FROM_CLAUSE",
            Self::WhereClause => "WHERE_CLAUSE",
            Self::ExprBinary => "EXPR_BINARY",
            Self::ExprName => "EXPR_NAME",
            Self::ExprString => "EXPR_STRING",
            Self::ErrorTree => "ERROR_TREE",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A lexical or syntax problem found while compiling a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    /// `None` when the problem was found past the end of input.
    pub span: Option<Span>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "{} at {}..{}", self.message, span.start, span.end),
            None => write!(f, "{} at end of input", self.message),
        }
    }
}

/// Errors that can occur in the query compiler.
#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    /// The parser or tree builder broke one of its own structural
    /// invariants. User input can never cause this.
    #[error("Internal consistency error: {0}")]
    Invariant(String),

    /// Raised only when a caller asks for strict compilation.
    #[error("Query has {count} syntax error(s), first: {first}")]
    Syntax { count: usize, first: Diagnostic },
}

/// Convenience result type.
pub type QueryResult<T> = Result<T, QueryError>;
