//! Resilient recursive-descent parser.
//!
//! Grammar:
//! ```text
//! file         := select_stmt
//! select_stmt  := SELECT field_list [from_clause] [where_clause]
//! field_list   := field (',' field)*
//! field        := '*' | expr
//! from_clause  := FROM IDENTIFIER
//! where_clause := WHERE expr
//! expr         := small_expr (op small_expr)*
//! small_expr   := IDENTIFIER | STRING
//! op           := OR | AND | '='
//! ```
//!
//! The parser never builds nodes directly. It records a flat list of
//! [`Event`]s which [`crate::tree::build_tree`] replays into a tree, and it
//! never stops at the first problem: errors are attached to the token
//! where they were noticed and parsing carries on. Every loop consumes at
//! least one token per iteration, so parsing always terminates.

use serde::{Deserialize, Serialize};

use crate::lexer::tokenize;
use crate::types::{NodeKind, Token, TokenKind};

/// One step of the parse trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Begin a subtree. The kind starts as [`NodeKind::ErrorTree`] and is
    /// rewritten when the rule that opened it closes.
    Open { kind: NodeKind },
    /// End the innermost open subtree.
    Close,
    /// Consume the next input token.
    Advance,
}

/// Output of a parse: the annotated tokens, the event trace, and errors
/// that were found past the end of input.
#[derive(Debug, Clone)]
pub struct Parse {
    pub tokens: Vec<Token>,
    pub events: Vec<Event>,
    pub unreported: Vec<String>,
}

/// Operator precedence classes, loosest first.
const PRECEDENCE: &[&[TokenKind]] = &[&[TokenKind::Or], &[TokenKind::And], &[TokenKind::Equals]];

/// Tokens that start a clause. Recovery never consumes them.
const CLAUSE_START: &[TokenKind] = &[TokenKind::From, TokenKind::Where];

const FIELD_START: &[TokenKind] = &[TokenKind::Star, TokenKind::Identifier, TokenKind::String];

/// Handle to an `Open` event whose kind is still a placeholder.
#[derive(Debug)]
struct MarkOpened {
    index: usize,
}

/// Handle to a finished subtree, used to wrap it retroactively.
#[derive(Debug, Clone, Copy)]
struct MarkClosed {
    index: usize,
}

/// Tokenize and parse a query in one call.
pub fn parse_query(query: &str) -> Parse {
    parse(tokenize(query))
}

/// Parse a token list into an event trace.
pub fn parse(tokens: Vec<Token>) -> Parse {
    let mut p = Parser::new(tokens);
    file(&mut p);
    p.finish()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    events: Vec<Event>,
    unreported: Vec<String>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            events: Vec::new(),
            unreported: Vec::new(),
        }
    }

    fn finish(self) -> Parse {
        tracing::debug!(
            "parsed {} tokens into {} events ({} unreported errors)",
            self.tokens.len(),
            self.events.len(),
            self.unreported.len()
        );
        Parse {
            tokens: self.tokens,
            events: self.events,
            unreported: self.unreported,
        }
    }

    fn open(&mut self) -> MarkOpened {
        let mark = MarkOpened {
            index: self.events.len(),
        };
        self.events.push(Event::Open {
            kind: NodeKind::ErrorTree,
        });
        mark
    }

    /// Open a node that starts before an already closed one, making the
    /// closed node its first child.
    fn open_before(&mut self, closed: MarkClosed) -> MarkOpened {
        self.events.insert(
            closed.index,
            Event::Open {
                kind: NodeKind::ErrorTree,
            },
        );
        MarkOpened {
            index: closed.index,
        }
    }

    fn close(&mut self, mark: MarkOpened, kind: NodeKind) -> MarkClosed {
        self.events[mark.index] = Event::Open { kind };
        self.events.push(Event::Close);
        MarkClosed { index: mark.index }
    }

    fn eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn nth(&self, lookahead: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + lookahead).map(|t| t.kind)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.nth(0) == Some(kind)
    }

    fn at_any(&self, kinds: &[TokenKind]) -> bool {
        self.nth(0).is_some_and(|k| kinds.contains(&k))
    }

    fn advance(&mut self) {
        if self.eof() {
            return;
        }
        self.events.push(Event::Advance);
        self.pos += 1;
    }

    /// Attach an error to the current token, or to the unreported list
    /// when the input is exhausted.
    fn error(&mut self, message: &str) {
        match self.tokens.get_mut(self.pos) {
            Some(token) => token.errors.push(message.to_string()),
            None => self.unreported.push(message.to_string()),
        }
    }

    /// Consume a token of the given kind, or record `message` and consume
    /// whatever is there instead. Clause keywords are left in place so
    /// the enclosing rule can still parse them.
    fn expect(&mut self, kind: TokenKind, message: &str) {
        if self.at(kind) {
            self.advance();
            return;
        }
        self.error(message);
        if !self.at_any(CLAUSE_START) {
            self.advance();
        }
    }

    /// Wrap the current token in an error node.
    fn advance_with_error(&mut self, message: &str) {
        let m = self.open();
        self.error(message);
        self.advance();
        self.close(m, NodeKind::ErrorTree);
    }
}

fn file(p: &mut Parser) {
    let m = p.open();
    select_stmt(p);
    p.close(m, NodeKind::File);
}

fn select_stmt(p: &mut Parser) {
    let m = p.open();
    p.expect(TokenKind::Select, "expected SELECT");
    field_list(p);
    if p.at(TokenKind::From) {
        from_clause(p);
    }
    if p.at(TokenKind::Where) {
        where_clause(p);
    }
    while !p.eof() {
        p.advance_with_error("unexpected token");
    }
    p.close(m, NodeKind::SelectStmt);
}

fn field_list(p: &mut Parser) {
    let m = p.open();
    field(p);
    while !p.eof() && !p.at_any(CLAUSE_START) {
        if p.at(TokenKind::Comma) {
            p.advance();
            field(p);
        } else if p.at_any(FIELD_START) {
            p.error("expected ','");
            field(p);
        } else {
            p.advance_with_error("expected ','");
        }
    }
    p.close(m, NodeKind::FieldList);
}

fn field(p: &mut Parser) {
    match p.nth(0) {
        Some(TokenKind::Star) => p.advance(),
        // Left in place for the list loop to consume.
        Some(TokenKind::Comma) => p.error("expected a field"),
        _ => expr(p),
    }
}

fn from_clause(p: &mut Parser) {
    let m = p.open();
    p.expect(TokenKind::From, "expected FROM");
    p.expect(TokenKind::Identifier, "expected a table name");
    p.close(m, NodeKind::FromClause);
}

fn where_clause(p: &mut Parser) {
    let m = p.open();
    p.expect(TokenKind::Where, "expected WHERE");
    expr(p);
    p.close(m, NodeKind::WhereClause);
}

fn expr(p: &mut Parser) {
    expr_rec(p, None);
}

fn expr_rec(p: &mut Parser, left: Option<TokenKind>) {
    let mut lhs = small_expr(p);

    while let Some(right) = p.nth(0) {
        if !right_binds_tighter(left, right) {
            break;
        }
        let m = p.open_before(lhs);
        p.advance();
        expr_rec(p, Some(right));
        lhs = p.close(m, NodeKind::ExprBinary);
    }
}

fn small_expr(p: &mut Parser) -> MarkClosed {
    let m = p.open();
    match p.nth(0) {
        Some(TokenKind::Identifier) => {
            p.advance();
            p.close(m, NodeKind::ExprName)
        }
        Some(TokenKind::String) => {
            p.advance();
            p.close(m, NodeKind::ExprString)
        }
        _ => {
            p.error("expected an expression");
            if !p.at_any(CLAUSE_START) {
                p.advance();
            }
            p.close(m, NodeKind::ErrorTree)
        }
    }
}

/// Precedence class of an operator, or `None` for non-operators.
fn precedence(kind: TokenKind) -> Option<usize> {
    PRECEDENCE.iter().position(|class| class.contains(&kind))
}

/// Decide whether `right` belongs inside the right operand of `left`
/// (`A left (B right C)`) or should be left to the enclosing call
/// (`(A left B) right C`). `left` is `None` at the start of an
/// expression.
fn right_binds_tighter(left: Option<TokenKind>, right: TokenKind) -> bool {
    let Some(right_class) = precedence(right) else {
        return false;
    };
    match left.and_then(precedence) {
        Some(left_class) => right_class > left_class,
        None => true,
    }
}
