//! SkyQL: a small SQL-like query compiler for the Bluesky API.
//!
//! Text goes through [`lexer`], [`parser`], [`tree`] and [`extract`]
//! to become a [`SemanticQuery`]. [`dispatch`] maps that onto a
//! [`Retrieval`], and [`flatten`] turns the fetched records into a
//! [`Table`]. Nothing here performs I/O.

pub mod compile;
pub mod dispatch;
pub mod extract;
pub mod flatten;
pub mod lexer;
pub mod parser;
pub mod tree;
pub mod types;

pub use compile::{compile, compile_strict, Compiled};
pub use dispatch::{plan, records, Retrieval, RECOGNIZED_KEYS, TABLES};
pub use extract::{Connector, Predicate, PredicateItem, SemanticQuery};
pub use flatten::{flatten, project, ArrayPolicy, Row, Table};
pub use lexer::tokenize;
pub use parser::{parse, parse_query, Event, Parse};
pub use tree::{build_tree, Child, Tree};
pub use types::*;
