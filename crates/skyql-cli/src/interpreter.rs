//! Query interpreter: compiles text, plans a retrieval, executes it, and
//! turns the response into a table.

use serde::Serialize;
use serde_json::Value;

use skyql::{compile, compile_strict, dispatch, ArrayPolicy, Compiled, Retrieval, Table};

use crate::session::{BskySession, Fetched, Page, PostSearch};
use crate::types::CliResult;

/// What a query produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Table(Table),
    /// Nothing to fetch, or the fetch returned no records.
    NoData,
    /// The operation needs a signed-in account.
    Stealth { operation: String },
}

impl QueryOutcome {
    /// Wrap a table, or report no data when it has no rows or no columns.
    /// Records whose every field is an array flatten to rows without
    /// columns under [`ArrayPolicy::Skip`].
    pub fn from_table(table: Table) -> Self {
        if table.is_empty() || table.columns.is_empty() {
            QueryOutcome::NoData
        } else {
            QueryOutcome::Table(table)
        }
    }
}

/// A query run from text to outcome.
#[derive(Debug, Clone)]
pub struct QueryReport {
    pub compiled: Compiled,
    pub retrieval: Option<Retrieval>,
    pub outcome: QueryOutcome,
}

/// What a free-text search looks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTarget {
    Posts,
    Actors,
}

impl SearchTarget {
    fn collection_key(&self) -> &'static str {
        match self {
            SearchTarget::Posts => "posts",
            SearchTarget::Actors => "actors",
        }
    }
}

/// Runs queries against a session, one network call per query.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryInterpreter {
    array_policy: ArrayPolicy,
    strict: bool,
}

impl QueryInterpreter {
    pub fn new(array_policy: ArrayPolicy) -> Self {
        Self {
            array_policy,
            strict: false,
        }
    }

    /// Refuse queries with syntax errors before any network call.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn array_policy(&self) -> ArrayPolicy {
        self.array_policy
    }

    pub fn set_array_policy(&mut self, policy: ArrayPolicy) {
        self.array_policy = policy;
    }

    pub async fn run(&self, session: &mut BskySession, text: &str) -> CliResult<QueryReport> {
        let compiled = if self.strict {
            compile_strict(text)?
        } else {
            compile(text)?
        };

        for diagnostic in &compiled.diagnostics {
            tracing::warn!("recovered from: {diagnostic}");
        }

        let Some(retrieval) = dispatch::plan(&compiled.query) else {
            return Ok(QueryReport {
                compiled,
                retrieval: None,
                outcome: QueryOutcome::NoData,
            });
        };

        let outcome = match session.execute(&retrieval).await? {
            Fetched::Stealth => QueryOutcome::Stealth {
                operation: retrieval.operation().to_string(),
            },
            Fetched::Response(response) => {
                let records = dispatch::records(&retrieval, response);
                QueryOutcome::from_table(Table::from_records(
                    &records,
                    &compiled.query.fields,
                    self.array_policy,
                ))
            }
        };

        Ok(QueryReport {
            compiled,
            retrieval: Some(retrieval),
            outcome,
        })
    }

    /// Free-text search, tabulated like a query result.
    pub async fn search(
        &self,
        session: &mut BskySession,
        target: SearchTarget,
        text: &str,
    ) -> CliResult<QueryOutcome> {
        let page = Page::first(session.limit());
        let response = match target {
            SearchTarget::Posts => {
                let search = PostSearch {
                    q: text.to_string(),
                    ..Default::default()
                };
                session.search_posts(&search, &page).await?
            }
            SearchTarget::Actors => session.search_actors(text, &page).await?,
        };

        let records = match response {
            Value::Object(mut map) => match map.remove(target.collection_key()) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        Ok(QueryOutcome::from_table(Table::from_records(
            &records,
            &[],
            self.array_policy,
        )))
    }
}
