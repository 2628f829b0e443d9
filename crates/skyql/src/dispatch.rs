//! Retrieval planning. Maps a semantic query onto one remote operation.
//!
//! Planning is pure: it produces a [`Retrieval`] value describing which
//! XRPC method to call. The front-end performs the call and hands the raw
//! response back to [`records`] to pull out the record collection.
//!
//! Only the first predicate whose key is in [`RECOGNIZED_KEYS`] is used.
//! Its operator is not checked and any later predicates are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract::{Predicate, PredicateItem, SemanticQuery};

/// Predicate keys that select the subject of a retrieval.
pub const RECOGNIZED_KEYS: &[&str] = &["actor", "author", "feed"];

/// Table names the planner knows, with a short description.
pub const TABLES: &[(&str, &str)] = &[
    ("timeline", "Home timeline of the signed-in account"),
    ("posts", "Posts by an actor, or of a custom feed (feed = ...)"),
    ("feeds", "Feeds created by an actor, or suggested feeds"),
    ("profile", "Profile of an actor, or of the signed-in account"),
    ("suggestions", "Suggested accounts to follow"),
    ("likes", "Posts liked by an actor"),
    ("followers", "Accounts following an actor"),
    ("following", "Accounts an actor follows"),
    ("mutuals", "Followers of an actor that you also follow"),
];

/// One remote retrieval operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Retrieval {
    Timeline,
    AuthorFeed { actor: String },
    Feed { feed: String },
    ActorFeeds { actor: String },
    SuggestedFeeds,
    /// `None` asks for the signed-in account's own profile.
    Profile { actor: Option<String> },
    Suggestions,
    ActorLikes { actor: String },
    Followers { actor: String },
    Follows { actor: String },
    MutualFollowers { actor: String },
}

impl Retrieval {
    /// Operation name as exposed to the network collaborator.
    pub fn operation(&self) -> &'static str {
        match self {
            Retrieval::Timeline => "getTimeline",
            Retrieval::AuthorFeed { .. } => "getAuthorFeed",
            Retrieval::Feed { .. } => "getFeed",
            Retrieval::ActorFeeds { .. } => "getActorFeeds",
            Retrieval::SuggestedFeeds => "getSuggestedFeeds",
            Retrieval::Profile { .. } => "getProfile",
            Retrieval::Suggestions => "getSuggestions",
            Retrieval::ActorLikes { .. } => "getActorLikes",
            Retrieval::Followers { .. } => "getFollowers",
            Retrieval::Follows { .. } => "getFollows",
            Retrieval::MutualFollowers { .. } => "getMutualFollowers",
        }
    }

    /// Whether the API refuses this call without an access token.
    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            Retrieval::Timeline
                | Retrieval::Suggestions
                | Retrieval::ActorLikes { .. }
                | Retrieval::MutualFollowers { .. }
        )
    }

    /// Response field holding the record list, `None` for single-object
    /// responses.
    pub fn collection_key(&self) -> Option<&'static str> {
        match self {
            Retrieval::Timeline
            | Retrieval::AuthorFeed { .. }
            | Retrieval::Feed { .. }
            | Retrieval::ActorLikes { .. } => Some("feed"),
            Retrieval::ActorFeeds { .. } | Retrieval::SuggestedFeeds => Some("feeds"),
            Retrieval::Suggestions => Some("actors"),
            Retrieval::Followers { .. } | Retrieval::MutualFollowers { .. } => Some("followers"),
            Retrieval::Follows { .. } => Some("follows"),
            Retrieval::Profile { .. } => None,
        }
    }
}

/// First predicate whose key is recognized, scanning left to right.
pub fn first_recognized(predicates: &[PredicateItem]) -> Option<&Predicate> {
    predicates.iter().find_map(|item| match item {
        PredicateItem::Predicate(p) if RECOGNIZED_KEYS.contains(&p.key.as_str()) => Some(p),
        _ => None,
    })
}

/// Choose the retrieval for a query. `None` means the combination of
/// table and predicate key is unsupported and there is no data to fetch.
pub fn plan(query: &SemanticQuery) -> Option<Retrieval> {
    let table = query.table.to_lowercase();
    let subject = first_recognized(&query.predicates);
    let key = subject.map(|p| p.key.as_str());
    let value = || subject.map(|p| p.value.clone()).unwrap_or_default();
    let is_actor = matches!(key, Some("actor" | "author"));

    let retrieval = match table.as_str() {
        "timeline" => Some(Retrieval::Timeline),
        "suggestions" => Some(Retrieval::Suggestions),
        "posts" if is_actor => Some(Retrieval::AuthorFeed { actor: value() }),
        "posts" if key == Some("feed") => Some(Retrieval::Feed { feed: value() }),
        "feeds" if is_actor => Some(Retrieval::ActorFeeds { actor: value() }),
        "feeds" if key.is_none() => Some(Retrieval::SuggestedFeeds),
        "profile" if is_actor => Some(Retrieval::Profile {
            actor: Some(value()),
        }),
        "profile" if key.is_none() => Some(Retrieval::Profile { actor: None }),
        "likes" if is_actor => Some(Retrieval::ActorLikes { actor: value() }),
        "followers" if is_actor => Some(Retrieval::Followers { actor: value() }),
        "following" if is_actor => Some(Retrieval::Follows { actor: value() }),
        "mutuals" if is_actor => Some(Retrieval::MutualFollowers { actor: value() }),
        _ => None,
    };

    match &retrieval {
        Some(r) => tracing::debug!("planned {} for table '{}'", r.operation(), query.table),
        None => tracing::debug!(
            "no retrieval for table '{}' with key {:?}",
            query.table,
            key
        ),
    }
    retrieval
}

/// Pull the record collection out of a raw response.
///
/// A missing or non-array collection yields no records.
pub fn records(retrieval: &Retrieval, response: Value) -> Vec<Value> {
    let Some(key) = retrieval.collection_key() else {
        return match response {
            Value::Object(ref map) if map.is_empty() => Vec::new(),
            Value::Null => Vec::new(),
            other => vec![other],
        };
    };

    match response {
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            Some(_) => {
                tracing::warn!("{} returned a non-array '{key}'", retrieval.operation());
                Vec::new()
            }
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Connector;
    use serde_json::json;

    fn q(table: &str, predicates: Vec<PredicateItem>) -> SemanticQuery {
        SemanticQuery {
            table: table.to_string(),
            predicates,
            fields: Vec::new(),
        }
    }

    fn pred(key: &str, value: &str) -> PredicateItem {
        PredicateItem::Predicate(Predicate::new(key, "=", value))
    }

    #[test]
    fn test_plan_author_feed() {
        let r = plan(&q("posts", vec![pred("author", "alice.bsky.social")]));
        assert_eq!(
            r,
            Some(Retrieval::AuthorFeed {
                actor: "alice.bsky.social".to_string()
            })
        );
    }

    #[test]
    fn test_plan_table_name_is_case_insensitive() {
        assert_eq!(plan(&q("TimeLine", vec![])), Some(Retrieval::Timeline));
    }

    #[test]
    fn test_first_recognized_key_wins() {
        let r = plan(&q(
            "followers",
            vec![
                pred("lang", "en"),
                PredicateItem::Connector(Connector::And),
                pred("actor", "bob"),
                PredicateItem::Connector(Connector::Or),
                pred("actor", "carol"),
            ],
        ));
        assert_eq!(
            r,
            Some(Retrieval::Followers {
                actor: "bob".to_string()
            })
        );
    }

    #[test]
    fn test_plan_profile_without_actor() {
        assert_eq!(
            plan(&q("profile", vec![])),
            Some(Retrieval::Profile { actor: None })
        );
        assert_eq!(
            plan(&q("profile", vec![pred("lang", "en")])),
            Some(Retrieval::Profile { actor: None })
        );
    }

    #[test]
    fn test_plan_feeds_variants() {
        assert_eq!(plan(&q("feeds", vec![])), Some(Retrieval::SuggestedFeeds));
        assert_eq!(
            plan(&q("feeds", vec![pred("actor", "bob")])),
            Some(Retrieval::ActorFeeds {
                actor: "bob".to_string()
            })
        );
        assert_eq!(
            plan(&q("posts", vec![pred("feed", "at://did:plc:x/app.bsky.feed.generator/y")])),
            Some(Retrieval::Feed {
                feed: "at://did:plc:x/app.bsky.feed.generator/y".to_string()
            })
        );
    }

    #[test]
    fn test_unsupported_combinations_plan_nothing() {
        assert_eq!(plan(&q("", vec![])), None);
        assert_eq!(plan(&q("posts", vec![])), None);
        assert_eq!(plan(&q("followers", vec![pred("feed", "x")])), None);
        assert_eq!(plan(&q("unknown", vec![pred("actor", "bob")])), None);
    }

    #[test]
    fn test_records_extracts_collection() {
        let r = Retrieval::Followers {
            actor: "bob".to_string(),
        };
        let response = json!({
            "subject": { "handle": "bob" },
            "followers": [{ "handle": "a" }, { "handle": "b" }],
            "cursor": "abc"
        });
        let rows = records(&r, response);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["handle"], "b");
    }

    #[test]
    fn test_records_missing_collection_is_empty() {
        let r = Retrieval::Timeline;
        assert!(records(&r, json!({ "error": "AuthMissing" })).is_empty());
        assert!(records(&r, json!({ "feed": "oops" })).is_empty());
        assert!(records(&r, Value::Null).is_empty());
    }

    #[test]
    fn test_records_profile_is_single_row() {
        let r = Retrieval::Profile { actor: None };
        let rows = records(&r, json!({ "handle": "me.bsky.social" }));
        assert_eq!(rows.len(), 1);
        assert!(records(&r, json!({})).is_empty());
    }

    #[test]
    fn test_requires_auth() {
        assert!(Retrieval::Timeline.requires_auth());
        assert!(!Retrieval::Profile { actor: None }.requires_auth());
        assert!(!Retrieval::AuthorFeed {
            actor: "x".to_string()
        }
        .requires_auth());
    }
}
