//! Bluesky session lifecycle: anonymous or authenticated access, token
//! refresh, and one method per XRPC operation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use skyql::Retrieval;

use crate::client::XrpcClient;
use crate::config::{Credentials, SkyqlConfig};
use crate::types::{CliError, CliResult};

/// Refresh the access token when it expires within this window.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Tokens and identity returned by `createSession` / `refreshSession`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_jwt: String,
    pub refresh_jwt: String,
    pub did: String,
    #[serde(default)]
    pub handle: String,
}

/// Paging parameters for list operations.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub limit: u32,
    pub cursor: Option<String>,
}

impl Page {
    pub fn first(limit: u32) -> Self {
        Self {
            limit,
            cursor: None,
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("limit", self.limit.to_string()),
            ("cursor", self.cursor.clone().unwrap_or_default()),
        ]
    }
}

/// Filters for `searchPosts`. Empty fields are not sent.
#[derive(Debug, Clone, Default)]
pub struct PostSearch {
    pub q: String,
    /// `top` or `latest`.
    pub sort: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub mentions: Option<String>,
    pub author: Option<String>,
    pub tag: Option<String>,
}

/// Result of executing a planned retrieval.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Response(Value),
    /// The retrieval needs a signed-in account and none is available.
    Stealth,
}

/// A Bluesky API session. Anonymous until [`BskySession::login`]
/// succeeds.
pub struct BskySession {
    client: XrpcClient,
    service: String,
    auth_service: String,
    limit: u32,
    auth: Option<AuthTokens>,
}

impl BskySession {
    /// An anonymous session against the configured hosts.
    pub fn anonymous(config: &SkyqlConfig) -> Self {
        Self::with_client(config, XrpcClient::default())
    }

    pub fn with_client(config: &SkyqlConfig, client: XrpcClient) -> Self {
        Self {
            client,
            service: config.service.clone(),
            auth_service: config.auth_service.clone(),
            limit: config.limit,
            auth: None,
        }
    }

    /// Open a session, logging in when credentials are configured.
    pub async fn open(config: &SkyqlConfig) -> CliResult<Self> {
        let mut session = Self::anonymous(config);
        if let Some(creds) = &config.credentials {
            session.login(creds).await?;
        } else {
            tracing::info!("Anonymous session on {}", session.service);
        }
        Ok(session)
    }

    /// Host for the next call. Authenticated calls go to the login host.
    pub fn host(&self) -> &str {
        if self.auth.is_some() {
            &self.auth_service
        } else {
            &self.service
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }

    pub fn handle(&self) -> Option<&str> {
        self.auth.as_ref().map(|a| a.handle.as_str())
    }

    pub fn did(&self) -> Option<&str> {
        self.auth.as_ref().map(|a| a.did.as_str())
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn set_limit(&mut self, limit: u32) {
        self.limit = limit;
    }

    /// Create an authenticated session.
    pub async fn login(&mut self, creds: &Credentials) -> CliResult<()> {
        let body = json!({
            "identifier": creds.identifier,
            "password": creds.password,
        });
        let response = self
            .client
            .procedure(
                &self.auth_service,
                "com.atproto.server.createSession",
                Some(&body),
                None,
            )
            .await
            .map_err(|e| match e {
                CliError::Api { message, .. } => CliError::Auth(message),
                other => other,
            })?;

        let tokens: AuthTokens = serde_json::from_value(response)
            .map_err(|e| CliError::Auth(format!("unexpected createSession response: {e}")))?;

        tracing::info!("Logged in as {} ({})", tokens.handle, tokens.did);
        self.auth = Some(tokens);
        Ok(())
    }

    /// Swap the refresh token for a new token pair.
    pub async fn refresh(&mut self) -> CliResult<()> {
        let refresh_jwt = match &self.auth {
            Some(auth) => auth.refresh_jwt.clone(),
            None => return Err(CliError::Auth("not logged in".to_string())),
        };

        let response = self
            .client
            .procedure(
                &self.auth_service,
                "com.atproto.server.refreshSession",
                None,
                Some(&refresh_jwt),
            )
            .await?;

        let mut tokens: AuthTokens = serde_json::from_value(response)
            .map_err(|e| CliError::Auth(format!("unexpected refreshSession response: {e}")))?;
        if tokens.handle.is_empty() {
            tokens.handle = self.handle().unwrap_or_default().to_string();
        }

        tracing::info!("Refreshed session for {}", tokens.did);
        self.auth = Some(tokens);
        Ok(())
    }

    /// Drop the tokens and go back to anonymous access.
    pub fn logout(&mut self) {
        if let Some(auth) = self.auth.take() {
            tracing::info!("Logged out {}", auth.handle);
        }
    }

    /// Expiry of the current access token, if it can be read.
    pub fn access_expires_at(&self) -> Option<DateTime<Utc>> {
        self.auth.as_ref().and_then(|a| jwt_expiry(&a.access_jwt))
    }

    /// Refresh ahead of time when the access token is about to expire.
    async fn ensure_fresh(&mut self) -> CliResult<()> {
        let Some(expires_at) = self.access_expires_at() else {
            return Ok(());
        };
        if expires_at - Utc::now() < Duration::seconds(REFRESH_MARGIN_SECS) {
            tracing::debug!("access token expires at {expires_at}, refreshing");
            self.refresh().await?;
        }
        Ok(())
    }

    async fn get(&mut self, nsid: &str, params: &[(&str, String)]) -> CliResult<Value> {
        self.ensure_fresh().await?;
        let bearer = self.auth.as_ref().map(|a| a.access_jwt.clone());
        let result = self
            .client
            .query(self.host(), nsid, params, bearer.as_deref())
            .await;

        match result {
            Err(e) if e.is_expired_token() && self.auth.is_some() => {
                tracing::warn!("access token rejected as expired, refreshing once");
                self.refresh().await?;
                let bearer = self.auth.as_ref().map(|a| a.access_jwt.clone());
                self.client
                    .query(self.host(), nsid, params, bearer.as_deref())
                    .await
            }
            other => other,
        }
    }

    fn page(&self) -> Page {
        Page::first(self.limit)
    }

    pub async fn get_preferences(&mut self) -> CliResult<Value> {
        self.get("app.bsky.actor.getPreferences", &[]).await
    }

    pub async fn get_profile(&mut self, actor: &str) -> CliResult<Value> {
        self.get("app.bsky.actor.getProfile", &[("actor", actor.to_string())])
            .await
    }

    pub async fn get_suggestions(&mut self, page: &Page) -> CliResult<Value> {
        self.get("app.bsky.actor.getSuggestions", &page.params()).await
    }

    pub async fn search_actors(&mut self, q: &str, page: &Page) -> CliResult<Value> {
        let mut params = vec![("q", q.to_string())];
        params.extend(page.params());
        self.get("app.bsky.actor.searchActors", &params).await
    }

    pub async fn get_actor_likes(&mut self, actor: &str, page: &Page) -> CliResult<Value> {
        let mut params = vec![("actor", actor.to_string())];
        params.extend(page.params());
        self.get("app.bsky.feed.getActorLikes", &params).await
    }

    pub async fn get_author_feed(&mut self, actor: &str, page: &Page) -> CliResult<Value> {
        let mut params = vec![("actor", actor.to_string())];
        params.extend(page.params());
        self.get("app.bsky.feed.getAuthorFeed", &params).await
    }

    pub async fn get_feed(&mut self, feed: &str, page: &Page) -> CliResult<Value> {
        let mut params = vec![("feed", feed.to_string())];
        params.extend(page.params());
        self.get("app.bsky.feed.getFeed", &params).await
    }

    pub async fn get_actor_feeds(&mut self, actor: &str, page: &Page) -> CliResult<Value> {
        let mut params = vec![("actor", actor.to_string())];
        params.extend(page.params());
        self.get("app.bsky.feed.getActorFeeds", &params).await
    }

    pub async fn get_suggested_feeds(&mut self, page: &Page) -> CliResult<Value> {
        self.get("app.bsky.feed.getSuggestedFeeds", &page.params())
            .await
    }

    pub async fn get_timeline(&mut self, page: &Page) -> CliResult<Value> {
        self.get("app.bsky.feed.getTimeline", &page.params()).await
    }

    pub async fn search_posts(&mut self, search: &PostSearch, page: &Page) -> CliResult<Value> {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        let mut params = vec![
            ("q", search.q.clone()),
            ("sort", opt(&search.sort)),
            ("since", opt(&search.since)),
            ("until", opt(&search.until)),
            ("mentions", opt(&search.mentions)),
            ("author", opt(&search.author)),
            ("tag", opt(&search.tag)),
        ];
        params.extend(page.params());
        self.get("app.bsky.feed.searchPosts", &params).await
    }

    pub async fn get_followers(&mut self, actor: &str, page: &Page) -> CliResult<Value> {
        let mut params = vec![("actor", actor.to_string())];
        params.extend(page.params());
        self.get("app.bsky.graph.getFollowers", &params).await
    }

    pub async fn get_follows(&mut self, actor: &str, page: &Page) -> CliResult<Value> {
        let mut params = vec![("actor", actor.to_string())];
        params.extend(page.params());
        self.get("app.bsky.graph.getFollows", &params).await
    }

    /// Followers of `actor` that the signed-in account also follows.
    pub async fn get_mutual_followers(&mut self, actor: &str, page: &Page) -> CliResult<Value> {
        let mut params = vec![("actor", actor.to_string())];
        params.extend(page.params());
        self.get("app.bsky.graph.getKnownFollowers", &params).await
    }

    /// Perform one planned retrieval.
    ///
    /// Retrievals that need an account, and the own-profile lookup, return
    /// [`Fetched::Stealth`] on an anonymous session without touching the
    /// network.
    pub async fn execute(&mut self, retrieval: &Retrieval) -> CliResult<Fetched> {
        if retrieval.requires_auth() && !self.is_authenticated() {
            tracing::debug!("{} needs a signed-in session", retrieval.operation());
            return Ok(Fetched::Stealth);
        }

        let page = self.page();
        let response = match retrieval {
            Retrieval::Timeline => self.get_timeline(&page).await?,
            Retrieval::AuthorFeed { actor } => self.get_author_feed(actor, &page).await?,
            Retrieval::Feed { feed } => self.get_feed(feed, &page).await?,
            Retrieval::ActorFeeds { actor } => self.get_actor_feeds(actor, &page).await?,
            Retrieval::SuggestedFeeds => self.get_suggested_feeds(&page).await?,
            Retrieval::Profile { actor: Some(actor) } => self.get_profile(actor).await?,
            Retrieval::Profile { actor: None } => match self.handle().map(str::to_string) {
                Some(handle) => self.get_profile(&handle).await?,
                None => return Ok(Fetched::Stealth),
            },
            Retrieval::Suggestions => self.get_suggestions(&page).await?,
            Retrieval::ActorLikes { actor } => self.get_actor_likes(actor, &page).await?,
            Retrieval::Followers { actor } => self.get_followers(actor, &page).await?,
            Retrieval::Follows { actor } => self.get_follows(actor, &page).await?,
            Retrieval::MutualFollowers { actor } => {
                self.get_mutual_followers(actor, &page).await?
            }
        };
        Ok(Fetched::Response(response))
    }
}

/// Read the `exp` claim of a JWT without verifying it.
pub fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}
