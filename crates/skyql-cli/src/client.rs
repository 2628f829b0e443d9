//! XRPC client wrapping reqwest.
//!
//! Calls are plain JSON over HTTP: `GET /xrpc/<nsid>?params` for queries
//! and `POST /xrpc/<nsid>` for procedures. Retries on 5xx and backs off on
//! 429. Non-success responses are decoded as XRPC error bodies.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::types::{CliError, CliResult};

const DEFAULT_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Body of a non-success XRPC response.
#[derive(Debug, Deserialize)]
struct XrpcErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for XRPC calls.
#[derive(Clone)]
pub struct XrpcClient {
    client: reqwest::Client,
    max_retries: u32,
}

impl Default for XrpcClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS)
    }
}

impl XrpcClient {
    pub fn new(timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .user_agent(concat!("skyql/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            client,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Override how many times a failed call is retried.
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Run an XRPC query. Parameters with empty values are left out.
    pub async fn query(
        &self,
        host: &str,
        nsid: &str,
        params: &[(&str, String)],
        bearer: Option<&str>,
    ) -> CliResult<Value> {
        let url = xrpc_url(host, nsid);
        let params: Vec<(&str, &str)> = params
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (*k, v.as_str()))
            .collect();

        tracing::debug!("GET {url} {params:?}");
        self.send(|| {
            let mut req = self.client.get(&url).query(&params);
            if let Some(token) = bearer {
                req = req.bearer_auth(token);
            }
            req
        })
        .await
    }

    /// Run an XRPC procedure with an optional JSON body.
    pub async fn procedure(
        &self,
        host: &str,
        nsid: &str,
        body: Option<&Value>,
        bearer: Option<&str>,
    ) -> CliResult<Value> {
        let url = xrpc_url(host, nsid);

        tracing::debug!("POST {url}");
        self.send(|| {
            let mut req = self.client.post(&url);
            if let Some(body) = body {
                req = req.json(body);
            }
            if let Some(token) = bearer {
                req = req.bearer_auth(token);
            }
            req
        })
        .await
    }

    async fn send<F>(&self, build: F) -> CliResult<Value>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut retries = 0u32;

        loop {
            let resp = match build().send().await {
                Ok(r) => r,
                Err(e) => {
                    if retries < self.max_retries && (e.is_connect() || e.is_timeout()) {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tracing::warn!("request failed ({e}), retrying in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(e.into());
                }
            };

            let status = resp.status().as_u16();

            if status >= 500 && retries < self.max_retries {
                retries += 1;
                let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                tracing::warn!("server returned {status}, retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                continue;
            }

            if status == 429 && retries < self.max_retries {
                retries += 1;
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(2);
                let delay = Duration::from_secs(retry_after.min(10));
                tracing::warn!("rate limited, backing off for {delay:?}");
                tokio::time::sleep(delay).await;
                continue;
            }

            let body = resp.text().await?;

            if !(200..300).contains(&status) {
                return Err(api_error(status, &body));
            }
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&body)?);
        }
    }
}

fn xrpc_url(host: &str, nsid: &str) -> String {
    format!("{}/xrpc/{nsid}", host.trim_end_matches('/'))
}

fn api_error(status: u16, body: &str) -> CliError {
    let parsed: Option<XrpcErrorBody> = serde_json::from_str(body).ok();
    let (error, message) = match parsed {
        Some(XrpcErrorBody { error, message }) => (error, message),
        None => (None, None),
    };
    CliError::Api {
        status,
        error: error.unwrap_or_else(|| format!("HTTP {status}")),
        message: message.unwrap_or_else(|| truncate(body, 200)),
    }
}

fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &text[..i]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xrpc_url() {
        assert_eq!(
            xrpc_url("https://public.api.bsky.app/", "app.bsky.actor.getProfile"),
            "https://public.api.bsky.app/xrpc/app.bsky.actor.getProfile"
        );
    }

    #[test]
    fn test_api_error_from_xrpc_body() {
        let err = api_error(400, r#"{"error":"InvalidRequest","message":"Profile not found"}"#);
        match err {
            CliError::Api {
                status,
                error,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(error, "InvalidRequest");
                assert_eq!(message, "Profile not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_api_error_from_plain_body() {
        let err = api_error(502, "Bad Gateway");
        assert_eq!(err.to_string(), "HTTP 502 (502): Bad Gateway");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
