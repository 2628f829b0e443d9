//! Configuration loading and resolution.
//!
//! Every setting resolves the same way: explicit flag, then environment
//! variable, then built-in default.

use std::path::PathBuf;

use skyql::ArrayPolicy;

/// Unauthenticated AppView host.
pub const DEFAULT_SERVICE: &str = "https://public.api.bsky.app";

/// Host used for `createSession` and every call made after login.
pub const DEFAULT_AUTH_SERVICE: &str = "https://bsky.social";

/// Page size for list operations.
pub const DEFAULT_LIMIT: u32 = 50;

/// Largest page size the API accepts.
pub const MAX_LIMIT: u32 = 100;

pub const ENV_SERVICE: &str = "SKYQL_SERVICE";
pub const ENV_AUTH_SERVICE: &str = "SKYQL_AUTH_SERVICE";
pub const ENV_IDENTIFIER: &str = "SKYQL_IDENTIFIER";
pub const ENV_PASSWORD: &str = "SKYQL_PASSWORD";
pub const ENV_LIMIT: &str = "SKYQL_LIMIT";

/// Values given on the command line, before resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigArgs {
    pub service: Option<String>,
    pub auth_service: Option<String>,
    pub identifier: Option<String>,
    pub password: Option<String>,
    pub limit: Option<u32>,
    pub array_policy: ArrayPolicy,
    pub strict: bool,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct SkyqlConfig {
    pub service: String,
    pub auth_service: String,
    /// Present only when both identifier and password were supplied.
    pub credentials: Option<Credentials>,
    pub limit: u32,
    pub array_policy: ArrayPolicy,
    pub strict: bool,
}

#[derive(Clone)]
pub struct Credentials {
    pub identifier: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl SkyqlConfig {
    pub fn resolve(args: ConfigArgs) -> Self {
        let identifier = resolve_setting(args.identifier.as_deref(), ENV_IDENTIFIER);
        let password = resolve_setting(args.password.as_deref(), ENV_PASSWORD);
        let credentials = match (identifier, password) {
            (Some(identifier), Some(password)) => Some(Credentials {
                identifier,
                password,
            }),
            (Some(identifier), None) => {
                tracing::warn!("identifier '{identifier}' given without a password, staying anonymous");
                None
            }
            _ => None,
        };

        Self {
            service: resolve_service(args.service.as_deref()),
            auth_service: resolve_auth_service(args.auth_service.as_deref()),
            credentials,
            limit: resolve_limit(args.limit),
            array_policy: args.array_policy,
            strict: args.strict,
        }
    }

    /// Settings pointing both hosts at one base URL, for tests and
    /// self-hosted services.
    pub fn for_service(url: &str) -> Self {
        Self {
            service: url.trim_end_matches('/').to_string(),
            auth_service: url.trim_end_matches('/').to_string(),
            credentials: None,
            limit: DEFAULT_LIMIT,
            array_policy: ArrayPolicy::default(),
            strict: false,
        }
    }
}

fn resolve_setting(explicit: Option<&str>, env: &str) -> Option<String> {
    if let Some(value) = explicit {
        return Some(value.to_string());
    }
    std::env::var(env).ok().filter(|v| !v.is_empty())
}

/// Resolve the public API host.
pub fn resolve_service(explicit: Option<&str>) -> String {
    resolve_setting(explicit, ENV_SERVICE)
        .unwrap_or_else(|| DEFAULT_SERVICE.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Resolve the login host.
pub fn resolve_auth_service(explicit: Option<&str>) -> String {
    resolve_setting(explicit, ENV_AUTH_SERVICE)
        .unwrap_or_else(|| DEFAULT_AUTH_SERVICE.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Resolve the page size, clamped to what the API accepts.
pub fn resolve_limit(explicit: Option<u32>) -> u32 {
    let limit = explicit
        .or_else(|| {
            let raw = std::env::var(ENV_LIMIT).ok()?;
            match raw.parse::<u32>() {
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!("ignoring {ENV_LIMIT}={raw:?}: not a number");
                    None
                }
            }
        })
        .unwrap_or(DEFAULT_LIMIT);
    limit.clamp(1, MAX_LIMIT)
}

/// Location of the REPL history file.
pub fn history_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".skyql_history")
}
