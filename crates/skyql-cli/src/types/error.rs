//! Error types for the SkyQL front-end.

/// All errors that can occur while running a query against the API.
#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Query(#[from] skyql::QueryError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The API answered with an XRPC error body.
    #[error("{error} ({status}): {message}")]
    Api {
        status: u16,
        error: String,
        message: String,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Whether the error means the access token is no longer accepted.
    pub fn is_expired_token(&self) -> bool {
        matches!(self, CliError::Api { error, .. } if error == "ExpiredToken")
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = CliError::Api {
            status: 400,
            error: "InvalidRequest".to_string(),
            message: "Profile not found".to_string(),
        };
        assert_eq!(err.to_string(), "InvalidRequest (400): Profile not found");
        assert!(!err.is_expired_token());
    }

    #[test]
    fn test_expired_token_detection() {
        let err = CliError::Api {
            status: 400,
            error: "ExpiredToken".to_string(),
            message: "Token has expired".to_string(),
        };
        assert!(err.is_expired_token());
    }

    #[test]
    fn test_query_error_is_transparent() {
        let err: CliError = skyql::QueryError::Invariant("boom".to_string()).into();
        assert_eq!(err.to_string(), "Internal consistency error: boom");
    }
}
