use thiserror::Error;

/// Errors returned while obtaining or serving an access token.
///
/// Secret values (`client_secret`, access tokens) never appear in the
/// formatted output.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TokenError {
    /// Transport failure or non-success status without an `OAuth2` error body.
    ///
    /// Produced by [`describe`](crate::transport::describe) or as
    /// `"{prefix} HTTP {status}"`; never contains response bodies.
    #[error("{0}")]
    Http(String),

    /// The token endpoint answered with an `OAuth2` error response
    /// (RFC 6749 §5.2).
    #[error("OAuth2 error response: {code}")]
    OAuth2 {
        code: String,
        description: Option<String>,
    },

    /// The token endpoint returned an unparseable or incomplete response.
    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    /// The token endpoint returned a `token_type` that is not `Bearer`.
    #[error("unsupported token type: {0}")]
    UnsupportedTokenType(String),

    #[error("OAuth2 config error: {0}")]
    ConfigError(String),

    /// The token watcher is not ready or has been shut down.
    #[error("token unavailable: {0}")]
    Unavailable(String),
}

impl TokenError {
    /// `OAuth2` error code, when the authorization server sent one.
    #[must_use]
    pub fn oauth2_error_code(&self) -> Option<&str> {
        match self {
            Self::OAuth2 { code, .. } => Some(code),
            _ => None,
        }
    }
}
