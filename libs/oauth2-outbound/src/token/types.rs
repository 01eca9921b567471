use serde::Deserialize;

/// Successful token endpoint response (RFC 6749 §5.1).
///
/// `Deserialize` only, so access tokens cannot be serialized into logs by
/// accident. Unknown fields are ignored.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds; optional per RFC 6749.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Must be `Bearer` (any case) when present.
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Error response of the token endpoint (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
pub struct OAuth2ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}
