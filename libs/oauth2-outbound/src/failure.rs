//! Reacting to rejected tokens.
//!
//! A failure is reported either by the token endpoint (an `OAuth2` error
//! response while obtaining a token) or by the resource server (`401` / `403`
//! with a `WWW-Authenticate: Bearer error="..."` challenge).

use std::sync::Arc;

use async_trait::async_trait;
use http::header::WWW_AUTHENTICATE;
use http::{HeaderMap, StatusCode};

use crate::manager::AuthorizedClientManager;
use crate::registration::ClientRegistrationId;

pub const INVALID_TOKEN: &str = "invalid_token";
pub const INSUFFICIENT_SCOPE: &str = "insufficient_scope";
pub const INVALID_GRANT: &str = "invalid_grant";
pub const INVALID_CLIENT: &str = "invalid_client";
pub const UNAUTHORIZED_CLIENT: &str = "unauthorized_client";

/// Codes after which the authorized client is useless and gets discarded.
pub const REMOVE_AUTHORIZED_CLIENT_ERROR_CODES: [&str; 4] =
    [INVALID_TOKEN, INVALID_GRANT, INVALID_CLIENT, UNAUTHORIZED_CLIENT];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationFailure {
    pub registration_id: ClientRegistrationId,
    pub principal_name: Option<String>,
    pub error_code: String,
    /// Resource-server status; `None` when the token endpoint failed.
    pub status: Option<StatusCode>,
}

#[async_trait]
pub trait AuthorizationFailureHandler: Send + Sync {
    async fn on_authorization_failure(&self, failure: &AuthorizationFailure);
}

/// Discards the authorized client for the codes in
/// [`REMOVE_AUTHORIZED_CLIENT_ERROR_CODES`]; logs everything else.
#[derive(Clone)]
pub struct RemoveAuthorizedClientFailureHandler {
    manager: Arc<dyn AuthorizedClientManager>,
}

impl RemoveAuthorizedClientFailureHandler {
    #[must_use]
    pub fn new(manager: Arc<dyn AuthorizedClientManager>) -> Self {
        Self { manager }
    }
}

impl std::fmt::Debug for RemoveAuthorizedClientFailureHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoveAuthorizedClientFailureHandler")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthorizationFailureHandler for RemoveAuthorizedClientFailureHandler {
    async fn on_authorization_failure(&self, failure: &AuthorizationFailure) {
        let code = failure.error_code.as_str();
        if !REMOVE_AUTHORIZED_CLIENT_ERROR_CODES.contains(&code) {
            tracing::debug!(
                registration_id = %failure.registration_id,
                error_code = code,
                "Authorization failure does not invalidate the authorized client"
            );
            return;
        }

        tracing::warn!(
            registration_id = %failure.registration_id,
            error_code = code,
            status = failure.status.as_ref().map(StatusCode::as_u16),
            "Removing authorized client after authorization failure"
        );
        self.manager
            .remove(&failure.registration_id, failure.principal_name.as_deref())
            .await;
    }
}

/// `OAuth2` error code carried by a resource-server response.
///
/// Only `401` and `403` are authorization failures. The code comes from the
/// `Bearer` challenge's `error` parameter, falling back to `invalid_token`
/// (401) or `insufficient_scope` (403).
#[must_use]
pub fn resolve_oauth2_error(status: StatusCode, headers: &HeaderMap) -> Option<String> {
    let fallback = match status {
        StatusCode::UNAUTHORIZED => INVALID_TOKEN,
        StatusCode::FORBIDDEN => INSUFFICIENT_SCOPE,
        _ => return None,
    };

    let from_challenge = headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(bearer_error);

    Some(from_challenge.unwrap_or_else(|| fallback.to_owned()))
}

/// `error` parameter of a `Bearer` challenge (RFC 6750 §3).
fn bearer_error(challenge: &str) -> Option<String> {
    let challenge = challenge.trim();
    let (scheme, params) = challenge.split_once(' ').unwrap_or((challenge, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    auth_params(params)
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("error"))
        .map(|(_, value)| value.to_owned())
        .filter(|value| !value.is_empty())
}

/// Comma-separated `name=value` / `name="quoted value"` pairs.
fn auth_params(mut rest: &str) -> Vec<(&str, &str)> {
    let mut params = Vec::new();
    loop {
        rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        let Some((name, after)) = rest.split_once('=') else {
            break;
        };
        let after = after.trim_start();
        let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
            quoted.split_once('"').unwrap_or((quoted, ""))
        } else {
            after.split_once(',').unwrap_or((after, ""))
        };
        params.push((name.trim(), value.trim()));
        rest = remaining;
    }
    params
}
