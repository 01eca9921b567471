//! Inbound authentication against the static session table.
//!
//! `Authorization: Bearer <session>` selects a configured session; no header
//! means [`Authentication::Anonymous`]; anything else is rejected with `401`.
//! Routes behind [`require_login`] additionally turn anonymous callers away.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use oauth2_outbound::{
    Authentication, AuthorizedClient, AuthorizedClientRepository, OAuth2Principal,
};

use crate::config::SessionConfig;
use crate::error::ApiError;

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<HashMap<String, Authentication>>,
}

impl SessionStore {
    #[must_use]
    pub fn from_config(sessions: &BTreeMap<String, SessionConfig>) -> Self {
        let sessions = sessions
            .iter()
            .map(|(session, cfg)| (session.clone(), authentication_of(cfg)))
            .collect();
        Self {
            sessions: Arc::new(sessions),
        }
    }

    /// # Errors
    ///
    /// Returns [`ApiError::InvalidSession`] for a malformed header or an
    /// unknown session.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Authentication, ApiError> {
        let Some(value) = headers.get(AUTHORIZATION) else {
            return Ok(Authentication::Anonymous);
        };
        let session = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(ApiError::InvalidSession)?;

        self.sessions
            .get(session)
            .cloned()
            .ok_or(ApiError::InvalidSession)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn authentication_of(cfg: &SessionConfig) -> Authentication {
    match cfg {
        SessionConfig::Oauth2 {
            principal,
            registration_id,
            authorities,
            ..
        } => Authentication::OAuth2(
            OAuth2Principal::new(principal.clone(), registration_id.clone())
                .with_authorities(authorities.clone()),
        ),
        SessionConfig::Form { principal } => Authentication::Other {
            principal: principal.clone(),
            scheme: "form".to_owned(),
        },
    }
}

/// Store the login access tokens of `oauth2` sessions, as a completed login
/// would have.
pub async fn seed_authorized_clients(
    sessions: &BTreeMap<String, SessionConfig>,
    repository: &dyn AuthorizedClientRepository,
) -> usize {
    let mut seeded = 0;
    for cfg in sessions.values() {
        let SessionConfig::Oauth2 {
            principal,
            registration_id,
            access_token: Some(access_token),
            expires_at,
            ..
        } = cfg
        else {
            continue;
        };

        let mut client =
            AuthorizedClient::new(registration_id.clone(), principal.clone(), access_token.clone());
        if let Some(expires_at) = expires_at {
            client = client.with_expires_at(*expires_at);
        }
        repository.save(client).await;
        seeded += 1;
    }
    seeded
}

/// `axum::middleware::from_fn_with_state` adapter: puts the caller's
/// [`Authentication`] into the request extensions.
pub async fn authenticate(
    State(store): State<SessionStore>,
    mut req: Request,
    next: Next,
) -> Response {
    match store.authenticate(req.headers()) {
        Ok(authentication) => {
            req.extensions_mut().insert(authentication);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

/// `axum::middleware::from_fn` adapter for login-only routes; runs after
/// [`authenticate`].
pub async fn require_login(req: Request, next: Next) -> Response {
    match req.extensions().get::<Authentication>() {
        Some(authentication) if !authentication.is_anonymous() => next.run(req).await,
        _ => ApiError::AccessDenied("Login is required".to_owned()).into_response(),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use oauth2_outbound::{InMemoryAuthorizedClientRepository, SecretString};

    fn sessions() -> BTreeMap<String, SessionConfig> {
        BTreeMap::from([
            (
                "alice-session".to_owned(),
                SessionConfig::Oauth2 {
                    principal: "alice".into(),
                    registration_id: "login-client".into(),
                    authorities: vec!["SCOPE_message.read".into()],
                    access_token: Some(SecretString::new("alice-token")),
                    expires_at: None,
                },
            ),
            (
                "carol-session".to_owned(),
                SessionConfig::Oauth2 {
                    principal: "carol".into(),
                    registration_id: "login-client".into(),
                    authorities: Vec::new(),
                    access_token: None,
                    expires_at: None,
                },
            ),
            (
                "bob-session".to_owned(),
                SessionConfig::Form {
                    principal: "bob".into(),
                },
            ),
        ])
    }

    fn bearer(session: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {session}")).unwrap(),
        );
        headers
    }

    #[test]
    fn resolves_sessions() {
        let store = SessionStore::from_config(&sessions());
        assert_eq!(store.len(), 3);

        assert!(store.authenticate(&HeaderMap::new()).unwrap().is_anonymous());

        let alice = store.authenticate(&bearer("alice-session")).unwrap();
        let principal = alice.oauth2_principal().unwrap();
        assert_eq!(principal.name(), "alice");
        assert_eq!(principal.authorized_client_registration_id().as_str(), "login-client");
        assert_eq!(principal.authorities(), ["SCOPE_message.read"]);

        let bob = store.authenticate(&bearer("bob-session")).unwrap();
        assert!(matches!(bob, Authentication::Other { .. }));
        assert_eq!(bob.principal_name(), Some("bob"));
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        let store = SessionStore::from_config(&sessions());
        assert!(matches!(
            store.authenticate(&bearer("mallory")),
            Err(ApiError::InvalidSession)
        ));

        let mut basic = HeaderMap::new();
        basic.insert(AUTHORIZATION, HeaderValue::from_static("Basic Ym9iOnB3"));
        assert!(matches!(store.authenticate(&basic), Err(ApiError::InvalidSession)));
    }

    #[tokio::test]
    async fn seeds_only_sessions_with_tokens() {
        let repo = InMemoryAuthorizedClientRepository::new();
        let seeded = seed_authorized_clients(&sessions(), &repo).await;
        assert_eq!(seeded, 1);

        let client = repo.load(&"login-client".into(), "alice").await.unwrap();
        assert_eq!(client.access_token().expose(), "alice-token");
        assert!(repo.load(&"login-client".into(), "carol").await.is_none());
    }
}
