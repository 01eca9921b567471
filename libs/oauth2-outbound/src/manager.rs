//! Turns a resolved registration id into a bearer token.
//!
//! `client_credentials` registrations share one [`Token`] per registration,
//! created on first use. `authorization_code` registrations are served from an
//! [`AuthorizedClientRepository`] filled by whatever performed the login.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::OnceCell;

use crate::authentication::Authentication;
use crate::registration::{
    AuthorizationGrantType, ClientRegistration, ClientRegistrationId, ClientRegistrationRepository,
};
use crate::repository::AuthorizedClientRepository;
use crate::secret::SecretString;
use crate::token::{Token, TokenError};
use crate::transport::HttpTransport;

/// Input of [`AuthorizedClientManager::authorize`].
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub registration_id: ClientRegistrationId,
    pub authentication: Option<Authentication>,
}

impl AuthorizeRequest {
    #[must_use]
    pub fn new(registration_id: impl Into<ClientRegistrationId>) -> Self {
        Self {
            registration_id: registration_id.into(),
            authentication: None,
        }
    }

    #[must_use]
    pub fn with_authentication(mut self, authentication: Option<Authentication>) -> Self {
        self.authentication = authentication;
        self
    }

    /// Name of the principal the token belongs to; `None` for anonymous or
    /// missing authentication.
    #[must_use]
    pub fn principal_name(&self) -> Option<&str> {
        self.authentication
            .as_ref()
            .and_then(Authentication::principal_name)
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizedToken {
    pub registration_id: ClientRegistrationId,
    pub access_token: SecretString,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthorizeError {
    #[error("unknown client registration '{0}'")]
    UnknownRegistration(ClientRegistrationId),

    /// No usable user token: the caller has to (re-)authorize the client.
    #[error("authorization required for client registration '{registration_id}'")]
    AuthorizationRequired {
        registration_id: ClientRegistrationId,
    },

    #[error("token for client registration '{registration_id}' unavailable: {source}")]
    Token {
        registration_id: ClientRegistrationId,
        #[source]
        source: TokenError,
    },
}

impl AuthorizeError {
    /// `OAuth2` error code returned by the token endpoint, if any.
    #[must_use]
    pub fn oauth2_error_code(&self) -> Option<&str> {
        match self {
            Self::Token { source, .. } => source.oauth2_error_code(),
            Self::UnknownRegistration(_) | Self::AuthorizationRequired { .. } => None,
        }
    }
}

/// Provides and discards authorized clients.
#[async_trait]
pub trait AuthorizedClientManager: Send + Sync {
    /// # Errors
    ///
    /// Returns [`AuthorizeError`] when no token can be produced for the
    /// request.
    async fn authorize(&self, request: &AuthorizeRequest)
    -> Result<AuthorizedToken, AuthorizeError>;

    /// Discard the authorized client so the next `authorize` obtains a fresh
    /// token.
    async fn remove(&self, registration_id: &ClientRegistrationId, principal_name: Option<&str>);
}

pub struct DefaultAuthorizedClientManager {
    registrations: Arc<ClientRegistrationRepository>,
    authorized_clients: Arc<dyn AuthorizedClientRepository>,
    transport: HttpTransport,
    tokens: DashMap<ClientRegistrationId, Arc<OnceCell<Token>>>,
}

impl std::fmt::Debug for DefaultAuthorizedClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultAuthorizedClientManager")
            .field("registrations", &self.registrations)
            .field("tokens", &self.tokens.len())
            .finish_non_exhaustive()
    }
}

impl DefaultAuthorizedClientManager {
    #[must_use]
    pub fn new(
        registrations: Arc<ClientRegistrationRepository>,
        authorized_clients: Arc<dyn AuthorizedClientRepository>,
        transport: HttpTransport,
    ) -> Self {
        Self {
            registrations,
            authorized_clients,
            transport,
            tokens: DashMap::new(),
        }
    }

    async fn client_credentials(
        &self,
        registration_id: &ClientRegistrationId,
        registration: &ClientRegistration,
    ) -> Result<SecretString, AuthorizeError> {
        let cell = self
            .tokens
            .entry(registration_id.clone())
            .or_default()
            .clone();

        let token = cell
            .get_or_try_init(|| async {
                tracing::info!(registration_id = %registration_id, "Starting token watcher");
                Token::new(registration, self.transport.clone()).await
            })
            .await
            .map_err(|source| AuthorizeError::Token {
                registration_id: registration_id.clone(),
                source,
            })?;

        token.get().map_err(|source| AuthorizeError::Token {
            registration_id: registration_id.clone(),
            source,
        })
    }

    async fn authorization_code(
        &self,
        registration_id: &ClientRegistrationId,
        principal_name: Option<&str>,
    ) -> Result<SecretString, AuthorizeError> {
        let required = || AuthorizeError::AuthorizationRequired {
            registration_id: registration_id.clone(),
        };

        let principal_name = principal_name.ok_or_else(required)?;
        let client = self
            .authorized_clients
            .load(registration_id, principal_name)
            .await
            .ok_or_else(required)?;

        if client.is_expired_at(OffsetDateTime::now_utc()) {
            tracing::debug!(
                registration_id = %registration_id,
                principal = principal_name,
                "Authorized client expired"
            );
            self.authorized_clients
                .remove(registration_id, principal_name)
                .await;
            return Err(required());
        }

        Ok(client.access_token().clone())
    }
}

#[async_trait]
impl AuthorizedClientManager for DefaultAuthorizedClientManager {
    async fn authorize(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<AuthorizedToken, AuthorizeError> {
        let registration_id = &request.registration_id;
        let registration = self
            .registrations
            .find(registration_id.as_str())
            .ok_or_else(|| AuthorizeError::UnknownRegistration(registration_id.clone()))?;

        let access_token = match registration.authorization_grant_type {
            AuthorizationGrantType::ClientCredentials => {
                self.client_credentials(registration_id, registration).await?
            }
            AuthorizationGrantType::AuthorizationCode => {
                self.authorization_code(registration_id, request.principal_name())
                    .await?
            }
        };

        Ok(AuthorizedToken {
            registration_id: registration_id.clone(),
            access_token,
        })
    }

    async fn remove(&self, registration_id: &ClientRegistrationId, principal_name: Option<&str>) {
        let Some(registration) = self.registrations.find(registration_id.as_str()) else {
            return;
        };

        match registration.authorization_grant_type {
            AuthorizationGrantType::ClientCredentials => {
                let cell = self.tokens.get(registration_id).map(|e| Arc::clone(e.value()));
                let Some(token) = cell.as_deref().and_then(OnceCell::get) else {
                    return;
                };
                if let Err(e) = token.invalidate().await {
                    tracing::warn!(
                        registration_id = %registration_id,
                        error = %e,
                        "Token re-fetch failed; dropping watcher"
                    );
                    self.tokens.remove(registration_id);
                } else {
                    tracing::info!(registration_id = %registration_id, "Token invalidated");
                }
            }
            AuthorizationGrantType::AuthorizationCode => {
                if let Some(principal) = principal_name
                    && self
                        .authorized_clients
                        .remove(registration_id, principal)
                        .await
                {
                    tracing::info!(
                        registration_id = %registration_id,
                        principal,
                        "Authorized client removed"
                    );
                }
            }
        }
    }
}
