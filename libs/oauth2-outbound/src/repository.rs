//! Storage for user-bound authorized clients (`authorization_code` tokens).

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;

use crate::registration::ClientRegistrationId;
use crate::secret::SecretString;

/// An access token obtained for one principal through one registration.
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    registration_id: ClientRegistrationId,
    principal_name: String,
    access_token: SecretString,
    expires_at: Option<OffsetDateTime>,
}

impl AuthorizedClient {
    #[must_use]
    pub fn new(
        registration_id: impl Into<ClientRegistrationId>,
        principal_name: impl Into<String>,
        access_token: SecretString,
    ) -> Self {
        Self {
            registration_id: registration_id.into(),
            principal_name: principal_name.into(),
            access_token,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn with_expires_at(mut self, expires_at: OffsetDateTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    #[must_use]
    pub fn registration_id(&self) -> &ClientRegistrationId {
        &self.registration_id
    }

    #[must_use]
    pub fn principal_name(&self) -> &str {
        &self.principal_name
    }

    #[must_use]
    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_at
    }

    /// Tokens without an expiry never expire.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Where authorized clients live between requests.
#[async_trait]
pub trait AuthorizedClientRepository: Send + Sync {
    async fn load(
        &self,
        registration_id: &ClientRegistrationId,
        principal_name: &str,
    ) -> Option<AuthorizedClient>;

    async fn save(&self, client: AuthorizedClient);

    /// Returns `true` if a client was removed.
    async fn remove(&self, registration_id: &ClientRegistrationId, principal_name: &str) -> bool;
}

type Key = (ClientRegistrationId, String);

/// Process-local repository backed by a `DashMap`.
#[derive(Debug, Default)]
pub struct InMemoryAuthorizedClientRepository {
    clients: DashMap<Key, AuthorizedClient>,
}

impl InMemoryAuthorizedClientRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[async_trait]
impl AuthorizedClientRepository for InMemoryAuthorizedClientRepository {
    async fn load(
        &self,
        registration_id: &ClientRegistrationId,
        principal_name: &str,
    ) -> Option<AuthorizedClient> {
        let key = (registration_id.clone(), principal_name.to_owned());
        self.clients.get(&key).map(|entry| entry.value().clone())
    }

    async fn save(&self, client: AuthorizedClient) {
        tracing::debug!(
            registration_id = %client.registration_id,
            principal = %client.principal_name,
            "Saving authorized client"
        );
        let key = (client.registration_id.clone(), client.principal_name.clone());
        self.clients.insert(key, client);
    }

    async fn remove(&self, registration_id: &ClientRegistrationId, principal_name: &str) -> bool {
        let key = (registration_id.clone(), principal_name.to_owned());
        self.clients.remove(&key).is_some()
    }
}
