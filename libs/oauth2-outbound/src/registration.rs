use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::secret::SecretString;
use crate::token::TokenError;

/// Name of an OAuth2 client configuration (issuer, credentials, scopes).
///
/// Opaque and immutable; looked up by name in a [`ClientRegistrationRepository`].
/// Also used as the per-request override attribute: insert one into an
/// outgoing request's extensions to pick the registration explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientRegistrationId(String);

impl ClientRegistrationId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientRegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientRegistrationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ClientRegistrationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ClientRegistrationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ClientRegistrationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// How the access token for a registration is obtained.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationGrantType {
    /// Service-to-service token shared by every caller (RFC 6749 §4.4).
    #[default]
    ClientCredentials,
    /// User token obtained during login and kept in an
    /// [`AuthorizedClientRepository`](crate::repository::AuthorizedClientRepository).
    AuthorizationCode,
}

/// `OAuth2` client authentication method used at the token endpoint.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientAuthMethod {
    /// HTTP Basic authentication (RFC 6749 §2.3.1).
    /// `Authorization: Basic base64(client_id:client_secret)`
    #[default]
    #[serde(rename = "client_secret_basic", alias = "basic")]
    Basic,
    /// `client_id` and `client_secret` as form fields.
    #[serde(rename = "client_secret_post", alias = "form")]
    Form,
}

/// Configuration of one OAuth2 client.
///
/// For `client_credentials` registrations exactly one of
/// [`token_endpoint`](Self::token_endpoint) or [`issuer_url`](Self::issuer_url)
/// must be set; call [`validate`](Self::validate) to enforce it.
///
/// `Debug` is manually implemented to redact secrets.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: SecretString,
    pub authorization_grant_type: AuthorizationGrantType,
    pub scopes: Vec<String>,

    /// Direct token endpoint URL (mutually exclusive with `issuer_url`).
    pub token_endpoint: Option<Url>,
    /// OIDC issuer; the token endpoint is discovered once from
    /// `{issuer_url}/.well-known/openid-configuration`.
    pub issuer_url: Option<Url>,

    pub client_auth_method: ClientAuthMethod,
    /// Extra headers attached to every token request (vendor quirks).
    pub extra_headers: BTreeMap<String, String>,

    /// How far before expiry the token should be refreshed (default: 30m).
    #[serde(with = "crate::duration_serde")]
    pub refresh_offset: Duration,
    /// Maximum random jitter added to the refresh point (default: 5m).
    #[serde(with = "crate::duration_serde")]
    pub jitter_max: Duration,
    /// Minimum period between consecutive refresh attempts (default: 10s).
    #[serde(with = "crate::duration_serde")]
    pub min_refresh_period: Duration,
    /// Fallback TTL when the token endpoint omits `expires_in` (default: 5m).
    #[serde(with = "crate::duration_serde")]
    pub default_ttl: Duration,
}

impl ClientRegistration {
    /// Validate that the registration is self-consistent.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::ConfigError`] if `client_id` is blank, or, for
    /// `client_credentials` registrations, if the secret is empty or not
    /// exactly one of `token_endpoint` / `issuer_url` is set.
    pub fn validate(&self) -> Result<(), TokenError> {
        self.check()
            .map_err(|reason| TokenError::ConfigError(reason.to_owned()))
    }

    fn check(&self) -> Result<(), &'static str> {
        if self.client_id.trim().is_empty() {
            return Err("client_id must not be empty");
        }
        let endpoints = (&self.token_endpoint, &self.issuer_url);
        if let (Some(_), Some(_)) = endpoints {
            return Err("token_endpoint and issuer_url are mutually exclusive");
        }
        if self.authorization_grant_type == AuthorizationGrantType::AuthorizationCode {
            return Ok(());
        }
        if self.client_secret.is_empty() {
            return Err("client_secret must not be empty");
        }
        if let (None, None) = endpoints {
            return Err("one of token_endpoint or issuer_url must be set");
        }
        Ok(())
    }
}

impl fmt::Debug for ClientRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted_headers: Vec<_> = self
            .extra_headers
            .keys()
            .map(|k| (k.as_str(), "[REDACTED]"))
            .collect();
        f.debug_struct("ClientRegistration")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("authorization_grant_type", &self.authorization_grant_type)
            .field("scopes", &self.scopes)
            .field("token_endpoint", &self.token_endpoint)
            .field("issuer_url", &self.issuer_url)
            .field("client_auth_method", &self.client_auth_method)
            .field("extra_headers", &redacted_headers)
            .field("refresh_offset", &self.refresh_offset)
            .field("jitter_max", &self.jitter_max)
            .field("min_refresh_period", &self.min_refresh_period)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl Default for ClientRegistration {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: SecretString::default(),
            authorization_grant_type: AuthorizationGrantType::default(),
            scopes: Vec::new(),
            token_endpoint: None,
            issuer_url: None,
            client_auth_method: ClientAuthMethod::default(),
            extra_headers: BTreeMap::new(),
            refresh_offset: Duration::from_secs(30 * 60),
            jitter_max: Duration::from_secs(5 * 60),
            min_refresh_period: Duration::from_secs(10),
            default_ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// Immutable registry of validated client registrations, keyed by id.
#[derive(Debug, Default, Clone)]
pub struct ClientRegistrationRepository {
    registrations: HashMap<ClientRegistrationId, ClientRegistration>,
}

impl ClientRegistrationRepository {
    /// Build a repository, validating every registration.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::ConfigError`] naming the first invalid registration.
    pub fn from_registrations<I>(registrations: I) -> Result<Self, TokenError>
    where
        I: IntoIterator<Item = (ClientRegistrationId, ClientRegistration)>,
    {
        let mut map = HashMap::new();
        for (id, registration) in registrations {
            registration.check().map_err(|reason| {
                TokenError::ConfigError(format!("client registration '{id}': {reason}"))
            })?;
            map.insert(id, registration);
        }
        Ok(Self { registrations: map })
    }

    #[must_use]
    pub fn find(&self, id: &str) -> Option<&ClientRegistration> {
        self.registrations.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.registrations.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ClientRegistrationId> {
        self.registrations.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
