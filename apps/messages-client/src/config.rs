//! Layered application configuration.
//!
//! Precedence, lowest first: built-in defaults, YAML file (`--config`),
//! environment (`MESSAGES__SECTION__KEY`), CLI overrides.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use oauth2_outbound::{
    ClientRegistration, ClientRegistrationId, ClientRegistrationRepository, HttpTransportConfig,
    ResolverConfig, ResolverStrategy, SecretString,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::messages::messages_url;

pub const ENV_PREFIX: &str = "MESSAGES__";
pub const DEFAULT_MESSAGES_BASE_URL: &str = "http://127.0.0.1:8090";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file does not exist: {}", .0.display())]
    MissingFile(PathBuf),

    #[error(transparent)]
    Figment(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to render configuration: {0}")]
    Render(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub messages: MessagesConfig,
    pub transport: HttpTransportConfig,
    pub registrations: BTreeMap<ClientRegistrationId, ClientRegistration>,
    /// Incoming `Authorization: Bearer <session>` values and who they belong to.
    pub sessions: BTreeMap<String, SessionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Text,
        }
    }
}

/// Downstream API and the resolvers of the individual controllers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MessagesConfig {
    /// Downstream root; the messages path is appended to its own path.
    pub base_url: String,
    /// Resolver of `/authenticated/messages` and `/public/messages`.
    pub resolver: ResolverConfig,
    /// Default of the `/composite/*` controller.
    pub composite_default_registration_id: Option<ClientRegistrationId>,
    /// Per-request controller: registration for anonymous callers.
    pub anonymous_registration_id: ClientRegistrationId,
    /// Per-request controller: registration for logged-in callers.
    pub authenticated_registration_id: ClientRegistrationId,
    /// Downstream response body cap.
    pub max_response_bytes: usize,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_MESSAGES_BASE_URL.to_owned(),
            resolver: ResolverConfig::new(ResolverStrategy::RequestAttribute),
            composite_default_registration_id: Some("messaging-client".into()),
            anonymous_registration_id: "messaging-client".into(),
            authenticated_registration_id: "login-client".into(),
            max_response_bytes: 1024 * 1024,
        }
    }
}

/// A logged-in user of the demo app.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionConfig {
    /// OAuth 2.0 / OIDC login through `registration_id`.
    Oauth2 {
        principal: String,
        registration_id: ClientRegistrationId,
        #[serde(default)]
        authorities: Vec<String>,
        /// Login access token, seeded into the authorized-client repository.
        #[serde(default)]
        access_token: Option<SecretString>,
        #[serde(default, with = "time::serde::rfc3339::option")]
        expires_at: Option<OffsetDateTime>,
    },
    /// Form / basic login; no registration attached.
    Form { principal: String },
}

impl AppConfig {
    /// Load defaults, then `path` (if any), then `MESSAGES__*` env.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFile`] for a non-existent `path` and
    /// [`ConfigError::Figment`] for parse or type errors.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigError::MissingFile(path.to_path_buf()));
            }
            figment = figment.merge(Yaml::file(path));
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::Figment(Box::new(e)))
    }

    /// CLI flags win over every other layer.
    pub fn apply_cli_overrides(&mut self, port: Option<u16>, verbose: u8) {
        if let Some(port) = port {
            self.server.port = port;
        }
        let level = match verbose {
            0 => return,
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        level.clone_into(&mut self.logging.level);
    }

    /// Check registrations, resolver settings and every registration id the
    /// controllers and sessions refer to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<ClientRegistrationRepository, ConfigError> {
        let registrations = ClientRegistrationRepository::from_registrations(
            self.registrations
                .iter()
                .map(|(id, reg)| (id.clone(), reg.clone())),
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        messages_url(&self.messages.base_url)
            .map_err(|e| ConfigError::Invalid(format!("messages.base_url: {e}")))?;

        self.messages
            .resolver
            .build()
            .map_err(|e| ConfigError::Invalid(format!("messages.resolver: {e}")))?;

        let mut references: Vec<(String, &ClientRegistrationId)> = vec![
            (
                "messages.anonymous_registration_id".to_owned(),
                &self.messages.anonymous_registration_id,
            ),
            (
                "messages.authenticated_registration_id".to_owned(),
                &self.messages.authenticated_registration_id,
            ),
        ];
        if let Some(id) = &self.messages.resolver.default_registration_id {
            references.push(("messages.resolver.default_registration_id".to_owned(), id));
        }
        if let Some(id) = &self.messages.composite_default_registration_id {
            references.push(("messages.composite_default_registration_id".to_owned(), id));
        }
        for (session, cfg) in &self.sessions {
            if let SessionConfig::Oauth2 {
                registration_id, ..
            } = cfg
            {
                references.push((format!("sessions.{session}.registration_id"), registration_id));
            }
        }

        if let Some((field, id)) = references
            .into_iter()
            .find(|(_, id)| !registrations.contains(id.as_str()))
        {
            return Err(ConfigError::Invalid(format!(
                "{field}: unknown client registration '{id}'"
            )));
        }

        Ok(registrations)
    }

    /// Effective configuration as YAML; secrets are redacted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Render`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_saphyr::to_string(self).map_err(|e| ConfigError::Render(e.to_string()))
    }
}
