//! Client-credentials token lifecycle.
//!
//! [`Token`] owns an `aliri_tokens` [`TokenWatcher`] that fetches the first
//! token eagerly and refreshes it in the background before expiry.

mod discovery;
mod error;
mod source;
mod types;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use aliri_clock::DurationSecs;
use aliri_tokens::backoff::ErrorBackoffConfig;
use aliri_tokens::jitter::RandomEarlyJitter;
use aliri_tokens::{TokenStatus, TokenWatcher};
use arc_swap::ArcSwap;

pub use discovery::discover_token_endpoint;
pub use error::TokenError;
pub use source::ClientCredentialsSource;
pub use types::{OAuth2ErrorResponse, TokenResponse};

use crate::registration::ClientRegistration;
use crate::secret::SecretString;
use crate::transport::HttpTransport;

struct TokenInner {
    watcher: TokenWatcher,
}

struct WatcherConfig {
    jitter_max: Duration,
    min_refresh_period: Duration,
}

type SourceFactory = dyn Fn() -> Result<ClientCredentialsSource, TokenError> + Send + Sync;

/// Shared handle to the access token of one `client_credentials` registration.
///
/// Reads are lock-free (`ArcSwap`); [`invalidate`](Self::invalidate) swaps
/// in a new watcher without blocking readers. Cheap to clone.
#[derive(Clone)]
pub struct Token {
    inner: Arc<ArcSwap<TokenInner>>,
    source_factory: Arc<SourceFactory>,
    watcher_config: Arc<WatcherConfig>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token").finish_non_exhaustive()
    }
}

impl Token {
    /// Validate the registration, run OIDC discovery if needed, and fetch the
    /// first token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::ConfigError`] for an invalid registration, and the
    /// discovery or token-endpoint error if the initial fetch fails.
    pub async fn new(
        registration: &ClientRegistration,
        transport: HttpTransport,
    ) -> Result<Self, TokenError> {
        registration.validate()?;

        let mut registration = registration.clone();
        if let Some(issuer_url) = registration.issuer_url.take() {
            let resolved = discover_token_endpoint(&transport, &issuer_url).await?;
            registration.token_endpoint = Some(resolved);
        }

        let watcher_config = Arc::new(WatcherConfig {
            jitter_max: registration.jitter_max,
            min_refresh_period: registration.min_refresh_period,
        });

        let source = ClientCredentialsSource::new(&registration, transport.clone())?;
        let watcher = spawn_watcher(source, &watcher_config).await?;

        let source_factory: Arc<SourceFactory> =
            Arc::new(move || ClientCredentialsSource::new(&registration, transport.clone()));

        Ok(Self {
            inner: Arc::new(ArcSwap::from_pointee(TokenInner { watcher })),
            source_factory,
            watcher_config,
        })
    }

    /// Current access token. Never waits on the network.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Unavailable`] if the cached token has expired and
    /// the background refresh has not caught up yet.
    pub fn get(&self) -> Result<SecretString, TokenError> {
        let guard = self.inner.load();
        let borrowed = guard.watcher.token();
        if matches!(borrowed.token_status(), TokenStatus::Expired) {
            return Err(TokenError::Unavailable(
                "token expired, refresh pending".into(),
            ));
        }
        Ok(SecretString::new(borrowed.access_token().as_str()))
    }

    /// Replace the watcher with a freshly spawned one, discarding the cached
    /// token (e.g. after the resource server rejected it).
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the previous watcher stays in place.
    pub async fn invalidate(&self) -> Result<(), TokenError> {
        let source = (self.source_factory)()?;
        let watcher = spawn_watcher(source, &self.watcher_config).await?;
        self.inner.store(Arc::new(TokenInner { watcher }));
        Ok(())
    }
}

async fn spawn_watcher(
    source: ClientCredentialsSource,
    config: &WatcherConfig,
) -> Result<TokenWatcher, TokenError> {
    let jitter = RandomEarlyJitter::new(DurationSecs(config.jitter_max.as_secs()));
    let backoff =
        ErrorBackoffConfig::new(config.min_refresh_period, config.min_refresh_period * 30, 2);

    TokenWatcher::spawn_from_token_source(source, jitter, backoff).await
}
