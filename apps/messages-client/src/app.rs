use std::sync::Arc;

use axum::Router;
use oauth2_outbound::{
    AuthorizedClientManager, DefaultAuthorizedClientManager, HttpTransport,
    InMemoryAuthorizedClientRepository, TransportError,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::authn::{self, SessionStore};
use crate::config::{AppConfig, ConfigError};
use crate::controllers::{self, ControllerError, Controllers};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP transport: {0}")]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Controllers(#[from] ControllerError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Validated configuration wired into a ready-to-serve router.
pub struct App {
    pub router: Router,
    pub authorized_clients: Arc<InMemoryAuthorizedClientRepository>,
}

impl App {
    /// # Errors
    ///
    /// Returns [`StartupError`] if validation fails or a component cannot be
    /// constructed.
    pub async fn build(config: &AppConfig) -> Result<Self, StartupError> {
        let registrations = Arc::new(config.validate()?);
        let transport = HttpTransport::new(config.transport.clone())?;

        let authorized_clients = Arc::new(InMemoryAuthorizedClientRepository::new());
        let seeded =
            authn::seed_authorized_clients(&config.sessions, authorized_clients.as_ref()).await;

        let manager: Arc<dyn AuthorizedClientManager> = Arc::new(
            DefaultAuthorizedClientManager::new(
                registrations,
                authorized_clients.clone(),
                transport.clone(),
            ),
        );

        let controllers = Arc::new(Controllers::new(&config.messages, &transport, &manager)?);
        let sessions = SessionStore::from_config(&config.sessions);
        tracing::info!(
            registrations = config.registrations.len(),
            sessions = sessions.len(),
            seeded,
            base_url = %config.messages.base_url,
            "Messages client configured"
        );

        let router = controllers::routes(controllers)
            .layer(axum::middleware::from_fn_with_state(
                sessions,
                authn::authenticate,
            ))
            .layer(TraceLayer::new_for_http());

        Ok(Self {
            router,
            authorized_clients,
        })
    }
}

/// Bind `server.bind_addr:server.port` and serve until ctrl-c.
///
/// # Errors
///
/// Returns [`StartupError`] on build, bind or serve failure.
pub async fn serve(config: &AppConfig) -> Result<(), StartupError> {
    let app = App::build(config).await?;
    let addr = config.server.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app.router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(StartupError::Serve)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
