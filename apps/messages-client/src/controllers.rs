//! One downstream client per controller, each with its own resolver.

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::middleware;
use axum::routing::get;
use axum::{Json, Router};
use oauth2_outbound::{
    Authentication, AuthenticationRequiredClientRegistrationIdResolver, AuthorizedClientManager,
    ClientRegistrationId, CompositeClientRegistrationIdResolver, HttpTransport, OAuth2ClientLayer,
    RequestAttributeClientRegistrationIdResolver, ResolveError, SharedResolver,
};
use serde::{Deserialize, Serialize};

use crate::authn;
use crate::config::MessagesConfig;
use crate::error::ApiError;
use crate::messages::{Message, MessagesClient};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Resolver(#[from] ResolveError),
    #[error("invalid messages base url: {0}")]
    BaseUrl(#[from] url::ParseError),
}

#[derive(Debug, Clone)]
pub struct Controllers {
    default: MessagesClient,
    implicit: MessagesClient,
    per_request: MessagesClient,
    authentication_required: MessagesClient,
    composite: MessagesClient,
    anonymous_registration_id: ClientRegistrationId,
    authenticated_registration_id: ClientRegistrationId,
}

impl Controllers {
    /// # Errors
    ///
    /// Returns [`ControllerError`] if the configured resolver cannot be built
    /// or the base url is unusable.
    pub fn new(
        config: &MessagesConfig,
        transport: &HttpTransport,
        manager: &Arc<dyn AuthorizedClientManager>,
    ) -> Result<Self, ControllerError> {
        let client = |resolver: SharedResolver| {
            let layer = OAuth2ClientLayer::new(resolver, Arc::clone(manager));
            MessagesClient::new(transport, &layer, &config.base_url, config.max_response_bytes)
        };

        Ok(Self {
            default: client(config.resolver.build()?)?,
            implicit: client(Arc::new(CompositeClientRegistrationIdResolver::new(None)))?,
            per_request: client(Arc::new(RequestAttributeClientRegistrationIdResolver::new()))?,
            authentication_required: client(Arc::new(
                AuthenticationRequiredClientRegistrationIdResolver,
            ))?,
            composite: client(Arc::new(CompositeClientRegistrationIdResolver::new(
                config.composite_default_registration_id.clone(),
            )))?,
            anonymous_registration_id: config.anonymous_registration_id.clone(),
            authenticated_registration_id: config.authenticated_registration_id.clone(),
        })
    }

    /// Registration the per-request controller forces for `authentication`.
    #[must_use]
    pub fn per_request_registration_id(
        &self,
        authentication: &Authentication,
    ) -> &ClientRegistrationId {
        if authentication.is_anonymous() {
            &self.anonymous_registration_id
        } else {
            &self.authenticated_registration_id
        }
    }
}

/// `/authenticated/*` routes require a logged-in caller.
#[must_use]
pub fn routes(controllers: Arc<Controllers>) -> Router {
    Router::new()
        .route("/authenticated/messages", get(default_messages))
        .route("/authenticated/implicit/messages", get(implicit_messages))
        .route("/authenticated/per-request/messages", get(per_request_messages))
        .route_layer(middleware::from_fn(authn::require_login))
        .route("/public/messages", get(default_messages))
        .route("/public/per-request/messages", get(per_request_messages))
        .route(
            "/public/authentication-required/messages",
            get(authentication_required_messages),
        )
        .route("/composite/messages", get(composite_messages))
        .route("/public/composite/messages", get(composite_messages))
        .with_state(controllers)
}

type MessagesResult = Result<Json<MessagesResponse>, ApiError>;

fn respond(messages: Vec<Message>) -> Json<MessagesResponse> {
    Json(MessagesResponse { messages })
}

async fn default_messages(
    State(c): State<Arc<Controllers>>,
    Extension(auth): Extension<Authentication>,
) -> MessagesResult {
    c.default.get_messages(&auth, None).await.map(respond)
}

async fn implicit_messages(
    State(c): State<Arc<Controllers>>,
    Extension(auth): Extension<Authentication>,
) -> MessagesResult {
    c.implicit.get_messages(&auth, None).await.map(respond)
}

async fn per_request_messages(
    State(c): State<Arc<Controllers>>,
    Extension(auth): Extension<Authentication>,
) -> MessagesResult {
    let registration_id = c.per_request_registration_id(&auth).clone();
    tracing::debug!(registration_id = %registration_id, "Per-request registration selected");
    c.per_request
        .get_messages(&auth, Some(registration_id))
        .await
        .map(respond)
}

async fn authentication_required_messages(
    State(c): State<Arc<Controllers>>,
    Extension(auth): Extension<Authentication>,
) -> MessagesResult {
    c.authentication_required
        .get_messages(&auth, None)
        .await
        .map(respond)
}

async fn composite_messages(
    State(c): State<Arc<Controllers>>,
    Extension(auth): Extension<Authentication>,
) -> MessagesResult {
    c.composite.get_messages(&auth, None).await.map(respond)
}
