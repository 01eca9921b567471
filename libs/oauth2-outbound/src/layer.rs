use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::header::{AUTHORIZATION, HeaderName, InvalidHeaderValue};
use http::{HeaderValue, Request, Response};
use thiserror::Error;
use tower::{Layer, Service};
use zeroize::Zeroizing;

use crate::authentication::Authentication;
use crate::failure::{
    AuthorizationFailure, AuthorizationFailureHandler, RemoveAuthorizedClientFailureHandler,
    resolve_oauth2_error,
};
use crate::manager::{AuthorizeError, AuthorizeRequest, AuthorizedClientManager};
use crate::registration::ClientRegistrationId;
use crate::resolver::{ResolveContext, ResolveError, SharedResolver};
use crate::secret::SecretString;
use crate::transport::BoxError;

/// Why a decorated request was not sent, or failed in transit.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InterceptError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Authorize(#[from] AuthorizeError),

    #[error("access token is not a valid header value")]
    InvalidHeader(#[source] InvalidHeaderValue),

    #[error("downstream request failed: {0}")]
    Transport(#[source] BoxError),
}

struct Shared {
    resolver: SharedResolver,
    manager: Arc<dyn AuthorizedClientManager>,
    failure_handler: Arc<dyn AuthorizationFailureHandler>,
    header_name: HeaderName,
}

/// Tower layer that attaches the resolved registration's bearer token to
/// outbound requests.
///
/// Per request: resolve the registration id from the request extensions
/// (override [`ClientRegistrationId`] and [`Authentication`]), obtain the
/// token from the [`AuthorizedClientManager`], set
/// `Authorization: Bearer <token>` and forward. Requests for which nothing
/// resolves are forwarded untouched. `401` / `403` responses are reported to
/// the failure handler and returned as they are.
#[derive(Clone)]
pub struct OAuth2ClientLayer {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for OAuth2ClientLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2ClientLayer")
            .field("header_name", &self.shared.header_name)
            .finish_non_exhaustive()
    }
}

impl OAuth2ClientLayer {
    /// Uses [`RemoveAuthorizedClientFailureHandler`] over the same manager.
    #[must_use]
    pub fn new(resolver: SharedResolver, manager: Arc<dyn AuthorizedClientManager>) -> Self {
        let failure_handler = Arc::new(RemoveAuthorizedClientFailureHandler::new(Arc::clone(
            &manager,
        )));
        Self {
            shared: Arc::new(Shared {
                resolver,
                manager,
                failure_handler,
                header_name: AUTHORIZATION,
            }),
        }
    }

    #[must_use]
    pub fn with_failure_handler(self, failure_handler: Arc<dyn AuthorizationFailureHandler>) -> Self {
        self.rebuild(|shared| shared.failure_handler = failure_handler)
    }

    /// Send `<header_name>: Bearer <token>` instead of `Authorization`.
    #[must_use]
    pub fn with_header_name(self, header_name: HeaderName) -> Self {
        self.rebuild(|shared| shared.header_name = header_name)
    }

    fn rebuild(self, f: impl FnOnce(&mut Shared)) -> Self {
        let mut shared = Shared {
            resolver: Arc::clone(&self.shared.resolver),
            manager: Arc::clone(&self.shared.manager),
            failure_handler: Arc::clone(&self.shared.failure_handler),
            header_name: self.shared.header_name.clone(),
        };
        f(&mut shared);
        Self {
            shared: Arc::new(shared),
        }
    }
}

impl<S> Layer<S> for OAuth2ClientLayer {
    type Service = OAuth2ClientService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OAuth2ClientService {
            inner,
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Service produced by [`OAuth2ClientLayer`].
#[derive(Clone)]
pub struct OAuth2ClientService<S> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S> std::fmt::Debug for OAuth2ClientService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2ClientService")
            .field("header_name", &self.shared.header_name)
            .finish_non_exhaustive()
    }
}

impl<S, B, ResBody> Service<Request<B>> for OAuth2ClientService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
    B: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = InterceptError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResBody>, InterceptError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(|e| InterceptError::Transport(e.into()))
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let resolved = self
            .shared
            .resolver
            .resolve(&ResolveContext::from_extensions(req.extensions()));
        let authentication = req.extensions().get::<Authentication>().cloned();
        let shared = Arc::clone(&self.shared);

        // Clone-swap: the ready service is the one that gets called.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let Some(registration_id) = resolved? else {
                tracing::trace!(uri = %req.uri(), "No client registration resolved; sending without token");
                return inner
                    .call(req)
                    .await
                    .map_err(|e| InterceptError::Transport(e.into()));
            };

            let principal_name = authentication
                .as_ref()
                .and_then(Authentication::principal_name)
                .map(str::to_owned);
            let request = AuthorizeRequest {
                registration_id: registration_id.clone(),
                authentication,
            };

            let token = match shared.manager.authorize(&request).await {
                Ok(token) => token,
                Err(err) => {
                    if let Some(code) = err.oauth2_error_code() {
                        shared
                            .report(&registration_id, principal_name, code, None)
                            .await;
                    }
                    return Err(InterceptError::Authorize(err));
                }
            };

            let value = bearer_value(&token.access_token).map_err(InterceptError::InvalidHeader)?;
            req.headers_mut().insert(shared.header_name.clone(), value);

            let response = inner
                .call(req)
                .await
                .map_err(|e| InterceptError::Transport(e.into()))?;

            if let Some(code) = resolve_oauth2_error(response.status(), response.headers()) {
                shared
                    .report(
                        &registration_id,
                        principal_name,
                        &code,
                        Some(response.status()),
                    )
                    .await;
            }
            Ok(response)
        })
    }
}

impl Shared {
    async fn report(
        &self,
        registration_id: &ClientRegistrationId,
        principal_name: Option<String>,
        code: &str,
        status: Option<http::StatusCode>,
    ) {
        let failure = AuthorizationFailure {
            registration_id: registration_id.clone(),
            principal_name,
            error_code: code.to_owned(),
            status,
        };
        self.failure_handler.on_authorization_failure(&failure).await;
    }
}

fn bearer_value(token: &SecretString) -> Result<HeaderValue, InvalidHeaderValue> {
    let raw = Zeroizing::new(format!("Bearer {}", token.expose()));
    let mut value = HeaderValue::from_str(&raw)?;
    value.set_sensitive(true);
    Ok(value)
}
