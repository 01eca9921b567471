//! Client-registration-id resolution.
//!
//! A resolver decides, per outgoing request, which client registration (and
//! therefore which access token) to use. It is a pure, synchronous function of
//! the request attributes and the caller's [`Authentication`]:
//!
//! | strategy | precedence |
//! |---|---|
//! | [`FixedClientRegistrationIdResolver`] | constant id |
//! | [`RequestAttributeClientRegistrationIdResolver`] | override attribute, then optional default |
//! | [`AuthenticationRequiredClientRegistrationIdResolver`] | OAuth2 login id, else error |
//! | [`CompositeClientRegistrationIdResolver`] | override attribute, default, OAuth2 login id |
//!
//! `Ok(None)` means "no registration": the request is sent without a token.

mod authentication_required;
mod composite;
mod config;
mod fixed;
mod request_attribute;

use std::sync::Arc;

use http::Extensions;
use thiserror::Error;

use crate::authentication::Authentication;
use crate::registration::ClientRegistrationId;

pub use authentication_required::AuthenticationRequiredClientRegistrationIdResolver;
pub use composite::CompositeClientRegistrationIdResolver;
pub use config::{ResolverConfig, ResolverStrategy};
pub use fixed::FixedClientRegistrationIdResolver;
pub use request_attribute::RequestAttributeClientRegistrationIdResolver;

/// Inputs of a single resolution: the outgoing request's attributes and the
/// caller's authentication, if any.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    attributes: &'a Extensions,
    authentication: Option<&'a Authentication>,
}

impl<'a> ResolveContext<'a> {
    #[must_use]
    pub fn new(attributes: &'a Extensions, authentication: Option<&'a Authentication>) -> Self {
        Self {
            attributes,
            authentication,
        }
    }

    /// Read both the override attribute and the authentication from request
    /// extensions.
    #[must_use]
    pub fn from_extensions(extensions: &'a Extensions) -> Self {
        Self::new(extensions, extensions.get::<Authentication>())
    }

    /// Explicit per-request override, if the caller set one.
    #[must_use]
    pub fn registration_id_attribute(&self) -> Option<&'a ClientRegistrationId> {
        self.attributes.get::<ClientRegistrationId>()
    }

    #[must_use]
    pub fn authentication(&self) -> Option<&'a Authentication> {
        self.authentication
    }
}

/// Why no registration could be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Anonymous caller on an operation that requires login. Recoverable by
    /// authenticating.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Authentication present but of an unsupported kind (or missing
    /// entirely). Indicates misconfiguration; retrying does not help.
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

impl ResolveError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AccessDenied(_))
    }
}

/// Strategy selecting the client registration for an outgoing request.
///
/// Implemented for every `Fn(&ResolveContext) -> Result<Option<ClientRegistrationId>, ResolveError>`
/// closure, so ad-hoc strategies need no new type.
pub trait ClientRegistrationIdResolver: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the strategy requires something the
    /// context does not provide.
    fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<ClientRegistrationId>, ResolveError>;
}

impl<F> ClientRegistrationIdResolver for F
where
    F: Fn(&ResolveContext<'_>) -> Result<Option<ClientRegistrationId>, ResolveError>
        + Send
        + Sync,
{
    fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<ClientRegistrationId>, ResolveError> {
        self(ctx)
    }
}

/// Shared, type-erased resolver.
pub type SharedResolver = Arc<dyn ClientRegistrationIdResolver>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::authentication::OAuth2Principal;

    #[test]
    fn context_reads_extensions() {
        let mut ext = Extensions::new();
        ext.insert(ClientRegistrationId::from("client-a"));
        ext.insert(Authentication::OAuth2(OAuth2Principal::new("alice", "client-c")));

        let ctx = ResolveContext::from_extensions(&ext);
        assert_eq!(ctx.registration_id_attribute().unwrap().as_str(), "client-a");
        assert!(matches!(ctx.authentication(), Some(Authentication::OAuth2(_))));
    }

    #[test]
    fn empty_extensions_have_nothing() {
        let ext = Extensions::new();
        let ctx = ResolveContext::from_extensions(&ext);
        assert!(ctx.registration_id_attribute().is_none());
        assert!(ctx.authentication().is_none());
    }

    #[test]
    fn closures_are_resolvers() {
        let resolver: SharedResolver = Arc::new(
            |ctx: &ResolveContext<'_>| -> Result<Option<ClientRegistrationId>, ResolveError> {
                Ok(match ctx.authentication() {
                    Some(auth) if !auth.is_anonymous() => Some("login-client".into()),
                    _ => Some("messaging-client".into()),
                })
            },
        );

        let ext = Extensions::new();
        let anonymous = Authentication::Anonymous;
        let ctx = ResolveContext::new(&ext, Some(&anonymous));
        assert_eq!(
            resolver.resolve(&ctx).unwrap(),
            Some(ClientRegistrationId::from("messaging-client"))
        );
    }

    #[test]
    fn only_access_denied_is_retryable() {
        assert!(ResolveError::AccessDenied("login".into()).is_retryable());
        assert!(!ResolveError::ConfigurationError("bad".into()).is_retryable());
    }
}
