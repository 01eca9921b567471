use super::{ClientRegistrationIdResolver, ResolveContext, ResolveError};
use crate::authentication::Authentication;
use crate::registration::ClientRegistrationId;

/// Uses the registration the caller logged in with, and refuses everyone
/// else.
///
/// - OAuth2 / OIDC login: that login's registration id.
/// - Anonymous: [`ResolveError::AccessDenied`]; typically turned into a login
///   prompt upstream.
/// - Any other authentication, or none at all:
///   [`ResolveError::ConfigurationError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthenticationRequiredClientRegistrationIdResolver;

impl ClientRegistrationIdResolver for AuthenticationRequiredClientRegistrationIdResolver {
    fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<ClientRegistrationId>, ResolveError> {
        match ctx.authentication() {
            Some(Authentication::OAuth2(principal)) => {
                Ok(Some(principal.authorized_client_registration_id().clone()))
            }
            Some(Authentication::Anonymous) => Err(ResolveError::AccessDenied(
                "Authentication is required".to_owned(),
            )),
            Some(Authentication::Other { .. }) | None => Err(ResolveError::ConfigurationError(
                "OAuth 2.0 or OpenID Connect 1.0 Login is required".to_owned(),
            )),
        }
    }
}
