use super::{
    ClientRegistrationIdResolver, RequestAttributeClientRegistrationIdResolver, ResolveContext,
    ResolveError,
};
use crate::authentication::Authentication;
use crate::registration::ClientRegistrationId;

/// Tries, in order:
/// 1. the per-request override attribute;
/// 2. the configured default, if any;
/// 3. the registration of the caller's OAuth2 / OIDC login.
///
/// The first present result wins. If none applies the request is sent without
/// a token; this strategy never fails.
#[derive(Debug, Clone, Default)]
pub struct CompositeClientRegistrationIdResolver {
    delegate: RequestAttributeClientRegistrationIdResolver,
    default_registration_id: Option<ClientRegistrationId>,
}

impl CompositeClientRegistrationIdResolver {
    /// `None` skips step 2 and falls back to the login registration.
    #[must_use]
    pub fn new(default_registration_id: Option<ClientRegistrationId>) -> Self {
        Self {
            delegate: RequestAttributeClientRegistrationIdResolver::new(),
            default_registration_id,
        }
    }
}

impl ClientRegistrationIdResolver for CompositeClientRegistrationIdResolver {
    fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<ClientRegistrationId>, ResolveError> {
        if let Some(id) = self.delegate.resolve(ctx)? {
            return Ok(Some(id));
        }
        if let Some(id) = &self.default_registration_id {
            return Ok(Some(id.clone()));
        }
        Ok(ctx
            .authentication()
            .and_then(Authentication::oauth2_principal)
            .map(|principal| principal.authorized_client_registration_id().clone()))
    }
}
