use super::{ClientRegistrationIdResolver, ResolveContext, ResolveError};
use crate::registration::ClientRegistrationId;

/// Resolves the id the caller attached to the outgoing request.
///
/// Set the override with
/// [`RequestBuilderExt::client_registration_id`](crate::builder_ext::RequestBuilderExt::client_registration_id)
/// (or by inserting a [`ClientRegistrationId`] into the request extensions).
/// Without an override the optional default is used; without a default the
/// request gets no token.
#[derive(Debug, Clone, Default)]
pub struct RequestAttributeClientRegistrationIdResolver {
    default_registration_id: Option<ClientRegistrationId>,
}

impl RequestAttributeClientRegistrationIdResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_default(registration_id: impl Into<ClientRegistrationId>) -> Self {
        Self {
            default_registration_id: Some(registration_id.into()),
        }
    }
}

impl ClientRegistrationIdResolver for RequestAttributeClientRegistrationIdResolver {
    fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<ClientRegistrationId>, ResolveError> {
        Ok(ctx
            .registration_id_attribute()
            .or(self.default_registration_id.as_ref())
            .cloned())
    }
}
