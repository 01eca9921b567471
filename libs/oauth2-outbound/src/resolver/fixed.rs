use super::{ClientRegistrationIdResolver, ResolveContext, ResolveError};
use crate::registration::ClientRegistrationId;

/// Always resolves to the same registration.
#[derive(Debug, Clone)]
pub struct FixedClientRegistrationIdResolver {
    registration_id: ClientRegistrationId,
}

impl FixedClientRegistrationIdResolver {
    #[must_use]
    pub fn new(registration_id: impl Into<ClientRegistrationId>) -> Self {
        Self {
            registration_id: registration_id.into(),
        }
    }
}

impl ClientRegistrationIdResolver for FixedClientRegistrationIdResolver {
    fn resolve(
        &self,
        _ctx: &ResolveContext<'_>,
    ) -> Result<Option<ClientRegistrationId>, ResolveError> {
        Ok(Some(self.registration_id.clone()))
    }
}
