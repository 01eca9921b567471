use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{
    AuthenticationRequiredClientRegistrationIdResolver, CompositeClientRegistrationIdResolver,
    FixedClientRegistrationIdResolver, RequestAttributeClientRegistrationIdResolver,
    ResolveError, SharedResolver,
};
use crate::registration::ClientRegistrationId;

/// Which built-in resolver to construct.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverStrategy {
    #[default]
    RequestAttribute,
    Fixed,
    Composite,
    AuthenticationRequired,
}

/// Serializable description of a resolver.
///
/// ```yaml
/// strategy: composite
/// default_registration_id: messaging-client
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    pub strategy: ResolverStrategy,
    /// Fixed id, or the default for `request_attribute` / `composite`.
    pub default_registration_id: Option<ClientRegistrationId>,
}

impl ResolverConfig {
    #[must_use]
    pub fn new(strategy: ResolverStrategy) -> Self {
        Self {
            strategy,
            default_registration_id: None,
        }
    }

    #[must_use]
    pub fn with_default_registration_id(mut self, id: impl Into<ClientRegistrationId>) -> Self {
        self.default_registration_id = Some(id.into());
        self
    }

    /// Build the configured resolver.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::ConfigurationError`] when the `fixed` strategy
    /// has no `default_registration_id`.
    pub fn build(&self) -> Result<SharedResolver, ResolveError> {
        let default = self.default_registration_id.clone();
        let resolver: SharedResolver = match self.strategy {
            ResolverStrategy::Fixed => {
                let id = default.ok_or_else(|| {
                    ResolveError::ConfigurationError(
                        "fixed resolver requires default_registration_id".to_owned(),
                    )
                })?;
                Arc::new(FixedClientRegistrationIdResolver::new(id))
            }
            ResolverStrategy::RequestAttribute => Arc::new(match default {
                Some(id) => RequestAttributeClientRegistrationIdResolver::with_default(id),
                None => RequestAttributeClientRegistrationIdResolver::new(),
            }),
            ResolverStrategy::Composite => {
                Arc::new(CompositeClientRegistrationIdResolver::new(default))
            }
            ResolverStrategy::AuthenticationRequired => {
                if let Some(id) = &default {
                    tracing::warn!(
                        registration_id = %id,
                        "default_registration_id is ignored by the authentication_required resolver"
                    );
                }
                Arc::new(AuthenticationRequiredClientRegistrationIdResolver)
            }
        };
        tracing::debug!(strategy = ?self.strategy, "Built client registration id resolver");
        Ok(resolver)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::authentication::{Authentication, OAuth2Principal};
    use crate::resolver::ResolveContext;
    use http::Extensions;

    fn resolve_with(
        config: &ResolverConfig,
        auth: Option<&Authentication>,
    ) -> Result<Option<ClientRegistrationId>, ResolveError> {
        let ext = Extensions::new();
        config.build()?.resolve(&ResolveContext::new(&ext, auth))
    }

    #[test]
    fn default_strategy_is_request_attribute_without_default() {
        let config = ResolverConfig::default();
        assert_eq!(config.strategy, ResolverStrategy::RequestAttribute);
        let auth = Authentication::OAuth2(OAuth2Principal::new("alice", "login-client"));
        assert_eq!(resolve_with(&config, Some(&auth)).unwrap(), None);
    }

    #[test]
    fn fixed_requires_an_id() {
        let err = ResolverConfig::new(ResolverStrategy::Fixed)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ResolveError::ConfigurationError(_)));

        let config = ResolverConfig::new(ResolverStrategy::Fixed)
            .with_default_registration_id("messaging-client");
        assert_eq!(
            resolve_with(&config, None).unwrap(),
            Some(ClientRegistrationId::from("messaging-client"))
        );
    }

    #[test]
    fn composite_uses_default_then_login() {
        let auth = Authentication::OAuth2(OAuth2Principal::new("alice", "login-client"));

        let with_default = ResolverConfig::new(ResolverStrategy::Composite)
            .with_default_registration_id("messaging-client");
        assert_eq!(
            resolve_with(&with_default, Some(&auth)).unwrap(),
            Some(ClientRegistrationId::from("messaging-client"))
        );

        let without_default = ResolverConfig::new(ResolverStrategy::Composite);
        assert_eq!(
            resolve_with(&without_default, Some(&auth)).unwrap(),
            Some(ClientRegistrationId::from("login-client"))
        );
    }

    #[test]
    fn authentication_required_ignores_default() {
        let config = ResolverConfig::new(ResolverStrategy::AuthenticationRequired)
            .with_default_registration_id("messaging-client");
        let err = resolve_with(&config, Some(&Authentication::Anonymous)).unwrap_err();
        assert!(matches!(err, ResolveError::AccessDenied(_)));
    }

    #[test]
    fn deserializes_from_json() {
        let config: ResolverConfig = serde_json::from_str(
            r#"{"strategy":"authentication_required"}"#,
        )
        .unwrap();
        assert_eq!(config.strategy, ResolverStrategy::AuthenticationRequired);
        assert!(config.default_registration_id.is_none());

        assert!(serde_json::from_str::<ResolverConfig>(r#"{"strategy":"random"}"#).is_err());
    }
}
