//! Authentication context of the caller on whose behalf an outbound call is made.
//!
//! The context is passed explicitly: the inbound layer inserts an
//! [`Authentication`] into the outgoing request's extensions and the
//! resolvers read it from there.

use crate::registration::ClientRegistrationId;

/// Who the current caller is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    /// Unauthenticated caller.
    Anonymous,
    /// Caller logged in through OAuth 2.0 or OpenID Connect 1.0.
    OAuth2(OAuth2Principal),
    /// Any other non-anonymous authentication (form login, HTTP basic, ...).
    Other { principal: String, scheme: String },
}

impl Authentication {
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Principal name, or `None` for anonymous callers.
    #[must_use]
    pub fn principal_name(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::OAuth2(principal) => Some(principal.name()),
            Self::Other { principal, .. } => Some(principal),
        }
    }

    #[must_use]
    pub fn oauth2_principal(&self) -> Option<&OAuth2Principal> {
        match self {
            Self::OAuth2(principal) => Some(principal),
            Self::Anonymous | Self::Other { .. } => None,
        }
    }
}

/// Principal established by an OAuth2 / OIDC login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Principal {
    name: String,
    authorized_client_registration_id: ClientRegistrationId,
    authorities: Vec<String>,
}

impl OAuth2Principal {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        authorized_client_registration_id: impl Into<ClientRegistrationId>,
    ) -> Self {
        Self {
            name: name.into(),
            authorized_client_registration_id: authorized_client_registration_id.into(),
            authorities: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_authorities(mut self, authorities: Vec<String>) -> Self {
        self.authorities = authorities;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registration the user logged in with.
    #[must_use]
    pub fn authorized_client_registration_id(&self) -> &ClientRegistrationId {
        &self.authorized_client_registration_id
    }

    #[must_use]
    pub fn authorities(&self) -> &[String] {
        &self.authorities
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn principal_names() {
        assert_eq!(Authentication::Anonymous.principal_name(), None);
        let oauth = Authentication::OAuth2(OAuth2Principal::new("alice", "login-client"));
        assert_eq!(oauth.principal_name(), Some("alice"));
        let other = Authentication::Other {
            principal: "bob".into(),
            scheme: "form".into(),
        };
        assert_eq!(other.principal_name(), Some("bob"));
    }

    #[test]
    fn oauth2_principal_only_for_oauth2() {
        let oauth = Authentication::OAuth2(
            OAuth2Principal::new("alice", "login-client")
                .with_authorities(vec!["SCOPE_message.read".into()]),
        );
        let principal = oauth.oauth2_principal().unwrap();
        assert_eq!(principal.authorized_client_registration_id().as_str(), "login-client");
        assert_eq!(principal.authorities(), ["SCOPE_message.read"]);
        assert!(Authentication::Anonymous.oauth2_principal().is_none());
        assert!(Authentication::Anonymous.is_anonymous());
    }
}
