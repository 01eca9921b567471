use http::request::Builder;

use crate::authentication::Authentication;
use crate::registration::ClientRegistrationId;

/// Per-request attributes read by the [`OAuth2ClientLayer`](crate::OAuth2ClientLayer).
///
/// ```
/// use oauth2_outbound::RequestBuilderExt;
///
/// let req = http::Request::get("https://messages.example.com/api/v1/messages")
///     .client_registration_id("messaging-client")
///     .body(())
///     .unwrap();
/// assert!(req.extensions().get::<oauth2_outbound::ClientRegistrationId>().is_some());
/// ```
pub trait RequestBuilderExt {
    /// Use this registration regardless of the configured default.
    #[must_use]
    fn client_registration_id(self, id: impl Into<ClientRegistrationId>) -> Self;

    /// Principal on whose behalf the request is sent.
    #[must_use]
    fn authentication(self, authentication: Authentication) -> Self;
}

impl RequestBuilderExt for Builder {
    fn client_registration_id(self, id: impl Into<ClientRegistrationId>) -> Self {
        self.extension(id.into())
    }

    fn authentication(self, authentication: Authentication) -> Self {
        self.extension(authentication)
    }
}
