#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Outbound `OAuth2` bearer-token decoration.
//!
//! A [`ClientRegistrationIdResolver`] picks, per outgoing request, which
//! [`ClientRegistration`] applies; the [`AuthorizedClientManager`] turns that
//! into an access token; [`OAuth2ClientLayer`] attaches it as
//! `Authorization: Bearer <token>` and reacts to `401` / `403` rejections.

pub mod authentication;
pub mod builder_ext;
pub mod duration_serde;
pub mod failure;
pub mod layer;
pub mod manager;
pub mod registration;
pub mod repository;
pub mod resolver;
pub mod secret;
pub mod token;
pub mod transport;

pub use authentication::{Authentication, OAuth2Principal};
pub use builder_ext::RequestBuilderExt;
pub use failure::{
    AuthorizationFailure, AuthorizationFailureHandler, RemoveAuthorizedClientFailureHandler,
};
pub use layer::{InterceptError, OAuth2ClientLayer, OAuth2ClientService};
pub use manager::{
    AuthorizeError, AuthorizeRequest, AuthorizedClientManager, AuthorizedToken,
    DefaultAuthorizedClientManager,
};
pub use registration::{
    AuthorizationGrantType, ClientAuthMethod, ClientRegistration, ClientRegistrationId,
    ClientRegistrationRepository,
};
pub use repository::{
    AuthorizedClient, AuthorizedClientRepository, InMemoryAuthorizedClientRepository,
};
pub use resolver::{
    AuthenticationRequiredClientRegistrationIdResolver, ClientRegistrationIdResolver,
    CompositeClientRegistrationIdResolver, FixedClientRegistrationIdResolver,
    RequestAttributeClientRegistrationIdResolver, ResolveContext, ResolveError, ResolverConfig,
    ResolverStrategy, SharedResolver,
};
pub use secret::SecretString;
pub use token::{Token, TokenError};
pub use transport::{HttpTransport, HttpTransportConfig, HttpsClient, TransportError};
