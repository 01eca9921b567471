//! Client of the downstream messages API.

use std::time::Duration;

use bytes::Bytes;
use http::header::ACCEPT;
use http::{HeaderValue, Request};
use http_body_util::Full;
use oauth2_outbound::transport::collect_limited;
use oauth2_outbound::{
    Authentication, ClientRegistrationId, HttpTransport, HttpsClient, OAuth2ClientLayer,
    OAuth2ClientService, RequestBuilderExt,
};
use serde::{Deserialize, Serialize};
use tower::{Layer, ServiceExt};
use url::Url;

use crate::error::ApiError;

pub const MESSAGES_PATH: &str = "/api/v1/messages";

/// `{base_url}/api/v1/messages`, keeping any path prefix of `base_url`.
///
/// # Errors
///
/// Returns the parse error if `base_url` is not an absolute URL that can
/// carry a path.
pub fn messages_url(base_url: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(base_url)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(MESSAGES_PATH.trim_start_matches('/'))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

/// `GET {base_url}/api/v1/messages` through one decorated client.
#[derive(Debug, Clone)]
pub struct MessagesClient {
    service: OAuth2ClientService<HttpsClient>,
    messages_url: Url,
    request_timeout: Duration,
    max_response_bytes: usize,
}

impl MessagesClient {
    /// # Errors
    ///
    /// Returns the parse error if `base_url` is unusable, see [`messages_url`].
    pub fn new(
        transport: &HttpTransport,
        layer: &OAuth2ClientLayer,
        base_url: &str,
        max_response_bytes: usize,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            service: layer.layer(transport.client().clone()),
            messages_url: messages_url(base_url)?,
            request_timeout: transport.config().request_timeout,
            max_response_bytes,
        })
    }

    /// Fetch the messages on behalf of `authentication`, optionally forcing
    /// `registration_id`.
    ///
    /// # Errors
    ///
    /// Resolver and authorization failures map through
    /// [`ApiError::from`]; non-2xx answers, oversized or malformed bodies
    /// and timeouts become [`ApiError::Downstream`].
    pub async fn get_messages(
        &self,
        authentication: &Authentication,
        registration_id: Option<ClientRegistrationId>,
    ) -> Result<Vec<Message>, ApiError> {
        let mut builder = Request::get(self.messages_url.as_str())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .authentication(authentication.clone());
        if let Some(id) = registration_id {
            builder = builder.client_registration_id(id);
        }
        let request = builder
            .body(Full::<Bytes>::default())
            .map_err(|e| ApiError::Downstream(format!("failed to build request: {e}")))?;

        let call = self.service.clone().oneshot(request);
        let response = tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| {
                ApiError::Downstream(format!(
                    "messages API timed out after {}ms",
                    self.request_timeout.as_millis()
                ))
            })??;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Messages API returned an error");
            return Err(ApiError::Downstream(format!(
                "messages API responded with HTTP {}",
                status.as_u16()
            )));
        }

        let body = collect_limited(response.into_body(), self.max_response_bytes)
            .await
            .map_err(|e| ApiError::Downstream(format!("failed to read messages: {e}")))?;

        serde_json::from_slice(&body)
            .map_err(|e| ApiError::Downstream(format!("invalid messages payload: {e}")))
    }
}
