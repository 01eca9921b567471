use std::time::Duration;

use aliri_clock::DurationSecs;
use aliri_tokens::sources::AsyncTokenSource;
use aliri_tokens::{AccessToken, IdToken, TokenLifetimeConfig, TokenWithLifetime};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http_body_util::Full;
use url::Url;
use zeroize::Zeroizing;

use super::error::TokenError;
use super::types::{OAuth2ErrorResponse, TokenResponse};
use crate::registration::{ClientAuthMethod, ClientRegistration};
use crate::secret::SecretString;
use crate::transport::{HttpTransport, TransportError, describe};

const PREFIX: &str = "OAuth2 token";

/// Exchanges client credentials for an access token (RFC 6749 §4.4).
///
/// Implements [`AsyncTokenSource`] so that `aliri_tokens` drives refresh
/// scheduling, jitter, and backoff.
pub struct ClientCredentialsSource {
    transport: HttpTransport,
    token_endpoint: Url,
    client_id: String,
    client_secret: SecretString,
    /// Space-joined scopes, `None` when there are none.
    scopes: Option<String>,
    auth_method: ClientAuthMethod,
    extra_headers: Vec<(String, String)>,
    default_ttl: Duration,
    refresh_offset: Duration,
    min_refresh_period: Duration,
}

impl ClientCredentialsSource {
    /// # Errors
    ///
    /// Returns [`TokenError::ConfigError`] if `token_endpoint` is not set
    /// (discovery has to run first).
    pub fn new(
        registration: &ClientRegistration,
        transport: HttpTransport,
    ) -> Result<Self, TokenError> {
        let token_endpoint = registration
            .token_endpoint
            .clone()
            .ok_or_else(|| TokenError::ConfigError("token_endpoint is required".into()))?;

        let scopes = if registration.scopes.is_empty() {
            None
        } else {
            Some(registration.scopes.join(" "))
        };

        Ok(Self {
            transport,
            token_endpoint,
            client_id: registration.client_id.clone(),
            client_secret: registration.client_secret.clone(),
            scopes,
            auth_method: registration.client_auth_method,
            extra_headers: registration
                .extra_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            default_ttl: registration.default_ttl,
            refresh_offset: registration.refresh_offset,
            min_refresh_period: registration.min_refresh_period,
        })
    }

    fn build_request(&self) -> Result<http::Request<Full<Bytes>>, TokenError> {
        let mut fields: Vec<(&str, &str)> = vec![("grant_type", "client_credentials")];
        if let Some(ref scope) = self.scopes {
            fields.push(("scope", scope));
        }

        let secret_expose;
        if self.auth_method == ClientAuthMethod::Form {
            secret_expose = Zeroizing::new(self.client_secret.expose().to_owned());
            fields.push(("client_id", &self.client_id));
            fields.push(("client_secret", &secret_expose));
        }

        let form = Zeroizing::new(
            serde_urlencoded::to_string(&fields)
                .map_err(|e| TokenError::Http(format!("{PREFIX} form encode error: {e}")))?,
        );

        let mut builder = http::Request::post(self.token_endpoint.as_str())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json");

        if self.auth_method == ClientAuthMethod::Basic {
            let credentials = Zeroizing::new(format!(
                "{}:{}",
                self.client_id,
                self.client_secret.expose()
            ));
            let encoded = Zeroizing::new(general_purpose::STANDARD.encode(credentials.as_bytes()));
            let header_value = Zeroizing::new(format!("Basic {}", &*encoded));
            builder = builder.header(AUTHORIZATION, header_value.as_str());
        }

        for (name, value) in &self.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
            .body(Full::new(Bytes::copy_from_slice(form.as_bytes())))
            .map_err(|e| TokenError::Http(describe(&TransportError::from(e), PREFIX)))
    }
}

#[async_trait]
impl AsyncTokenSource for ClientCredentialsSource {
    type Error = TokenError;

    async fn request_token(&mut self) -> Result<TokenWithLifetime, Self::Error> {
        let request = self.build_request()?;
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| TokenError::Http(describe(&e, PREFIX)))?;

        if !response.status.is_success() {
            let err = match response.json::<OAuth2ErrorResponse>() {
                Ok(body) => TokenError::OAuth2 {
                    code: body.error,
                    description: body.error_description,
                },
                Err(_) => TokenError::Http(format!("{PREFIX} HTTP {}", response.status)),
            };
            tracing::warn!(
                client_id = %self.client_id,
                status = response.status.as_u16(),
                error = %err,
                "Token request rejected"
            );
            return Err(err);
        }

        let token_resp: TokenResponse = response
            .json()
            .map_err(|e| TokenError::InvalidResponse(format!("{PREFIX} JSON parse failed: {e}")))?;

        if let Some(ref tt) = token_resp.token_type
            && !tt.eq_ignore_ascii_case("bearer")
        {
            return Err(TokenError::UnsupportedTokenType(tt.clone()));
        }

        let lifetime_secs = token_resp.expires_in.unwrap_or(self.default_ttl.as_secs());
        let (freshness, min_stale) =
            refresh_params(lifetime_secs, self.refresh_offset, self.min_refresh_period);
        let lifetime_config = TokenLifetimeConfig::new(freshness, min_stale);

        tracing::debug!(client_id = %self.client_id, lifetime_secs, "Obtained access token");

        let access_token = AccessToken::new(token_resp.access_token);
        Ok(lifetime_config.create_token(
            &access_token,
            None::<&IdToken>,
            DurationSecs(lifetime_secs),
        ))
    }
}

/// `(freshness_period, min_staleness_period)` for [`TokenLifetimeConfig`].
///
/// Guarantees `max(lifetime * freshness, min_stale) <= lifetime`:
/// - `offset < lifetime`: stale `offset` seconds before expiry;
/// - `offset >= lifetime`: stale at half the lifetime;
/// - zero lifetime: immediately stale.
///
/// `min_refresh_period` bounds the stale window from below and is capped to
/// the refresh delay.
#[allow(clippy::integer_division, clippy::cast_precision_loss)]
fn refresh_params(
    lifetime_secs: u64,
    refresh_offset: Duration,
    min_refresh_period: Duration,
) -> (f64, DurationSecs) {
    if lifetime_secs == 0 {
        return (0.0, DurationSecs(0));
    }

    let offset = refresh_offset.as_secs();
    let desired_delay = if offset < lifetime_secs {
        lifetime_secs - offset
    } else {
        lifetime_secs / 2
    };

    let freshness = (desired_delay as f64) / (lifetime_secs as f64);
    let min_stale = min_refresh_period.as_secs().min(desired_delay);

    (freshness, DurationSecs(min_stale))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::transport::HttpTransportConfig;
    use httpmock::prelude::*;

    fn registration(server: &MockServer) -> ClientRegistration {
        ClientRegistration {
            token_endpoint: Some(Url::parse(&server.url("/token")).unwrap()),
            client_id: "messaging".into(),
            client_secret: SecretString::new("s3cr3t"),
            ..Default::default()
        }
    }

    fn source(reg: &ClientRegistration) -> ClientCredentialsSource {
        let transport = HttpTransport::new(HttpTransportConfig::for_testing()).unwrap();
        ClientCredentialsSource::new(reg, transport).unwrap()
    }

    #[tokio::test]
    async fn basic_auth_exchange() {
        let server = MockServer::start();
        let expected = format!("Basic {}", general_purpose::STANDARD.encode("messaging:s3cr3t"));
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/token")
                .header("authorization", &expected)
                .header("content-type", "application/x-www-form-urlencoded")
                .body_includes("grant_type=client_credentials")
                .body_excludes("client_secret");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token":"tok-123","expires_in":3600,"token_type":"Bearer"}"#);
        });

        let token = source(&registration(&server)).request_token().await.unwrap();
        assert_eq!(token.access_token().as_str(), "tok-123");
        assert_eq!(token.lifetime(), DurationSecs(3600));
        mock.assert();
    }

    #[tokio::test]
    async fn form_auth_puts_credentials_in_body() {
        let server = MockServer::start();
        let basic = server.mock(|when, then| {
            when.method(POST).path("/token").header_exists("authorization");
            then.status(200).body(r#"{"access_token":"tok"}"#);
        });
        let form = server.mock(|when, then| {
            when.method(POST)
                .path("/token")
                .body_includes("client_id=messaging")
                .body_includes("client_secret=s3cr3t");
            then.status(200).body(r#"{"access_token":"tok"}"#);
        });

        let mut reg = registration(&server);
        reg.client_auth_method = ClientAuthMethod::Form;
        source(&reg).request_token().await.unwrap();

        assert_eq!(basic.calls(), 0, "form auth must not send an Authorization header");
        form.assert();
    }

    #[tokio::test]
    async fn scopes_and_extra_headers_are_sent() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/token")
                .header("x-vendor-key", "vendor-value")
                .body_includes("scope=message.read+message.write");
            then.status(200).body(r#"{"access_token":"tok"}"#);
        });

        let mut reg = registration(&server);
        reg.scopes = vec!["message.read".into(), "message.write".into()];
        reg.extra_headers
            .insert("x-vendor-key".into(), "vendor-value".into());
        source(&reg).request_token().await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn missing_expires_in_uses_default_ttl() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200).body(r#"{"access_token":"tok"}"#);
        });

        let token = source(&registration(&server)).request_token().await.unwrap();
        assert_eq!(token.lifetime(), DurationSecs(300));
    }

    #[tokio::test]
    async fn non_bearer_token_type_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200)
                .body(r#"{"access_token":"tok","token_type":"mac"}"#);
        });

        let err = source(&registration(&server)).request_token().await.unwrap_err();
        assert!(matches!(err, TokenError::UnsupportedTokenType(ref t) if t == "mac"), "{err}");
    }

    #[tokio::test]
    async fn oauth2_error_body_is_mapped() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(401)
                .header("content-type", "application/json")
                .body(r#"{"error":"invalid_client","error_description":"bad secret"}"#);
        });

        let err = source(&registration(&server)).request_token().await.unwrap_err();
        assert_eq!(err.oauth2_error_code(), Some("invalid_client"));
        assert!(!err.to_string().contains("bad secret"));
    }

    #[tokio::test]
    async fn status_without_error_body_is_http_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(503).body("<html>maintenance</html>");
        });

        let err = source(&registration(&server)).request_token().await.unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, TokenError::Http(_)), "{msg}");
        assert!(msg.starts_with("OAuth2 token HTTP 503"), "{msg}");
        assert!(!msg.contains("maintenance"), "{msg}");
    }

    #[test]
    fn requires_token_endpoint() {
        let transport = HttpTransport::new(HttpTransportConfig::for_testing()).unwrap();
        let Err(err) = ClientCredentialsSource::new(&ClientRegistration::default(), transport)
        else {
            panic!("expected ConfigError");
        };
        assert!(matches!(err, TokenError::ConfigError(ref m) if m.contains("token_endpoint")));
    }

    // -- refresh_params -------------------------------------------------------

    #[allow(clippy::cast_precision_loss)]
    fn assert_stale_before_expiry(lifetime: u64, freshness: f64, min_stale: DurationSecs) {
        let delay = ((lifetime as f64) * freshness).max(min_stale.0 as f64);
        assert!(delay <= lifetime as f64, "stale ({delay}) past expiry ({lifetime})");
    }

    #[test]
    fn refresh_params_cases() {
        let offset = Duration::from_secs(30 * 60);
        let min = Duration::from_secs(10);

        // (lifetime, offset, min_period, expected freshness, expected min_stale)
        let cases = [
            (3600, offset, min, 0.5, 10),
            (1200, offset, min, 0.5, 10),
            (300, Duration::from_secs(60), min, 0.8, 10),
            (3600, Duration::ZERO, min, 1.0, 10),
            (300, Duration::from_secs(60), Duration::from_secs(600), 0.8, 240),
        ];
        for (lifetime, offset, min_period, freshness, min_stale) in cases {
            let (r, ms) = refresh_params(lifetime, offset, min_period);
            assert!((r - freshness).abs() < f64::EPSILON, "lifetime {lifetime}: {r}");
            assert_eq!(ms, DurationSecs(min_stale));
            assert_stale_before_expiry(lifetime, r, ms);
        }
    }

    #[test]
    fn refresh_params_zero_lifetime() {
        let (r, ms) = refresh_params(0, Duration::from_secs(1800), Duration::from_secs(10));
        assert!(r.abs() < f64::EPSILON);
        assert_eq!(ms, DurationSecs(0));
    }
}
