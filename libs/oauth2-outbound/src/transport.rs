//! Shared hyper client used for token-endpoint calls and as the inner service
//! of [`OAuth2ClientLayer`](crate::layer::OAuth2ClientLayer).
//!
//! TLS uses rustls with the webpki roots; plain `http` is only accepted when
//! [`HttpTransportConfig::allow_insecure_http`] is set (mock servers, local
//! development).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::USER_AGENT;
use http::{HeaderMap, HeaderValue, Request, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed error type used at service boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Concrete hyper client: rustls over HTTP/1.1 and HTTP/2.
pub type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

pub const DEFAULT_USER_AGENT: &str = concat!("oauth2-outbound/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpTransportConfig {
    /// Per-request deadline, covering the response body as well (default: 10s).
    #[serde(with = "crate::duration_serde")]
    pub request_timeout: Duration,
    /// Upper bound for buffered response bodies (default: 1 MiB).
    pub max_body_size: usize,
    /// Accept `http://` URLs. Test and local setups only.
    pub allow_insecure_http: bool,
    pub user_agent: String,
    #[serde(with = "crate::duration_serde")]
    pub pool_idle_timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024,
            allow_insecure_http: false,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

impl HttpTransportConfig {
    /// Short timeouts and plain HTTP allowed; meant for mock servers.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            allow_insecure_http: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("TLS initialization failed: {0}")]
    Tls(#[source] rustls::Error),

    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    #[error("request timed out after {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid header value for '{name}'")]
    InvalidHeader { name: String },

    #[error("scheme '{0}' rejected: only https is allowed")]
    InsecureScheme(String),
}

/// Fully buffered response.
#[derive(Debug)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BufferedResponse {
    /// Deserialize the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the body is not valid JSON for `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Cloneable handle around a pooled [`HttpsClient`].
#[derive(Clone)]
pub struct HttpTransport {
    client: HttpsClient,
    config: Arc<HttpTransportConfig>,
    user_agent: HeaderValue,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Build the connector and the connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Tls`] if rustls cannot be initialized, or
    /// [`TransportError::InvalidHeader`] if the user agent is not a valid
    /// header value.
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        if config.allow_insecure_http {
            tracing::warn!("insecure HTTP enabled; use only for testing with mock servers");
        }

        let user_agent =
            HeaderValue::from_str(&config.user_agent).map_err(|_| TransportError::InvalidHeader {
                name: USER_AGENT.to_string(),
            })?;

        let builder = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(crypto_provider())
            .map_err(TransportError::Tls)?;
        let connector = if config.allow_insecure_http {
            builder.https_or_http().enable_all_versions().build()
        } else {
            builder.https_only().enable_all_versions().build()
        };

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .build(connector);

        Ok(Self {
            client,
            config: Arc::new(config),
            user_agent,
        })
    }

    #[must_use]
    pub fn client(&self) -> &HttpsClient {
        &self.client
    }

    #[must_use]
    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    /// Send a request and buffer the whole response, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on scheme rejection, connection failure,
    /// timeout, or an oversized body. Non-2xx statuses are not errors.
    pub async fn send(
        &self,
        mut req: Request<Full<Bytes>>,
    ) -> Result<BufferedResponse, TransportError> {
        self.check_scheme(req.uri())?;
        if !req.headers().contains_key(USER_AGENT) {
            req.headers_mut().insert(USER_AGENT, self.user_agent.clone());
        }

        let timeout = self.config.request_timeout;
        let limit = self.config.max_body_size;
        let exchange = async {
            let response = self
                .client
                .request(req)
                .await
                .map_err(|e| TransportError::Transport(Box::new(e)))?;
            let (parts, body) = response.into_parts();
            let body = collect_limited(body, limit).await?;
            Ok(BufferedResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    fn check_scheme(&self, uri: &http::Uri) -> Result<(), TransportError> {
        match uri.scheme_str() {
            Some("https") => Ok(()),
            Some("http") if self.config.allow_insecure_http => Ok(()),
            other => Err(TransportError::InsecureScheme(
                other.unwrap_or_default().to_owned(),
            )),
        }
    }
}

/// Buffer `body`, failing once more than `limit` bytes arrive.
///
/// # Errors
///
/// Returns [`TransportError::BodyTooLarge`] past the limit and
/// [`TransportError::Transport`] if the body stream fails.
pub async fn collect_limited<B>(body: B, limit: usize) -> Result<Bytes, TransportError>
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(TransportError::BodyTooLarge { limit }),
        Err(e) => Err(TransportError::Transport(e)),
    }
}

/// Installed default rustls provider, or aws-lc-rs without installing it.
fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// One-line, secret-free description of a transport failure, prefixed with
/// the calling context (`"OAuth2 token"`, `"OIDC discovery"`, ...).
#[must_use]
pub fn describe(err: &TransportError, prefix: &str) -> String {
    match err {
        TransportError::Tls(e) => format!("{prefix} TLS error: {e}"),
        TransportError::Transport(e) => format!("{prefix} transport error: {e}"),
        TransportError::Timeout(d) => {
            format!("{prefix} request timed out after {}", humantime::format_duration(*d))
        }
        TransportError::BodyTooLarge { limit } => {
            format!("{prefix} response too large: limit {limit} bytes")
        }
        TransportError::RequestBuild(e) => format!("{prefix} request build failed: {e}"),
        TransportError::InvalidHeader { name } => {
            format!("{prefix} invalid header value for '{name}'")
        }
        TransportError::InsecureScheme(scheme) => {
            format!("{prefix} invalid scheme '{scheme}': only https is allowed")
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn get(url: &str) -> Request<Full<Bytes>> {
        Request::get(url).body(Full::default()).unwrap()
    }

    #[tokio::test]
    async fn send_buffers_non_success_responses() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/missing").header_exists("user-agent");
            then.status(404).body("nope");
        });

        let transport = HttpTransport::new(HttpTransportConfig::for_testing()).unwrap();
        let resp = transport.send(get(&server.url("/missing"))).await.unwrap();

        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        assert_eq!(&resp.body[..], b"nope");
        mock.assert();
    }

    #[tokio::test]
    async fn plain_http_rejected_unless_allowed() {
        let transport = HttpTransport::new(HttpTransportConfig::default()).unwrap();
        let err = transport
            .send(get("http://localhost:1/token"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InsecureScheme(ref s) if s == "http"), "{err}");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/big");
            then.status(200).body("x".repeat(64));
        });

        let config = HttpTransportConfig {
            max_body_size: 16,
            ..HttpTransportConfig::for_testing()
        };
        let transport = HttpTransport::new(config).unwrap();
        let err = transport.send(get(&server.url("/big"))).await.unwrap_err();
        assert!(matches!(err, TransportError::BodyTooLarge { limit: 16 }), "{err}");
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_millis(500));
        });

        let config = HttpTransportConfig {
            request_timeout: Duration::from_millis(50),
            ..HttpTransportConfig::for_testing()
        };
        let transport = HttpTransport::new(config).unwrap();
        let err = transport.send(get(&server.url("/slow"))).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)), "{err}");
        assert_eq!(describe(&err, "TEST"), "TEST request timed out after 50ms");
    }

    #[test]
    fn config_deserializes_human_durations() {
        let config: HttpTransportConfig =
            serde_json::from_str(r#"{"request_timeout":"2s","allow_insecure_http":true}"#)
                .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert!(config.allow_insecure_http);
        assert_eq!(config.max_body_size, 1024 * 1024);
    }
}
