use bytes::Bytes;
use http::header::ACCEPT;
use http_body_util::Full;
use serde::Deserialize;
use url::Url;

use super::error::TokenError;
use crate::transport::{HttpTransport, describe};

const PREFIX: &str = "OIDC discovery";

/// The one field of the `OpenID` Connect discovery document we need.
#[derive(Deserialize)]
struct OidcDiscoveryDoc {
    token_endpoint: String,
}

/// Resolve the token endpoint from an OIDC issuer URL.
///
/// Fetches `{issuer_url}/.well-known/openid-configuration` once.
///
/// # Errors
///
/// Returns [`TokenError::Http`] if the request fails or returns a non-success
/// status, and [`TokenError::InvalidResponse`] if the document cannot be
/// parsed or `token_endpoint` is not a valid URL.
pub async fn discover_token_endpoint(
    transport: &HttpTransport,
    issuer_url: &Url,
) -> Result<Url, TokenError> {
    let base = issuer_url.as_str().trim_end_matches('/');
    let discovery_url = format!("{base}/.well-known/openid-configuration");

    let request = http::Request::get(discovery_url.as_str())
        .header(ACCEPT, "application/json")
        .body(Full::new(Bytes::new()))
        .map_err(|e| TokenError::Http(format!("{PREFIX} request build failed: {e}")))?;

    let response = transport
        .send(request)
        .await
        .map_err(|e| TokenError::Http(describe(&e, PREFIX)))?;
    if !response.status.is_success() {
        return Err(TokenError::Http(format!("{PREFIX} HTTP {}", response.status)));
    }

    let doc: OidcDiscoveryDoc = response
        .json()
        .map_err(|e| TokenError::InvalidResponse(format!("{PREFIX} JSON parse failed: {e}")))?;

    tracing::debug!(issuer = %issuer_url, token_endpoint = %doc.token_endpoint, "Discovered token endpoint");

    Url::parse(&doc.token_endpoint).map_err(|e| {
        TokenError::InvalidResponse(format!(
            "invalid token_endpoint URL in discovery document: {e}"
        ))
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::transport::HttpTransportConfig;
    use httpmock::prelude::*;

    fn transport() -> HttpTransport {
        HttpTransport::new(HttpTransportConfig::for_testing()).unwrap()
    }

    fn issuer_url(server: &MockServer, suffix: &str) -> Url {
        Url::parse(&format!("http://localhost:{}{suffix}", server.port())).unwrap()
    }

    #[tokio::test]
    async fn discover_valid_response_with_trailing_slash() {
        let server = MockServer::start();
        let token_ep = format!("http://localhost:{}/oauth/token", server.port());

        let mock = server.mock(|when, then| {
            when.method(GET).path("/.well-known/openid-configuration");
            then.status(200)
                .header("content-type", "application/json")
                .body(format!(r#"{{"token_endpoint":"{token_ep}","issuer":"x"}}"#));
        });

        for suffix in ["", "/"] {
            let url = discover_token_endpoint(&transport(), &issuer_url(&server, suffix))
                .await
                .unwrap();
            assert_eq!(url.as_str(), token_ep);
        }
        mock.assert_calls(2);
    }

    #[tokio::test]
    async fn discover_missing_field() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/.well-known/openid-configuration");
            then.status(200)
                .body(r#"{"authorization_endpoint":"https://example.com/auth"}"#);
        });

        let err = discover_token_endpoint(&transport(), &issuer_url(&server, ""))
            .await
            .unwrap_err();
        assert!(
            matches!(err, TokenError::InvalidResponse(ref msg) if msg.contains(PREFIX)),
            "{err}"
        );
    }

    #[tokio::test]
    async fn discover_invalid_url() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/.well-known/openid-configuration");
            then.status(200).body(r#"{"token_endpoint":"not a valid url"}"#);
        });

        let err = discover_token_endpoint(&transport(), &issuer_url(&server, ""))
            .await
            .unwrap_err();
        assert!(
            matches!(err, TokenError::InvalidResponse(ref msg) if msg.contains("invalid token_endpoint")),
            "{err}"
        );
    }

    #[tokio::test]
    async fn discover_http_error_excludes_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/.well-known/openid-configuration");
            then.status(500).body("stack trace with internals");
        });

        let err = discover_token_endpoint(&transport(), &issuer_url(&server, ""))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, TokenError::Http(_)), "{msg}");
        assert!(msg.contains("500"), "{msg}");
        assert!(!msg.contains("internals"), "{msg}");
    }
}
