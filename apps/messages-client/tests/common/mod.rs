#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

//! Shared fixtures: a mock authorization server, a mock messages API serving
//! `tests/fixtures/responses/<path>.json`, and an [`AppConfig`] wired to both.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use axum::body::Body;
use http::{Request, Response};
use http_body_util::BodyExt;
use httpmock::prelude::*;
use httpmock::Mock;
use messages_client::App;
use messages_client::config::{AppConfig, SessionConfig};
use oauth2_outbound::{
    AuthorizationGrantType, ClientRegistration, HttpTransportConfig, SecretString,
};
use tower::ServiceExt;
use url::Url;

pub const SERVICE_TOKEN: &str = "svc-token";
pub const ALICE_TOKEN: &str = "alice-token";

/// Expected `Authorization` header on the downstream call.
#[derive(Clone, Copy)]
pub enum Expect<'a> {
    Bearer(&'a str),
    NoToken,
}

pub struct Harness {
    pub auth_server: MockServer,
    pub api_server: MockServer,
    pub config: AppConfig,
}

fn fixture_path(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/responses")
        .join(format!("{}.json", path.trim_start_matches('/')))
}

impl Harness {
    pub fn start() -> Self {
        let auth_server = MockServer::start();
        let api_server = MockServer::start();
        let config = app_config(&auth_server, &api_server);
        Self {
            auth_server,
            api_server,
            config,
        }
    }

    /// Token endpoint answering every `client_credentials` exchange.
    pub fn mount_token_endpoint(&self) -> Mock<'_> {
        self.auth_server.mock(|when, then| {
            when.method(POST)
                .path("/oauth2/token")
                .body_includes("grant_type=client_credentials");
            then.status(200)
                .header("content-type", "application/json")
                .body(format!(
                    r#"{{"access_token":"{SERVICE_TOKEN}","expires_in":3600,"token_type":"Bearer"}}"#
                ));
        })
    }

    /// Serve the fixture for `path` when the request carries `expect`.
    /// Unmatched requests get httpmock's `404`.
    pub fn mount_fixture(&self, path: &str, expect: Expect<'_>) -> Mock<'_> {
        self.mount_fixture_at(path, path, expect)
    }

    /// Serve the fixture for `fixture` under `path`, e.g. behind a gateway
    /// prefix.
    pub fn mount_fixture_at(&self, path: &str, fixture: &str, expect: Expect<'_>) -> Mock<'_> {
        let body = std::fs::read_to_string(fixture_path(fixture)).unwrap();
        self.api_server.mock(|when, then| {
            match expect {
                Expect::Bearer(token) => {
                    when.method(GET)
                        .path(path)
                        .header("authorization", format!("Bearer {token}"));
                }
                Expect::NoToken => {
                    when.method(GET).path(path).header_missing("authorization");
                }
            }
            then.status(200)
                .header("content-type", "application/json")
                .body(body);
        })
    }

    pub async fn app(&self) -> App {
        App::build(&self.config).await.unwrap()
    }
}

fn app_config(auth_server: &MockServer, api_server: &MockServer) -> AppConfig {
    let messaging = ClientRegistration {
        client_id: "messaging-client".into(),
        client_secret: SecretString::new("secret"),
        scopes: vec!["message.read".into(), "message.write".into()],
        token_endpoint: Some(Url::parse(&auth_server.url("/oauth2/token")).unwrap()),
        jitter_max: Duration::ZERO,
        ..Default::default()
    };
    let login = ClientRegistration {
        client_id: "login-client".into(),
        client_secret: SecretString::new("secret"),
        authorization_grant_type: AuthorizationGrantType::AuthorizationCode,
        scopes: vec!["openid".into(), "profile".into()],
        issuer_url: Some(Url::parse(&auth_server.base_url()).unwrap()),
        ..Default::default()
    };

    let sessions = BTreeMap::from([
        (
            "alice-session".to_owned(),
            SessionConfig::Oauth2 {
                principal: "alice".into(),
                registration_id: "login-client".into(),
                authorities: Vec::new(),
                access_token: Some(SecretString::new(ALICE_TOKEN)),
                expires_at: None,
            },
        ),
        (
            "carol-session".to_owned(),
            SessionConfig::Oauth2 {
                principal: "carol".into(),
                registration_id: "login-client".into(),
                authorities: Vec::new(),
                access_token: None,
                expires_at: None,
            },
        ),
        (
            "bob-session".to_owned(),
            SessionConfig::Form {
                principal: "bob".into(),
            },
        ),
    ]);

    let mut config = AppConfig {
        registrations: BTreeMap::from([
            ("messaging-client".into(), messaging),
            ("login-client".into(), login),
        ]),
        sessions,
        transport: HttpTransportConfig::for_testing(),
        ..AppConfig::default()
    };
    config.messages.base_url = api_server.base_url();
    config
}

pub struct TestResponse {
    pub status: http::StatusCode,
    pub json: serde_json::Value,
}

/// `GET path` against the router, optionally with a session.
pub async fn get(app: &App, path: &str, session: Option<&str>) -> TestResponse {
    let mut req = Request::get(path);
    if let Some(session) = session {
        req = req.header("authorization", format!("Bearer {session}"));
    }
    let resp: Response<Body> = app
        .router
        .clone()
        .oneshot(req.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    TestResponse { status, json }
}
