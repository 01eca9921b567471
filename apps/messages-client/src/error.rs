use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use oauth2_outbound::{AuthorizeError, InterceptError, ResolveError};
use serde::Serialize;
use thiserror::Error;

pub const APPLICATION_PROBLEM_JSON: &str = "application/problem+json";

/// Handler-level failure, rendered as an RFC 9457 problem.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown or expired session")]
    InvalidSession,

    #[error("{0}")]
    AccessDenied(String),

    #[error("{0}")]
    AuthorizationRequired(String),

    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Downstream(String),
}

#[derive(Debug, Serialize)]
struct Problem<'a> {
    #[serde(rename = "type")]
    type_url: &'a str,
    title: &'a str,
    status: u16,
    detail: String,
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidSession | Self::AccessDenied(_) | Self::AuthorizationRequired(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Downstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::InvalidSession => "Invalid session",
            Self::AccessDenied(_) => "Access denied",
            Self::AuthorizationRequired(_) => "Authorization required",
            Self::Configuration(_) => "Configuration error",
            Self::Downstream(_) => "Downstream request failed",
        }
    }
}

impl From<InterceptError> for ApiError {
    fn from(err: InterceptError) -> Self {
        match err {
            InterceptError::Resolve(ResolveError::AccessDenied(msg)) => Self::AccessDenied(msg),
            InterceptError::Resolve(ResolveError::ConfigurationError(msg)) => {
                Self::Configuration(msg)
            }
            InterceptError::Authorize(e @ AuthorizeError::AuthorizationRequired { .. }) => {
                Self::AuthorizationRequired(e.to_string())
            }
            InterceptError::Authorize(e @ AuthorizeError::UnknownRegistration(_)) => {
                Self::Configuration(e.to_string())
            }
            other => Self::Downstream(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let problem = Problem {
            type_url: "about:blank",
            title: self.title(),
            status: status.as_u16(),
            detail: self.to_string(),
        };
        let mut resp = Json(problem).into_response();
        *resp.status_mut() = status;
        resp.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(APPLICATION_PROBLEM_JSON),
        );
        resp
    }
}
