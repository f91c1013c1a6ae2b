//! Error taxonomy shared by the registry, the dispatcher and the HTTP layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("invalid upstream url {url:?}: {source}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("{0} is not registered")]
    NotFound(String),

    #[error("{message}")]
    Validation {
        field: &'static str,
        message: &'static str,
    },

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(#[from] reqwest::Error),
}

impl ProxyError {
    /// Status code the HTTP boundary answers with for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Parse { .. }
            | ProxyError::InvalidIdentifier(_)
            | ProxyError::Validation { .. }
            | ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::UpstreamUnreachable(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ProxyError::Parse { .. } => "INVALID_URL",
            ProxyError::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            ProxyError::NotFound(_) => "NOT_FOUND",
            ProxyError::Validation { .. } => "VALIDATION",
            ProxyError::BodyTooLarge { .. } => "BODY_TOO_LARGE",
            ProxyError::BadRequest(_) => "BAD_REQUEST",
            ProxyError::UpstreamUnreachable(e) if e.is_timeout() => "UPSTREAM_TIMEOUT",
            ProxyError::UpstreamUnreachable(_) => "UPSTREAM_UNREACHABLE",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let ProxyError::Validation { field, .. } = &self {
            error["field"] = json!(field);
        }

        (self.status(), axum::Json(json!({ "error": error }))).into_response()
    }
}
