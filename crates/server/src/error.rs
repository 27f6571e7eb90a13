//! Structured errors for the lantern proxy.
//!
//! Intercepted requests always resolve to a response, so these only surface
//! for malformed inbound requests and failed pass-through fetches.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Structured errors for the lantern proxy.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The inbound request could not be mapped onto the origin.
    #[error("INVALID_INPUT: {0}")]
    BadRequest(String),

    /// The upstream fetch for a pass-through request failed.
    #[error(transparent)]
    Upstream(#[from] lantern_core::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(lantern_core::Error::InvalidInput(_) | lantern_core::Error::InvalidUrl(_)) => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(status = status.as_u16(), error = %self, "proxy request failed");
        (status, self.to_string()).into_response()
    }
}
