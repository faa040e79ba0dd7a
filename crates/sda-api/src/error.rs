//! HTTP-facing error mapping for the Admin API (§4.4, §6, §7).
//!
//! Every handler returns [`ApiError`]; [`IntoResponse`] translates it into
//! the status codes and body shapes §6 specifies — plain text for 401s
//! (`no access token supplied` / `not authorized`), a human-readable reason
//! for 400s, and an opaque message for 5xx so stack traces never leave the
//! process (§7).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sda_core::Error as CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no access token supplied")]
    NoToken,

    #[error("not authorized")]
    NotAuthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Map a store/broker failure onto the 400/500 split §7 describes:
    /// domain conflicts and "not found" lookups are the caller's fault,
    /// everything else is ours.
    pub fn from_core(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(msg) => ApiError::BadRequest(msg),
            CoreError::Conflict(msg) => ApiError::BadRequest(msg),
            CoreError::Validation(msg) => ApiError::BadRequest(msg),
            CoreError::Authorization(_) => ApiError::NotAuthorized,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::from_core(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::NoToken => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::NotAuthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error serving admin API request");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_bad_request() {
        let err: ApiError = CoreError::NotFound("accession API:1".into()).into();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn authorization_failure_maps_to_not_authorized() {
        let err: ApiError = CoreError::Authorization("sub not in admin list".into()).into();
        assert!(matches!(err, ApiError::NotAuthorized));
    }
}
