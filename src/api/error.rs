use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::errors::{GatewayError, PlatformError};

/// Failure of an HTTP request, rendered as `{"error": "..."}`
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("Login rejected: {0}")]
    Rejected(String),
    #[error("Auth session expired. Please request code again.")]
    Expired,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) | ApiError::Rejected(_) => StatusCode::UNAUTHORIZED,
            ApiError::Expired => StatusCode::GONE,
            ApiError::Gateway(e) => match e {
                GatewayError::NoPendingAuth(_)
                | GatewayError::NoPendingPassword(_)
                | GatewayError::InvalidSession(_) => StatusCode::UNAUTHORIZED,
                GatewayError::AlreadySubmitted(_) => StatusCode::CONFLICT,
                GatewayError::SessionUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                GatewayError::Timeout(..) => StatusCode::GATEWAY_TIMEOUT,
                GatewayError::Platform(PlatformError::Unauthorized) => StatusCode::UNAUTHORIZED,
                GatewayError::Platform(PlatformError::NotFound(_)) => StatusCode::NOT_FOUND,
                GatewayError::Platform(_) => StatusCode::BAD_GATEWAY,
                GatewayError::ClientCreation(_) | GatewayError::Storage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Gateway(GatewayError::NoPendingAuth(_)) => {
                "Invalid code or no pending auth".to_string()
            }
            ApiError::Gateway(GatewayError::NoPendingPassword(_)) => {
                "No pending password request".to_string()
            }
            ApiError::Gateway(GatewayError::ClientCreation(_)) => {
                "Failed to create client".to_string()
            }
            ApiError::Gateway(GatewayError::Storage(_)) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        } else {
            log::warn!("Request rejected: {}", self);
        }
        (status, Json(ErrorBody { error: self.message() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::BadRequest("Invalid chat_id"), StatusCode::BAD_REQUEST),
            (ApiError::Expired, StatusCode::GONE),
            (
                GatewayError::NoPendingAuth("+1".into()).into(),
                StatusCode::UNAUTHORIZED,
            ),
            (
                GatewayError::AlreadySubmitted("+1".into()).into(),
                StatusCode::CONFLICT,
            ),
            (
                GatewayError::Timeout("fetch dialogs", Duration::from_secs(10)).into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                GatewayError::Platform(PlatformError::rpc(400, "PEER_ID_INVALID")).into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                GatewayError::ClientCreation(PlatformError::Connection("down".into())).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status, "{:?}", error);
        }
    }

    #[test]
    fn test_messages_hide_internal_details() {
        let error: ApiError =
            GatewayError::ClientCreation(PlatformError::Connection("10.0.0.1 refused".into())).into();
        assert_eq!(error.message(), "Failed to create client");
    }
}
