// rsa_handshake_chat/chat_peer/src/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shared_crypto::Error;

/// Core error rendered as an HTTP response with an `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidInput(_) | Error::InvalidCodePoint(_) | Error::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::AuthenticationFailure(_) => StatusCode::UNAUTHORIZED,
            Error::KeyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::TransportFailure(_) => StatusCode::BAD_GATEWAY,
            Error::ArithmeticInvariantViolation(_) | Error::KeyGenerationExhausted { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, %status, "request failed");
        } else {
            tracing::warn!(error = %self.0, %status, "request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
