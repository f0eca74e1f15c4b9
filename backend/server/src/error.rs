use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{auth::AuthError, ledger::StoreError, votes::VoteError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("{0}")]
    Unauthenticated(#[from] AuthError),

    #[error(transparent)]
    Vote(#[from] VoteError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::MalformedPayload => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Vote(VoteError::InvalidInput(_) | VoteError::AlreadyVoted(_)) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Vote(VoteError::PermissionDenied { .. }) => StatusCode::FORBIDDEN,
            AppError::Vote(VoteError::Store(StoreError::Unavailable(_))) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Vote(VoteError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status.is_server_error() {
            error!("{self}");
            "Server error, try again later.".to_string()
        } else {
            self.to_string()
        };

        let mut response = (status, Json(json!({ "message": message }))).into_response();

        if matches!(&self, AppError::Vote(e) if e.is_retryable()) {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from_static("1"));
        }

        response
    }
}
