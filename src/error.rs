use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::api::ErrorResponse;
use crate::capture::CaptureRejection;

#[derive(Debug)]
pub enum HandlerError {
    ValidationError(String),
    NotFound(String),
    Rejected(CaptureRejection),
    StoreError(anyhow::Error),
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use HandlerError::*;
        match self {
            ValidationError(s) => write!(f, "ValidationError: {}", s),
            NotFound(s) => write!(f, "NotFound: {}", s),
            Rejected(r) => write!(f, "Rejected: {}", r),
            StoreError(e) => write!(f, "StoreError: {}", crate::unpack_error(&**e)),
        }
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use HandlerError::*;
        match self {
            StoreError(e) => Some(&**e),
            Rejected(r) => Some(r),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(error: anyhow::Error) -> Self {
        HandlerError::StoreError(error)
    }
}

impl From<CaptureRejection> for HandlerError {
    fn from(rejection: CaptureRejection) -> Self {
        HandlerError::Rejected(rejection)
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        use HandlerError::*;
        let (status, message) = match &self {
            ValidationError(s) => (StatusCode::BAD_REQUEST, s.clone()),
            NotFound(s) => (StatusCode::NOT_FOUND, s.clone()),
            Rejected(r) => (StatusCode::UNPROCESSABLE_ENTITY, r.to_string()),
            StoreError(_) => {
                tracing::error!(error = %self, "highlight store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "highlight store failure".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
