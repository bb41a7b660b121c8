use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use super::domain::{Application, ApplicationReview};
use super::service::ApplicationServiceError;
use super::validation::ValidationFailure;
use crate::auth::AuthError;

/// Envelope shared by every grants endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    pub status_code: u16,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::OK, message, data)
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::CREATED, message, data)
    }

    fn with_status(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
            status_code: status.as_u16(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// Failure side of the envelope.
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationFailure),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, error) = match self {
            ApiError::Validation(failure) => {
                ("Validation failed".to_string(), Some(json!(failure.errors)))
            }
            ApiError::BadRequest(message)
            | ApiError::Unauthorized(message)
            | ApiError::Forbidden(message)
            | ApiError::NotFound(message)
            | ApiError::Internal(message) => (message, None),
        };
        let body = ApiResponse::<Value> {
            success: false,
            message,
            data: None,
            error,
            status_code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ValidationFailure> for ApiError {
    fn from(value: ValidationFailure) -> Self {
        ApiError::Validation(value)
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::AdminRequired => ApiError::Forbidden(value.to_string()),
            AuthError::Signing(error) => {
                tracing::error!(%error, "token signing failed");
                ApiError::Internal("Internal server error".to_string())
            }
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<ApplicationServiceError> for ApiError {
    fn from(value: ApplicationServiceError) -> Self {
        match value {
            ApplicationServiceError::NotFound => ApiError::NotFound(value.to_string()),
            ApplicationServiceError::Forbidden(message) => ApiError::Forbidden(message),
            ApplicationServiceError::InvalidState(message)
            | ApplicationServiceError::InvalidInput(message) => ApiError::BadRequest(message),
            ApplicationServiceError::Store(error) => {
                tracing::error!(%error, "application store failure");
                ApiError::Internal("Internal server error".to_string())
            }
        }
    }
}

/// Client-facing application record with the derived `currentReview`.
///
/// Internal review notes are stripped unless the viewer is an administrator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationView {
    #[serde(flatten)]
    pub application: Application,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_review: Option<ApplicationReview>,
}

impl ApplicationView {
    pub fn for_viewer(mut application: Application, viewer_is_admin: bool) -> Self {
        if !viewer_is_admin {
            for review in &mut application.reviews {
                review.internal_notes = None;
            }
        }
        let current_review = application.current_review().cloned();
        Self {
            application,
            current_review,
        }
    }
}
