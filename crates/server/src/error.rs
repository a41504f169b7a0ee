use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::models::{
    employee::EmployeeError, sequence::SequenceError, task::TaskError, vendor::VendorError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Vendor(#[from] VendorError),
    #[error(transparent)]
    Employee(#[from] EmployeeError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<&'static str> for ApiError {
    fn from(msg: &'static str) -> Self {
        ApiError::BadRequest(msg.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = match &self {
            ApiError::Vendor(err) => match err {
                VendorError::VendorNotFound => (StatusCode::BAD_REQUEST, "VendorError"),
                VendorError::DuplicateEmail | VendorError::DuplicateWhatsapp => {
                    (StatusCode::CONFLICT, "VendorError")
                }
                VendorError::AllocationConflict => (StatusCode::CONFLICT, "VendorError"),
                VendorError::Sequence(SequenceError::InvalidNamespace(_)) => {
                    (StatusCode::BAD_REQUEST, "VendorError")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "VendorError"),
            },
            ApiError::Employee(err) => match err {
                EmployeeError::VendorNotFound => (StatusCode::BAD_REQUEST, "EmployeeError"),
                EmployeeError::EmployeeNotFound => (StatusCode::NOT_FOUND, "EmployeeError"),
                EmployeeError::DuplicateEmail | EmployeeError::DuplicateWhatsapp => {
                    (StatusCode::CONFLICT, "EmployeeError")
                }
                EmployeeError::AllocationConflict => (StatusCode::CONFLICT, "EmployeeError"),
                EmployeeError::Sequence(SequenceError::InvalidNamespace(_)) => {
                    (StatusCode::BAD_REQUEST, "EmployeeError")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "EmployeeError"),
            },
            ApiError::Task(err) => match err {
                TaskError::VendorNotFound => (StatusCode::BAD_REQUEST, "TaskError"),
                TaskError::TaskNotFound => (StatusCode::NOT_FOUND, "TaskError"),
                TaskError::UnknownAssignee(_) => (StatusCode::BAD_REQUEST, "TaskError"),
                TaskError::ValidationError(_) => (StatusCode::BAD_REQUEST, "TaskError"),
                TaskError::Unauthorized => (StatusCode::FORBIDDEN, "TaskError"),
                TaskError::AllocationConflict => (StatusCode::CONFLICT, "TaskError"),
                TaskError::Sequence(SequenceError::InvalidNamespace(_)) => {
                    (StatusCode::BAD_REQUEST, "TaskError")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "TaskError"),
            },
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        };

        let error_message = match &self {
            ApiError::Unauthorized => "Unauthorized. Please sign in again.".to_string(),
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) | ApiError::Internal(msg) => {
                msg.clone()
            }
            _ => self.to_string(),
        };

        if status_code.is_server_error() {
            tracing::error!(
                status = %status_code,
                error_type,
                error = %self,
                "API request failed"
            );
        }
        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}
