//! HTTP boundary error. Component errors convert into [`ApiError`], which
//! decides status code and the `{ "error", "code" }` body; internal causes
//! are logged here and never sent to the client.

use crate::{
    archive::ArchiveError,
    auth::AuthError,
    launch::LaunchError,
    progress::ProgressError,
    registry::RegistryError,
    store::StoreError,
};
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{message}")]
    NotFound { code: &'static str, message: String },
    #[error("{message}")]
    Conflict { code: &'static str, message: String },
    #[error("{message}")]
    ExtractionFailed { package_id: i64, message: String },
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
    #[error("{0}")]
    BadGateway(String),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    package_id: Option<i64>,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden(msg.into())
    }

    pub fn not_found(code: &'static str, msg: impl Into<String>) -> Self {
        ApiError::NotFound { code, message: msg.into() }
    }

    pub fn internal<E: Into<anyhow::Error>>(e: E) -> Self {
        ApiError::Internal(e.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::ExtractionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Rejected { status, .. } => *status,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound { code, .. } | ApiError::Conflict { code, .. } => *code,
            ApiError::ExtractionFailed { .. } => "EXTRACTION_FAILED",
            ApiError::Rejected { .. } => "REQUEST_REJECTED",
            ApiError::BadGateway(_) => "UPSTREAM_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            ApiError::Internal(e) => {
                tracing::error!(error = ?e, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let package_id = match &self {
            ApiError::ExtractionFailed { package_id, .. } => Some(*package_id),
            _ => None,
        };
        (status, Json(ErrorBody { error, code: self.code(), package_id })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(what) => ApiError::Conflict {
                code: "DUPLICATE",
                message: format!("{what} already exists"),
            },
            StoreError::NotFound(what) => ApiError::NotFound {
                code: "NOT_FOUND",
                message: format!("{what} not found"),
            },
            other => ApiError::internal(other),
        }
    }
}

impl From<ArchiveError> for ApiError {
    fn from(e: ArchiveError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::Rejected { status: e.status(), message: e.body_text() }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        let message = e.to_string();
        match e {
            RegistryError::Invalid(a) => a.into(),
            RegistryError::CourseNotFound(_) => ApiError::NotFound { code: "COURSE_NOT_FOUND", message },
            RegistryError::PackageNotFound { .. } => ApiError::NotFound { code: "PACKAGE_NOT_FOUND", message },
            RegistryError::DuplicateLanguage { .. } => {
                ApiError::Conflict { code: "DUPLICATE_LANGUAGE", message }
            }
            RegistryError::ExtractionFailed { package_id, .. } => {
                ApiError::ExtractionFailed { package_id, message }
            }
            RegistryError::Storage(io) => ApiError::internal(io),
            RegistryError::Store(s) => s.into(),
        }
    }
}

impl From<LaunchError> for ApiError {
    fn from(e: LaunchError) -> Self {
        let message = e.to_string();
        match e {
            LaunchError::InvalidLanguage(_) => ApiError::BadRequest(message),
            LaunchError::CourseNotFound(_) => ApiError::NotFound { code: "COURSE_NOT_FOUND", message },
            LaunchError::PackageNotFound { .. } => ApiError::NotFound { code: "PACKAGE_NOT_FOUND", message },
            LaunchError::ContentNotReady { .. } => ApiError::NotFound { code: "CONTENT_NOT_READY", message },
            LaunchError::NoAccess { .. } => ApiError::NotFound { code: "NO_ACCESS", message },
            LaunchError::Store(s) => s.into(),
        }
    }
}

impl From<ProgressError> for ApiError {
    fn from(e: ProgressError) -> Self {
        let message = e.to_string();
        match e {
            ProgressError::CourseNotFound(_) => ApiError::NotFound { code: "COURSE_NOT_FOUND", message },
            ProgressError::Store(s) => s.into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Unauthorized(e.to_string())
    }
}
