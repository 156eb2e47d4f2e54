use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::{AppError, ErrorKind, ErrorReport};

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const INVALID_ARGUMENT: &str = "invalid_argument";
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const UNSUPPORTED_MEDIA: &str = "unsupported_media";
    pub const NOT_FOUND: &str = "not_found";
    pub const EMPTY_RESULT: &str = "empty_result";
    pub const DUPLICATE_NUMBER: &str = "duplicate_number";
    pub const INTERNAL: &str = "internal_fault";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    /// Error chain for the response log; never serialized.
    chain: Vec<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            chain: Vec::new(),
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn invalid_argument(hint: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_ARGUMENT,
            "Invalid argument",
            Some(hint.into()),
        )
    }

    pub fn unauthorized(message: &'static str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, codes::UNAUTHORIZED, message, None)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument | ErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
        ErrorKind::UnsupportedMedia => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ErrorKind::NotFound | ErrorKind::EmptyResult => StatusCode::NOT_FOUND,
        ErrorKind::DuplicateNumber => StatusCode::CONFLICT,
        ErrorKind::InternalFault => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let kind = err.kind();
        let (code, message) = match kind {
            ErrorKind::InvalidArgument => (codes::INVALID_ARGUMENT, "Invalid argument"),
            ErrorKind::ValidationFailed => (codes::VALIDATION_FAILED, "Validation failed"),
            ErrorKind::UnsupportedMedia => (codes::UNSUPPORTED_MEDIA, "Unsupported media"),
            ErrorKind::NotFound => (codes::NOT_FOUND, "Report not found"),
            ErrorKind::EmptyResult => (codes::EMPTY_RESULT, "No reports matched"),
            ErrorKind::DuplicateNumber => (codes::DUPLICATE_NUMBER, "Duplicate report number"),
            ErrorKind::InternalFault => (codes::INTERNAL, "Internal error"),
        };
        let status = status_for(kind);
        let chain = ErrorReport::from_error("infra::http::api", status, &err).messages;
        // Internal details stay in the log.
        let hint = (kind != ErrorKind::InternalFault).then(|| err.to_string());

        Self {
            status,
            code,
            message,
            hint,
            chain,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = if self.chain.is_empty() {
            ErrorReport::from_message(
                "infra::http::api",
                self.status,
                format!(
                    "{}: {}",
                    self.code,
                    self.hint.as_deref().unwrap_or(self.message)
                ),
            )
        } else {
            ErrorReport {
                source: "infra::http::api",
                status: self.status,
                messages: self.chain,
            }
        };

        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}
