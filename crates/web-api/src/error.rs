use application::{ApplicationError, CredentialError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{DomainError, RepositoryError, SecretError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.body.code
    }
}

/// 错误类型到 HTTP 响应的唯一映射表
impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use ApplicationError as AppErr;

        match error {
            AppErr::Domain(DomainError::InvalidArgument { field, reason }) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                format!("{}: {}", field, reason),
            ),
            AppErr::Repository(repo_err) => match repo_err {
                RepositoryError::RecordNotFound { .. } => ApiError::new(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "requested resource not found",
                ),
                RepositoryError::DuplicateKey { .. } => {
                    ApiError::new(StatusCode::CONFLICT, "CONFLICT", "resource already exists")
                }
                RepositoryError::SecurityCheckFailed { what } => ApiError::new(
                    StatusCode::FORBIDDEN,
                    "SECURITY_CHECK_FAILED",
                    format!("security check for {} failed", what),
                ),
                RepositoryError::AuthorizationFailed { action } => ApiError::new(
                    StatusCode::FORBIDDEN,
                    "AUTHORIZATION_FAILED",
                    format!("insufficient role for {}", action),
                ),
                err @ RepositoryError::PaginationRange { .. } => {
                    ApiError::new(StatusCode::BAD_REQUEST, "PAGINATION_RANGE", err.to_string())
                }
                err @ (RepositoryError::PartitionNotFound { .. }
                | RepositoryError::Encoding(_)
                | RepositoryError::Decoding(_)
                | RepositoryError::Storage(_)) => ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    err.to_string(),
                ),
            },
            AppErr::Credential(CredentialError::Invalid(_)) | AppErr::Authentication => {
                ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    "AUTHENTICATION_FAILED",
                    "authentication failed",
                )
            }
            AppErr::Credential(err @ CredentialError::Issue(_)) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "CREDENTIAL_ERROR",
                err.to_string(),
            ),
            AppErr::Secret(SecretError::Mismatch) => ApiError::new(
                StatusCode::FORBIDDEN,
                "SECURITY_CHECK_FAILED",
                "secret does not match",
            ),
            AppErr::Secret(err @ SecretError::Hash(_)) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "SECRET_ERROR",
                err.to_string(),
            ),
            AppErr::Hub(err) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "HUB_UNAVAILABLE",
                err.to_string(),
            ),
            AppErr::Infrastructure(message) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INFRASTRUCTURE_ERROR",
                message,
            ),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        ApplicationError::from(error).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.body.code, message = %self.body.message, "request failed");
        }
        (self.status, Json(self.body)).into_response()
    }
}
