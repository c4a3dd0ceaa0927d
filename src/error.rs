use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    UnprocessableEntity(String),
    #[error("{0}")]
    Dependency(String),
    #[error("{0}")]
    Internal(String),

    // Statement-engine taxonomy.
    #[error("listing policy not found: {0}")]
    PolicyNotFound(String),
    #[error("invalid statement period: {0}")]
    InvalidPeriod(String),
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("invalid statement transition: {0}")]
    InvalidTransition(String),
    #[error("persistence conflict: {0}")]
    PersistenceConflict(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::InvalidPeriod(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) | Self::PolicyNotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::InvalidTransition(_) | Self::PersistenceConflict(_) => {
                StatusCode::CONFLICT
            }
            Self::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Dependency(_) | Self::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable tag used in batch reports and response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::UnprocessableEntity(_) => "unprocessable_entity",
            Self::Dependency(_) => "dependency",
            Self::Internal(_) => "internal",
            Self::PolicyNotFound(_) => "policy_not_found",
            Self::InvalidPeriod(_) => "invalid_period",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::PersistenceConflict(_) => "persistence_conflict",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "request failed");
        }
        let body = Json(json!({
            "detail": self.to_string(),
            "kind": self.kind(),
        }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("Record not found.".to_string()),
            other => {
                tracing::error!(error = %other, "database error");
                Self::Internal("Database operation failed.".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AppError;
    use axum::http::StatusCode;

    #[test]
    fn statement_errors_map_to_expected_statuses() {
        assert_eq!(
            AppError::InvalidTransition("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::PersistenceConflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::PolicyNotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::InvalidPeriod("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::ProviderUnavailable("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(AppError::InvalidTransition("x".into()).kind(), "invalid_transition");
        assert_eq!(AppError::ProviderUnavailable("x".into()).kind(), "provider_unavailable");
    }
}
