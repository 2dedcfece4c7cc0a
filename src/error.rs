use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use std::time::Duration;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum DbCredError {
    #[error("unknown role: {0}")]
    RoleNotFound(String),

    #[error("could not find DB with name: {0}")]
    ConnectionNotFound(String),

    #[error("unknown lease: {0}")]
    LeaseNotFound(String),

    #[error("credential generation failed: {0}")]
    Generation(String),

    #[error("provisioning on database {db} failed: {source}")]
    Provision {
        db: String,
        #[source]
        source: SqlxError,
    },

    #[error("statement on database {db} timed out after {after:?}")]
    Timeout { db: String, after: Duration },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("credential {username} for role {role} was provisioned but not attached to a lease: {reason}")]
    LeaseRegistration {
        role: String,
        username: String,
        reason: String,
    },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbCredError {
    pub fn provision(db: impl Into<String>, source: SqlxError) -> Self {
        Self::Provision {
            db: db.into(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    /// True for every "does not exist" kind (role, connection, lease).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::RoleNotFound(_) | Self::ConnectionNotFound(_) | Self::LeaseNotFound(_)
        )
    }
}

impl IntoResponse for DbCredError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = match &self {
            DbCredError::RoleNotFound(_)
            | DbCredError::ConnectionNotFound(_)
            | DbCredError::LeaseNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            DbCredError::Config(_) => (StatusCode::BAD_REQUEST, "INVALID_CONFIG", self.to_string()),
            DbCredError::Timeout { .. } => (
                StatusCode::GATEWAY_TIMEOUT,
                "TIMEOUT",
                "The target database did not respond in time.".to_string(),
            ),
            DbCredError::Provision { .. } => (
                StatusCode::BAD_GATEWAY,
                "PROVISION_FAILED",
                "The target database rejected the provisioning statements.".to_string(),
            ),
            DbCredError::Generation(_)
            | DbCredError::LeaseRegistration { .. }
            | DbCredError::Internal(_)
            | DbCredError::DatabaseError(_)
            | DbCredError::Json(_)
            | DbCredError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal server error occurred.".to_string(),
            ),
        };
        let body = ApiErrorResponse {
            error: ApiErrorBody {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
