use crate::db::errors::DbError;
use crate::db::models::creations::CreationKind;
use crate::providers::ProviderError;
use crate::quota::QuotaDecision;
use crate::types::{Operation, Resource};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

/// Shown for every provider failure; logs keep the distinction
pub const GENERATION_FAILED_MESSAGE: &str = "Something went wrong while making your creation. Please try again!";

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Account lacks required permissions for the operation
    #[error("Insufficient permissions to {action} {resource}")]
    InsufficientPermissions { action: Operation, resource: Resource },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// The quota ledger denied the request; carries the status shown to the user
    #[error("Creation limit reached: {}", decision.message)]
    LimitReached { decision: Box<QuotaDecision> },

    /// The provider failed after quota was debited
    #[error("{kind:?} generation failed: {source}")]
    GenerationFailed {
        kind: CreationKind,
        #[source]
        source: ProviderError,
    },

    /// The provider succeeded but the creation record could not be written
    #[error("Failed to persist {kind:?} creation: {source}")]
    RecordPersistence {
        kind: CreationKind,
        #[source]
        source: DbError,
    },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// Conflict error, e.g., for unique constraint violations
    #[error("Conflict: {message}")]
    Conflict { message: String },
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::LimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::GenerationFailed { .. } => StatusCode::BAD_GATEWAY,
            Error::RecordPersistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Conflict { .. } => StatusCode::CONFLICT,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Please sign in to start creating".to_string()),
            Error::InsufficientPermissions { action, resource } => {
                format!("Insufficient permissions to {action} {resource}")
            }
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => {
                format!("{resource} with ID {id} not found")
            }
            Error::LimitReached { decision } => decision.message.clone(),
            Error::GenerationFailed { .. } => GENERATION_FAILED_MESSAGE.to_string(),
            Error::RecordPersistence { .. } => "Your creation was made but we couldn't save it. Please try again!".to_string(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } => unique_violation_message(db_err).0,
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
            Error::Conflict { message } => message.clone(),
        }
    }
}

/// User-facing message and resource name for a unique violation
fn unique_violation_message(err: &DbError) -> (String, &'static str) {
    let DbError::UniqueViolation { constraint, .. } = err else {
        return ("Resource already exists".to_string(), "unknown");
    };
    match constraint.as_deref() {
        Some("accounts_email_unique") => ("An account with this email address already exists".to_string(), "account"),
        Some("organizations_subdomain_unique") => ("This subdomain is already taken".to_string(), "organization"),
        Some("creations_task_id_unique") => ("This creation has already been recorded".to_string(), "creation"),
        _ => ("Resource already exists".to_string(), "unknown"),
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::RecordPersistence { kind, source } => {
                tracing::error!(priority = "high", kind = kind.as_str(), error = %source, "Provider succeeded but creation record was not saved");
            }
            Error::GenerationFailed {
                source: source @ ProviderError::MissingCredential { .. },
                ..
            } => {
                tracing::error!("Provider is not configured: {}", source);
            }
            Error::GenerationFailed { .. } => {
                tracing::warn!("Generation failed: {:#}", self);
            }
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::InsufficientPermissions { .. } | Error::LimitReached { .. } => {
                tracing::info!("Request refused: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Conflict { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            // The client renders the quota status, so send all of it
            Error::LimitReached { decision } => (status, Json(decision.as_ref())).into_response(),
            Error::Database(err @ DbError::UniqueViolation { .. }) => {
                let (message, resource) = unique_violation_message(err);
                (status, Json(json!({ "message": message, "resource": resource }))).into_response()
            }
            _ => (status, self.user_message()).into_response(),
        }
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
