// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sketch_common::{ConnectionId, EventKind};
use thiserror::Error;

/// Relay error types with error codes and context
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),

    #[error("Connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    #[error("Connection {connection} is not a member of project {project_id}")]
    NotAMember {
        connection: ConnectionId,
        project_id: String,
    },

    #[error("Events of kind {0} are not relayed")]
    NotRoutable(EventKind),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Access to project {0} denied")]
    AccessDenied(String),

    #[error("Relay coordinator is unavailable")]
    CoordinatorClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidInput(_) | RelayError::Json(_) | RelayError::NotRoutable(_) => {
                StatusCode::BAD_REQUEST
            },
            RelayError::AccessDenied(_) => StatusCode::FORBIDDEN,
            RelayError::NotAMember { .. } | RelayError::UnknownConnection(_) => {
                StatusCode::NOT_FOUND
            },
            RelayError::AlreadyRegistered(_) => StatusCode::CONFLICT,
            RelayError::CoordinatorClosed => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Config(_) | RelayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            RelayError::AlreadyRegistered(_) => "CONN_001",
            RelayError::UnknownConnection(_) => "CONN_002",
            RelayError::NotAMember { .. } => "SESSION_001",
            RelayError::NotRoutable(_) => "SESSION_002",
            RelayError::InvalidInput(_) => "VAL_001",
            RelayError::AccessDenied(_) => "AUTH_001",
            RelayError::CoordinatorClosed => "INT_001",
            RelayError::Config(_) => "CFG_001",
            RelayError::Io(_) => "IO_001",
            RelayError::Json(_) => "JSON_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            RelayError::AlreadyRegistered(_) | RelayError::UnknownConnection(_) => {
                "Connection state error".to_string()
            },
            RelayError::NotAMember { .. } => "Not a member of this session".to_string(),
            RelayError::NotRoutable(_) => "Unsupported event".to_string(),
            RelayError::InvalidInput(_) => "Invalid input provided".to_string(),
            RelayError::AccessDenied(_) => "Access denied".to_string(),
            RelayError::Json(_) => "Invalid request format".to_string(),
            RelayError::CoordinatorClosed => "Service temporarily unavailable".to_string(),
            RelayError::Config(_) | RelayError::Io(_) => {
                "An internal server error occurred".to_string()
            },
        }
    }

    /// Errors a client can provoke; dropped and reported, never fatal
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            RelayError::NotAMember { .. }
                | RelayError::NotRoutable(_)
                | RelayError::InvalidInput(_)
                | RelayError::AccessDenied(_)
                | RelayError::UnknownConnection(_)
                | RelayError::Json(_)
        )
    }

    /// Short reason used as a metric label
    pub fn reason(&self) -> &'static str {
        match self {
            RelayError::NotAMember { .. } => "not_a_member",
            RelayError::NotRoutable(_) => "not_routable",
            RelayError::InvalidInput(_) => "invalid_input",
            RelayError::AccessDenied(_) => "access_denied",
            RelayError::UnknownConnection(_) => "unknown_connection",
            RelayError::Json(_) => "malformed",
            RelayError::AlreadyRegistered(_) => "already_registered",
            RelayError::CoordinatorClosed => "coordinator_closed",
            RelayError::Config(_) => "config",
            RelayError::Io(_) => "io",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for RelayError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        RelayError::CoordinatorClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for RelayError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        RelayError::CoordinatorClosed
    }
}

impl From<figment::Error> for RelayError {
    fn from(err: figment::Error) -> Self {
        RelayError::Config(err.to_string())
    }
}

impl From<crate::validation::ValidationError> for RelayError {
    fn from(err: crate::validation::ValidationError) -> Self {
        RelayError::InvalidInput(err.to_string())
    }
}
