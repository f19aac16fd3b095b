//! Error types shared by the cluster clients and the services built on them.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Referenced entity or API object is absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Object already exists; swallowed by create-if-absent callers
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Rejected before any resource was written
    #[error("validation error: {0}")]
    Validation(String),

    /// Cluster or remote endpoint unreachable
    #[error("upstream unavailable [{target}]: {message}")]
    UpstreamUnavailable { target: String, message: String },

    /// Cluster API answered with an unexpected error status
    #[error("upstream error [{target}] ({status}): {message}")]
    Upstream {
        target: String,
        status: u16,
        message: String,
    },

    /// Resource did not have the shape an operation needs
    #[error("malformed resource {name}: {message}")]
    Malformed { name: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unavailable(target: impl Into<String>, msg: impl std::fmt::Display) -> Self {
        Self::UpstreamUnavailable {
            target: target.into(),
            message: msg.to_string(),
        }
    }

    pub fn malformed(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Malformed {
            name: name.into(),
            message: msg.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    fn status_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::AlreadyExists(_) => (StatusCode::CONFLICT, "ALREADY_EXISTS"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::UpstreamUnavailable { .. } => {
                (StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE")
            }
            Self::Upstream { .. } => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            Self::Malformed { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "MALFORMED_RESOURCE"),
            Self::Serialization(_) | Self::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code) = self.status_code();
        let body = Json(json!({
            "code": code,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::not_found("backup x").status_code().0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::validation("bad cron").status_code().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::unavailable("member-1", "timed out").status_code().0,
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_display_carries_target() {
        let e = Error::unavailable("member-1", "connection refused");
        assert_eq!(
            e.to_string(),
            "upstream unavailable [member-1]: connection refused"
        );
    }
}
