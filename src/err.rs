use std::fmt;

use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub async fn handler404(path: Uri) -> Error {
    Error::NotFound {
        message: format!("Invalid path: {}", path),
    }
}

/// Every failure a handler can answer with. Each variant maps to one HTTP
/// status and renders as `{"detail": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Duplicate unique field or otherwise unacceptable payload.
    Validation { message: String },
    NotFound { message: String },
    /// Unknown operator or wrong password; the two are never told apart.
    AuthenticationFailed,
    MissingCredential,
    /// Bad signature, undecodable token, expired token or missing subject.
    InvalidCredential,
    UnknownOperator,
    OperatorDisabled,
    MissingRefreshToken,
    InvalidRefreshToken,
    InternalError { kind: &'static str, message: String },
}

impl Error {
    pub fn validation<S: Into<String>>(msg: S) -> Error {
        Error::Validation {
            message: msg.into(),
        }
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Error {
        Error::NotFound {
            message: msg.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation { .. } | Error::OperatorDisabled => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } | Error::UnknownOperator => StatusCode::NOT_FOUND,
            Error::AuthenticationFailed
            | Error::MissingCredential
            | Error::InvalidCredential
            | Error::MissingRefreshToken
            | Error::InvalidRefreshToken => StatusCode::UNAUTHORIZED,
            Error::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Operator-facing message. Internal errors never leak their cause.
    pub fn detail(&self) -> String {
        match self {
            Error::Validation { message } | Error::NotFound { message } => message.clone(),
            Error::AuthenticationFailed => "Incorrect username or password".to_string(),
            Error::MissingCredential => "Not authenticated".to_string(),
            Error::InvalidCredential => "Token non valide".to_string(),
            Error::UnknownOperator => "Opérateur non enregistré.".to_string(),
            Error::OperatorDisabled => "Opérateur désactivé.".to_string(),
            Error::MissingRefreshToken => "Refresh token non fourni".to_string(),
            Error::InvalidRefreshToken => "Refresh token non valide".to_string(),
            Error::InternalError { .. } => "Internal server error".to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InternalError { kind, message } => write!(f, "{}: {}", kind, message),
            other => write!(f, "{}", other.detail()),
        }
    }
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Error::InternalError { .. } = &self {
            log::error!("{}", self);
        }
        let body = Json(json!({ "detail": self.detail() }));
        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::InternalError {
            kind: "DatabaseError",
            message: err.to_string(),
        }
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        Self::InternalError {
            kind: "PasswordHashError",
            message: err.to_string(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::InternalError {
            kind: "TokenError",
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::InternalError {
            kind: "TaskError",
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError {
            kind: "Unknown",
            message: format!("{:#}", err),
        }
    }
}

macro_rules! rejection_is_validation {
    ($($rejection:ty),+ $(,)?) => {
        $(
            impl From<$rejection> for Error {
                fn from(rejection: $rejection) -> Self {
                    log::debug!("Rejected request: {}", rejection);
                    Error::validation(rejection.to_string())
                }
            }
        )+
    };
}

rejection_is_validation!(
    axum::extract::rejection::JsonRejection,
    axum::extract::rejection::FormRejection,
    axum::extract::rejection::PathRejection,
    axum::extract::rejection::QueryRejection,
);
