use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use serde_json::json;

use crate::repository::RepositoryError;
use crate::routes::Route;

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`]: missing records become 404 pages, authorization
/// denials become a silent redirect to a safe fallback route, and collaborator
/// failures become a sanitized 500.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// An article id or username that does not resolve.
    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },

    /// The actor may not perform this action; the request falls back to `fallback`.
    #[error("access denied, falling back to {}", .fallback.path())]
    Denied { fallback: Route },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Session token could not be signed.
    #[error("Session error: {0}")]
    Session(#[from] jsonwebtoken::errors::Error),

    #[error("Password hashing error: {0}")]
    Password(#[from] argon2::password_hash::Error),
}

impl AppError {
    pub fn article_not_found(id: i64) -> Self {
        AppError::NotFound {
            entity: "Article",
            key: id.to_string(),
        }
    }

    pub fn user_not_found(username: &str) -> Self {
        AppError::NotFound {
            entity: "User",
            key: username.to_string(),
        }
    }
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            AppError::Denied { fallback } => {
                tracing::debug!(fallback = %fallback.path(), "Access denied, redirecting");
                return Redirect::to(&fallback.path()).into_response();
            }
            AppError::Repository(err) => {
                tracing::error!(error = %err, "Repository error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Session(err) => {
                tracing::error!(error = %err, "Session signing error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Password(err) => {
                tracing::error!(error = %err, "Password hashing error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
