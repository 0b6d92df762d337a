//! Error handler for dorado.

use std::fmt;

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::Error as SQLxError;
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::flight::FlightStatus;

pub type Result<T> = std::result::Result<T, ServerError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a request was refused by the authentication gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No `Authorization` header was sent.
    Missing,
    /// Header present but the token is malformed, forged or expired.
    Invalid,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::Missing => write!(f, "no credential supplied"),
            AuthFailure::Invalid => write!(f, "token invalid"),
        }
    }
}

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error("error parsing form data")]
    ParsingForm(BoxError),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(AuthFailure),

    #[error("administrator role required")]
    Forbidden,

    #[error("flight cannot go from {from} to {to}")]
    InvalidState { from: FlightStatus, to: FlightStatus },

    #[error("{0}")]
    UploadRejected(String),

    #[error("token is invalid or expired")]
    InvalidToken,

    #[error("account has not been confirmed")]
    NotConfirmed,

    #[error("password is incorrect")]
    BadCredentials,

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<BoxError>,
    },
}

impl ServerError {
    /// Wrap an unexpected failure.
    pub fn internal<E>(details: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            details: details.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Shortcut for [`ServerError::Conflict`].
    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    /// Shortcut for [`ServerError::NotFound`].
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut fields = Vec::new();
    collect_validation_errors(errors, None, &mut fields);
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    fields
}

/// Flatten nested and list errors into dotted paths. Struct-level errors
/// (`__all__`) are reported on the struct itself.
fn collect_validation_errors(
    errors: &ValidationErrors,
    parent: Option<&str>,
    fields: &mut Vec<FieldError>,
) {
    for (name, kind) in errors.errors() {
        let path = match (parent, &**name) {
            (Some(parent), "__all__") => parent.to_owned(),
            (Some(parent), name) => format!("{parent}.{name}"),
            (None, name) => name.to_owned(),
        };

        match kind {
            ValidationErrorsKind::Field(issues) => {
                fields.extend(issues.iter().map(|issue| FieldError {
                    field: path.clone(),
                    message: issue
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| issue.code.to_string()),
                }));
            },
            ValidationErrorsKind::Struct(inner) => {
                collect_validation_errors(inner, Some(&path), fields);
            },
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    let item = format!("{path}[{index}]");
                    collect_validation_errors(inner, Some(&item), fields);
                }
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Validation(validation_errors) => {
                response.errors(validation_errors)
            },

            ServerError::ParsingForm(err) => response
                .title("Server error during data parsing.")
                .details(&err.to_string()),

            ServerError::Multipart(err) => response
                .title("Malformed multipart body.")
                .details(&err.body_text())
                .status(err.status()),

            ServerError::Conflict(_) => response
                .title("Resource already exists.")
                .status(StatusCode::CONFLICT),

            ServerError::NotFound(_) => response
                .title("Resource not found.")
                .status(StatusCode::NOT_FOUND),

            ServerError::Unauthorized(_) => response
                .title("Missing or invalid 'Authorization' header.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::Forbidden => response
                .title("You are not allowed to perform this action.")
                .status(StatusCode::FORBIDDEN),

            ServerError::InvalidState { .. } => {
                response.title("Illegal flight status transition.")
            },

            ServerError::UploadRejected(_) => {
                response.title("Uploaded file was rejected.")
            },

            ServerError::InvalidToken => response
                .title("Invalid token.")
                .status(StatusCode::FORBIDDEN),

            ServerError::NotConfirmed => response
                .title("Account not confirmed.")
                .status(StatusCode::FORBIDDEN),

            ServerError::BadCredentials => response
                .title("Invalid credentials.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::Sql(err) => {
                tracing::error!(error = %err, "database request failed");

                ResponseError::default()
            },

            ServerError::Internal { details, source } => {
                tracing::error!(
                    err = ?source,
                    %details,
                    "server returned 500 status"
                );

                ResponseError::default()
            },

            ServerError::Axum(_) => response,
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
