//! Error handler for the gateway.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::key::KeyError;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
///
/// Every variant but [`ServerError::KeyLoadFailed`] and
/// [`ServerError::Internal`] only terminates the request that raised it.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error("No code returned")]
    MissingCode,

    #[error("Unknown client app")]
    UnknownClient,

    #[error("Token exchange failed, {0}")]
    ExchangeFailed(String),

    #[error("Invalid token response from identity provider, {0}")]
    MalformedResponse(String),

    #[error("Failed to fetch user info, {0}")]
    ProfileFetchFailed(String),

    #[error("Authorization header missing")]
    MissingCredential,

    #[error("Invalid JWT")]
    InvalidToken,

    #[error("JWT expired")]
    TokenExpired,

    #[error("key material rejected: {0}")]
    KeyLoadFailed(#[from] KeyError),

    #[error("session store is not available")]
    SessionStoreUnavailable,

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServerError {
    /// Stable machine-readable name of the error.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::Axum(_) => "invalid_body",
            ServerError::MissingCode => "missing_code",
            ServerError::UnknownClient => "unknown_client",
            ServerError::ExchangeFailed(_) => "exchange_failed",
            ServerError::MalformedResponse(_) => "malformed_response",
            ServerError::ProfileFetchFailed(_) => "profile_fetch_failed",
            ServerError::MissingCredential => "missing_credential",
            ServerError::InvalidToken => "invalid_token",
            ServerError::TokenExpired => "token_expired",
            ServerError::KeyLoadFailed(_) => "key_load_failed",
            ServerError::SessionStoreUnavailable => "session_store_unavailable",
            ServerError::Internal { .. } => "internal",
        }
    }

    /// HTTP status returned to the caller.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Axum(_)
            | ServerError::MissingCode
            | ServerError::UnknownClient
            | ServerError::ExchangeFailed(_)
            | ServerError::MalformedResponse(_)
            | ServerError::ProfileFetchFailed(_) => StatusCode::BAD_REQUEST,
            ServerError::MissingCredential
            | ServerError::InvalidToken
            | ServerError::TokenExpired => StatusCode::UNAUTHORIZED,
            ServerError::SessionStoreUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            },
            ServerError::KeyLoadFailed(_) | ServerError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

/// JSON body sent along any failed request.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    success: bool,
    error: String,
    kind: &'static str,
    status: u16,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `error` message.
    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = message.into();
        self
    }

    /// Update `kind` field.
    pub fn kind(mut self, kind: &'static str) -> Self {
        self.kind = kind;
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
            success: false,
            error: "Internal server error".to_owned(),
            kind: "internal",
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = match &self {
            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");
                ResponseError::default()
            },
            ServerError::KeyLoadFailed(err) => {
                tracing::error!(%err, "key material unusable");
                ResponseError::default()
            },
            _ => ResponseError::default()
                .error(self.to_string())
                .kind(self.kind())
                .status(self.status()),
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
                "success": false,
                "error": "Internal server error",
                "kind": "internal",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
