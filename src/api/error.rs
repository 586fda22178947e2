//! Error normalization.
//!
//! Every HTTP-visible failure ends up as one JSON response of the shape
//! `{ "status": <code>, "message": <text> }`. Three paths lead here:
//!
//! - handlers, the id validator and the fallback return [`ApiError`], which
//!   renders itself;
//! - framework rejections (bad JSON, unsupported method, ...) come back from
//!   axum as plain responses and are rewritten by [`normalize_errors`];
//! - panics are caught by `CatchPanicLayer` and turned into a generic 500 by
//!   [`panic_response`].
//!
//! Internal details never reach the body. The underlying failure is logged.

use std::any::Any;

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Message returned for every failure whose details must stay server-side.
pub const INTERNAL_MESSAGE: &str = "Internal server error";

/// Message returned when no route matches.
pub const NOT_FOUND_MESSAGE: &str = "Not found";

/// Upper bound on framework rejection bodies read back for normalization.
const REJECTION_BODY_LIMIT: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum ApiError {
    /// A path parameter failed the identifier format check.
    #[error("invalid {param} '{value}': expected {expected}")]
    Validation {
        param: String,
        value: String,
        expected: &'static str,
    },

    #[error("Not found")]
    NotFound,

    /// A failure a handler chose to expose, with its own status and message.
    #[error("{message}")]
    Handler {
        status: StatusCode,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Anything else. Rendered as a generic 500.
    #[error("internal error: {0}")]
    Internal(#[source] BoxError),
}

/// Wire shape of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
}

/// Marks a response that already went through normalization.
#[derive(Debug, Clone, Copy)]
pub struct Normalized;

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Handler {
            status,
            message: message.into(),
            source: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(err: impl Into<BoxError>) -> Self {
        Self::Internal(err.into())
    }

    /// Keep `source` for the log while exposing `status` and `message`.
    pub fn with_source(mut self, err: impl Into<BoxError>) -> Self {
        if let Self::Handler { source, .. } = &mut self {
            *source = Some(err.into());
        }
        self
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Handler { status, .. } => *status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `{status, message}` pair sent to the caller.
    pub fn wire(&self) -> ErrorBody {
        let message = match self {
            Self::Internal(_) => INTERNAL_MESSAGE.to_string(),
            Self::NotFound => NOT_FOUND_MESSAGE.to_string(),
            Self::Validation { .. } | Self::Handler { .. } => self.to_string(),
        };
        ErrorBody {
            status: self.status().as_u16(),
            message,
        }
    }

    fn log(&self) {
        let status = self.status();
        let chain = error_chain(self);
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %chain, "request failed");
        } else {
            debug!(status = status.as_u16(), error = %chain, "request rejected");
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(Box::new(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        let body = self.wire();
        let status = self.status();
        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(Normalized);
        response
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        cause = inner.source();
    }
    out
}

/// Fallback for requests no route unit matched.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Rewrite error responses that did not come from [`ApiError`] into the
/// uniform JSON shape, keeping their status.
///
/// Only responses whose headers have not been sent pass through here; a
/// response already carrying the [`Normalized`] marker is returned as is, so
/// no request is ever answered twice.
pub async fn normalize_errors(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error())
        || response.extensions().get::<Normalized>().is_some()
    {
        return response;
    }

    let (parts, body) = response.into_parts();
    let detail = match axum::body::to_bytes(body, REJECTION_BODY_LIMIT).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Err(err) => {
            debug!(error = %err, "could not read rejection body");
            String::new()
        }
    };

    let err = if status.is_server_error() {
        ApiError::internal(if detail.is_empty() {
            format!("framework error with status {status}")
        } else {
            detail
        })
    } else {
        let message = if detail.is_empty() {
            status.canonical_reason().unwrap_or("Request rejected").to_string()
        } else {
            detail
        };
        ApiError::new(status, message)
    };

    let mut normalized = err.into_response();
    *normalized.status_mut() = status;
    // Keep framework headers such as `Allow` on a 405.
    for (name, value) in parts.headers.iter() {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            normalized.headers_mut().insert(name.clone(), value.clone());
        }
    }
    normalized
}

/// `CatchPanicLayer` handler: log the payload, answer a generic 500.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };
    let mut response = ApiError::internal(format!("handler panicked: {detail}")).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    );
    response
}
