//! Identifier validation for `id` path parameters.
//!
//! Route units never see a malformed identifier: the loader wraps every unit
//! that declares `{id}` with [`validate_id_param`], which rejects the request
//! with a 400 before the handler runs. The accepted format follows the
//! persistence layer and is chosen through [`IdFormatKind`].

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{RawPathParams, Request, State},
    middleware::Next,
    response::Response,
};

use crate::api::error::ApiError;
use crate::config::IdFormatKind;

/// Name of the path parameter that gets validated.
pub const ID_PARAM: &str = "id";

/// A storage identifier format.
pub trait IdFormat: Send + Sync + 'static {
    /// Short human description, used in the 400 message.
    fn expected(&self) -> &'static str;

    fn is_valid(&self, value: &str) -> bool;
}

/// 24 hexadecimal characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectIdFormat;

impl IdFormat for ObjectIdFormat {
    fn expected(&self) -> &'static str {
        "a 24-character hexadecimal object id"
    }

    fn is_valid(&self, value: &str) -> bool {
        value.len() == 24 && value.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidFormat;

impl IdFormat for UuidFormat {
    fn expected(&self) -> &'static str {
        "a UUID"
    }

    fn is_valid(&self, value: &str) -> bool {
        uuid::Uuid::try_parse(value).is_ok()
    }
}

/// Positive decimal integer that fits in an `i64`, no sign or leading zeros.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerIdFormat;

impl IdFormat for IntegerIdFormat {
    fn expected(&self) -> &'static str {
        "a positive integer"
    }

    fn is_valid(&self, value: &str) -> bool {
        !value.starts_with('0')
            && value.bytes().all(|b| b.is_ascii_digit())
            && value.parse::<i64>().map(|n| n > 0).unwrap_or(false)
    }
}

/// Shared handle on the configured identifier format.
#[derive(Clone)]
pub struct IdValidator {
    format: Arc<dyn IdFormat>,
}

impl fmt::Debug for IdValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdValidator")
            .field("expected", &self.format.expected())
            .finish()
    }
}

impl IdValidator {
    pub fn new(format: impl IdFormat) -> Self {
        Self {
            format: Arc::new(format),
        }
    }

    pub fn for_kind(kind: IdFormatKind) -> Self {
        match kind {
            IdFormatKind::ObjectId => Self::new(ObjectIdFormat),
            IdFormatKind::Uuid => Self::new(UuidFormat),
            IdFormatKind::Integer => Self::new(IntegerIdFormat),
        }
    }

    pub fn check(&self, param: &str, value: &str) -> Result<(), ApiError> {
        if self.format.is_valid(value) {
            Ok(())
        } else {
            Err(ApiError::Validation {
                param: param.to_string(),
                value: value.to_string(),
                expected: self.format.expected(),
            })
        }
    }
}

/// Route-layer middleware: short-circuit with 400 when the matched route
/// binds `id` to a malformed value. Routes without `id` pass untouched.
pub async fn validate_id_param(
    State(validator): State<IdValidator>,
    params: RawPathParams,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some((name, value)) = params.iter().find(|(name, _)| *name == ID_PARAM) {
        validator.check(name, value)?;
    }
    Ok(next.run(request).await)
}
