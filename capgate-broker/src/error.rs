// capgate-broker/src/error.rs
// ============================================================================
// Module: HTTP Error Mapping
// Description: Maps domain error categories to HTTP status and JSON body.
// Purpose: Give every handler one place to turn a `CategorizedError` into a
//          response, matching spec §7's error taxonomy.
// Dependencies: axum, capgate-core::domain::errors
// ============================================================================

//! ## Overview
//! Every handler error funnels through [`ApiError`], which carries an
//! [`ErrorCategory`] and renders the `{error, message}` shape spec §7
//! describes. Internal details never cross this boundary: [`ApiError::internal`]
//! logs the detail and returns only a correlation id.

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use capgate_core::domain::errors::CategorizedError;
use capgate_core::domain::errors::ErrorCategory;
use serde::Serialize;

/// An error ready to render as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    category: ErrorCategory,
    message: String,
}

impl ApiError {
    /// Wraps any [`CategorizedError`], using its `Display` message.
    pub fn from_categorized<E: CategorizedError + std::fmt::Display>(err: E) -> Self {
        Self {
            category: err.category(),
            message: err.to_string(),
        }
    }

    /// Builds a validation error from a plain message (spec §7: malformed
    /// input, missing header, bad query parameter).
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Validation,
            message: message.into(),
        }
    }

    /// Builds a transient error from a raw store-failure string (the
    /// `RuleStore`/`ViolationStore`/`UsageStore`/`TokenStore` traits return
    /// `Result<_, String>` rather than a `CategorizedError`).
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(detail = %message, "store error");
        Self {
            category: ErrorCategory::Transient,
            message: "internal error".to_string(),
        }
    }

    /// Builds an internal error; `detail` is logged via `tracing` and never
    /// returned to the caller verbatim (spec §7: internal errors are never
    /// leaked beyond a correlation id).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        tracing::error!(detail = %detail, "internal error");
        Self {
            category: ErrorCategory::Internal,
            message: "internal error".to_string(),
        }
    }

    const fn status(&self) -> StatusCode {
        match self.category {
            ErrorCategory::Validation | ErrorCategory::PolicyEvaluation => StatusCode::BAD_REQUEST,
            ErrorCategory::Authorization => StatusCode::FORBIDDEN,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::Transient | ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    const fn code(&self) -> &'static str {
        match self.category {
            ErrorCategory::Validation => "VALIDATION_ERROR",
            ErrorCategory::Authorization => "AUTHORIZATION_ERROR",
            ErrorCategory::NotFound => "NOT_FOUND",
            ErrorCategory::Conflict => "CONFLICT",
            ErrorCategory::Transient => "TRANSIENT_ERROR",
            ErrorCategory::Internal => "INTERNAL_ERROR",
            ErrorCategory::PolicyEvaluation => "POLICY_EVALUATION_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.code(),
            message: self.message,
        };
        (status, Json(body)).into_response()
    }
}
